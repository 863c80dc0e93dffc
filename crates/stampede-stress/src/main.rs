use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use stampede_service::backend::SimulatedBackend;
use stampede_service::caching::Cacher;
use stampede_service::config::{CoalescingMode, Config};
use stampede_service::{listener, logging};

mod stresstest;
mod workloads;

use stresstest::perform_stresstest;
use workloads::WorkloadsConfig;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Sends bursts of concurrent requests for the same key to a stampede server.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Host and port of the server.
    #[arg(long, default_value = "localhost:8000")]
    addr: String,

    /// Start a server in-process instead of connecting to `--addr`.
    ///
    /// The server is configured from `--config`, and the number of backend computations is
    /// reported for every workload.
    #[arg(long)]
    embedded: bool,

    /// Run the in-process server without coalescing concurrent misses.
    #[arg(long, requires = "embedded")]
    naive: bool,

    /// Path to the configuration file of the in-process server.
    #[arg(long, short, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the workload definition file.
    #[arg(long, short, value_name = "FILE")]
    workloads: Option<PathBuf>,

    /// How long to wait for the server to come up before connecting.
    #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
    wait: Duration,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut service_config = Config::get(cli.config.as_deref())?;
    if cli.naive {
        service_config.cache.mode = CoalescingMode::Naive;
    }
    let workloads = match &cli.workloads {
        Some(path) => WorkloadsConfig::load(path)?,
        None => WorkloadsConfig::default(),
    };

    // SAFETY: No runtime has been started yet, so this is still single-threaded.
    unsafe { logging::init_logging(&service_config.logging) };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("stampede-stress")
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let (addr, backend) = if cli.embedded {
            let (addr, backend) = start_embedded(&service_config).await?;
            (addr, Some(backend))
        } else {
            println!("Waiting {} for the server to be ready", humantime::format_duration(cli.wait));
            tokio::time::sleep(cli.wait).await;
            (cli.addr, None)
        };

        perform_stresstest(&addr, workloads, backend).await?;
        anyhow::Ok(())
    })
}

/// Starts a server on an ephemeral port of the current runtime.
async fn start_embedded(config: &Config) -> Result<(String, Arc<SimulatedBackend>)> {
    let socket = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind embedded server")?;
    let addr = socket.local_addr()?.to_string();

    let backend = Arc::new(SimulatedBackend::from_config(&config.backend));
    let cacher = Cacher::new(config.cache, backend.clone());
    tracing::info!(mode = ?config.cache.mode, "Started embedded server on {}", addr);

    tokio::spawn(listener::serve(
        socket,
        cacher,
        config.server,
        std::future::pending(),
    ));

    Ok((addr, backend))
}
