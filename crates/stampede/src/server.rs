use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use stampede_service::backend::SimulatedBackend;
use stampede_service::caching::Cacher;
use stampede_service::config::Config;
use stampede_service::listener;
use stampede_service::metric;

/// Starts the line protocol server based on the loaded config, and runs it until Ctrl-C.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to see restarts even if
    // binding fails.
    metric!(counter("server.starting") += 1);

    let megs = 1024 * 1024;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("stampede-worker")
        .enable_all()
        .thread_stack_size(8 * megs)
        .build()?;

    let socket = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address `{}`", config.bind))?;

    let backend = Arc::new(SimulatedBackend::from_config(&config.backend));
    let cacher = Cacher::new(config.cache, backend);
    tracing::info!(
        mode = ?config.cache.mode,
        ttl = ?config.cache.ttl,
        latency = ?config.backend.latency,
        "Starting server on {}",
        socket
    );

    runtime
        .block_on(listener::bind_and_serve(
            socket,
            cacher,
            config.server,
            shutdown_signal(),
        ))
        .context("failed to bind listener")?;
    tracing::info!("System shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
        Err(err) => {
            // Without a signal handler there is no way to shut down gracefully, keep serving.
            tracing::error!(
                error = &err as &dyn std::error::Error,
                "Failed to listen for Ctrl-C"
            );
            std::future::pending::<()>().await;
        }
    }
}
