//! Exposes the command line application.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stampede_service::config::{CoalescingMode, Config};
use stampede_service::{logging, metrics};

use crate::server;

/// Stampede commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the line protocol server.
    Run {
        /// Compute every cache miss on its own instead of coalescing concurrent misses.
        ///
        /// This reproduces the cache stampede, and overrides `cache.mode` from the config.
        #[arg(long)]
        naive: bool,

        /// Host and port to listen on, overriding `bind` from the config.
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,
    },
}

/// Command line interface parser.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::get(cli.config()).context("failed loading config")?;

    let Command::Run { naive, bind } = cli.command;
    if naive {
        config.cache.mode = CoalescingMode::Naive;
    }
    if let Some(bind) = bind {
        config.bind = bind.to_string();
    }

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        ..Default::default()
    });

    // SAFETY: No runtime has been started yet, so this is still single-threaded.
    unsafe { logging::init_logging(&config.logging) };

    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd,
            config.metrics.custom_tags.clone(),
        )
        .context("failed to configure metrics")?;
    }

    server::run(config).context("failed to start the server")
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::parse_from(["stampede", "-c", "local.yml", "run", "--naive"]);
        assert_eq!(cli.config(), Some(Path::new("local.yml")));
        let Command::Run { naive, bind } = cli.command;
        assert!(naive);
        assert_eq!(bind, None);

        let cli = Cli::parse_from(["stampede", "run", "--bind", "0.0.0.0:9000"]);
        let Command::Run { naive, bind } = cli.command;
        assert!(!naive);
        assert_eq!(bind, Some("0.0.0.0:9000".parse().unwrap()));
    }
}
