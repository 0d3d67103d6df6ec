//! # splitd
//!
//! Side-car daemon entry point.
//!
//! ## Startup
//!
//! 1. Load configuration (`--config`, then `SPLITD_CONF_FILE`, then defaults)
//! 2. Initialise tracing (`RUST_LOG` wins over `logging.level`)
//! 3. Load the rule set and build the recorder
//! 4. Bind the socket and serve until SIGINT/SIGTERM
//!
//! ## Shutdown
//!
//! The acceptor stops taking connections, open connections get a grace
//! period, both flushers run a final pass and the drop counters are logged.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use splitd::{Daemon, load_config};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Feature-flag evaluation side-car
#[derive(Parser, Debug)]
#[command(name = "splitd")]
#[command(version)]
#[command(about = "Serve feature-flag evaluations to local SDK clients over a Unix socket")]
struct Args {
    /// Configuration file (overrides SPLITD_CONF_FILE)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config.logging.level);
    info!(version = env!("CARGO_PKG_VERSION"), "splitd starting");

    let daemon = Daemon::from_config(config).context("Failed to initialise daemon")?;

    let shutdown = daemon.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = shutdown.watch_signals().await {
            error!(error = %e, "Signal handling unavailable, stop the daemon with SIGKILL");
        }
    });

    let report = daemon.run().await.context("splitd terminated with an error")?;
    info!(
        impressions_dropped = report.impressions.dropped,
        events_dropped = report.events.dropped,
        "Shutdown complete"
    );
    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
