// crates/sidecar/src/main.rs
//! jobtail sidecar binary.
//!
//! Loads configuration from the environment, starts one progress tracker
//! per watched location, and relays extracted progress to the scheduler
//! callback until interrupted.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "jobtail-sidecar",
    version,
    about = "Job progress-reporting sidecar"
)]
struct Cli {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("starting jobtail sidecar v{}", env!("CARGO_PKG_VERSION"));

    let config = jobtail_sidecar::Config::from_env()
        .context("error starting progress reporter: invalid configuration")?;

    jobtail_sidecar::run(config).await
}
