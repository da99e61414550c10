// rest_api/src/main.rs
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rest_api::config::load_portal_config;
use rest_api::start_server;

/// Clinic portal HTTP API.
#[derive(Debug, Parser)]
#[clap(name = "clinic-portal", version)]
struct Cli {
    /// YAML configuration file (defaults to ./clinic_portal.yaml when present).
    #[clap(long, short = 'c', env = "CLINIC_CONFIG")]
    config: Option<PathBuf>,
    /// Overrides `server.port`.
    #[clap(long, short = 'p')]
    port: Option<u16>,
    /// Overrides `server.host`.
    #[clap(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = load_portal_config(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }

    info!(
        "Starting clinic portal with {:?} storage on {}:{}",
        config.storage.engine, config.server.host, config.server.port
    );
    // The sender stays alive for the life of the process; Ctrl-C stops the server.
    let (_shutdown_tx, shutdown_rx) = oneshot::channel();
    start_server(config, shutdown_rx).await
}
