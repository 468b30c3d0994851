//! cronhook - recurring HTTP webhook scheduler
//!
//! Main entry point for the cronhook CLI and service.

mod cli;
mod server;

use clap::Parser;
use tracing::warn;

use crate::cli::{Cli, Commands};
use crate::server::{check_config, init_tracing, load_config, run_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Check) => check_config(&cli.config),
        None => serve(&cli, None, None).await,
        Some(Commands::Run { ref host, port }) => serve(&cli, host.clone(), port).await,
    }
}

async fn serve(
    cli: &Cli,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (mut config, found) = load_config(&cli.config)?;
    init_tracing(&config.logging)?;

    if !found {
        warn!("Config file {} not found, using defaults", cli.config.display());
    }
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    run_server(config).await
}
