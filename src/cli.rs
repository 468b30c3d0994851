//! CLI definitions for cronhook.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cronhook CLI.
#[derive(Parser)]
#[command(name = "cronhook")]
#[command(about = "Recurring HTTP webhook scheduler")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "CRONHOOK_CONFIG",
        default_value = "config/cronhook.toml",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler and admin API in foreground (default)
    Run {
        /// Admin API host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Admin API port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Load and validate the configuration, then exit
    Check,
}
