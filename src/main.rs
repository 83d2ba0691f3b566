//! tunmon - Connection watchdog for an external tunnel engine
//!
//! Watches a running proxy/tunnel engine through its log stream and
//! traffic counters, and reconnects automatically when the connection
//! degrades or the engine reports a fatal failure.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tunmon_core::error::TunmonError;
use tunmon_core::init_logging;

mod cli;
mod engine;

#[derive(Parser)]
#[command(name = "tunmon")]
#[command(about = "Connection watchdog and auto-reconnect for an external tunnel engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect the tunnel and watch it, reconnecting on failures
    Watch {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "tunmon.toml")]
        config: PathBuf,
    },
    /// Validate the configuration file and exit
    CheckConfig {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "tunmon.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialize logging
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Watch { config } => cli::watch::run_watch(&config).await,
        Commands::CheckConfig { config } => cli::check_config::run_check_config(&config),
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            let exit_code = match e {
                // Configuration errors (exit code 2)
                TunmonError::Config(_) | TunmonError::Toml(_) | TunmonError::TomlSerialize(_) => 2,
                // Monitor construction errors stem from configuration
                TunmonError::Monitor(_) => 2,
                // Runtime errors (exit code 1)
                TunmonError::Engine(_) | TunmonError::Io(_) => 1,
            };

            eprintln!("{}", e);
            std::process::exit(exit_code);
        }
    }
}
