//! Matchmaker CLI - terminal client for the real-time messaging connection.
//!
//! Connects to the message broker as a given user and prints chat
//! messages, chat requests and notifications as they arrive. Useful for
//! headless operation, scripting and debugging the broker.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use mm_core::config::{AppConfig, ConfigHandle};
use mm_core::error::MmResult;
use mm_core::logging;

/// Matchmaker - real-time messaging client.
#[derive(Parser)]
#[command(
    name = "matchmaker",
    version,
    about = "Matchmaker real-time messaging CLI",
    long_about = "A command-line client for the Matchmaker message broker.\n\
                   Keeps a STOMP-over-WebSocket connection open and prints inbound events."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting, one object per line.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect as a user and print inbound events until Ctrl+C.
    Listen {
        /// Numeric user id to connect as.
        #[arg(short, long)]
        user: u64,
        /// Broker base URL (overrides config).
        #[arg(long)]
        url: Option<String>,
    },
    /// Show the endpoint and topics a user would be subscribed to.
    Topics {
        /// Numeric user id.
        #[arg(short, long)]
        user: u64,
        /// Broker base URL (overrides config).
        #[arg(long)]
        url: Option<String>,
    },
    /// View and modify the configuration file.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> MmResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let (config_path, mut config) = match cli.config {
        Some(path) => {
            let config = AppConfig::load_or_default(&path)?;
            (path, config)
        }
        None => (AppConfig::default_config_path()?, AppConfig::load_default()?),
    };
    if cli.verbose {
        config.logging.level = "debug".into();
    }

    // Initialize logging
    let log_dir = config.effective_log_dir()?;
    let _guard = logging::init_logging(&config.logging, &log_dir)?;

    let config_handle = ConfigHandle::new(config);

    info!("Matchmaker CLI v{}", mm_core::constants::APP_VERSION);

    // Dispatch to command handlers
    match cli.command {
        Commands::Listen { user, url } => {
            commands::listen::run(config_handle, user, url, cli.format).await
        }
        Commands::Topics { user, url } => {
            commands::topics::run(config_handle, user, url, cli.format).await
        }
        Commands::Config { action } => {
            commands::config::run(config_handle, &config_path, action, cli.format).await
        }
    }
}
