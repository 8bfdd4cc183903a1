//! Config commands.

use std::path::Path;

use clap::Subcommand;
use console::style;
use dialoguer::Input;

use mm_core::config::{AppConfig, ConfigHandle};
use mm_core::error::{MmError, MmResult};

use crate::OutputFormat;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration.
    Show,
    /// Set the broker base URL.
    SetUrl {
        /// Base URL, e.g. "https://api.example.com".
        url: String,
    },
    /// Write a configuration file with default settings.
    Init {
        /// Base URL to store. Prompted for when omitted.
        #[arg(long)]
        url: Option<String>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand against the file at `path`.
pub async fn run(
    config: ConfigHandle,
    path: &Path,
    action: ConfigAction,
    format: OutputFormat,
) -> MmResult<()> {
    match action {
        ConfigAction::Show => {
            let cfg = config.read().await;
            match format {
                OutputFormat::Json => {
                    let json = serde_json::to_value(&*cfg)?;
                    println!("{}", serde_json::to_string_pretty(&json)?);
                }
                OutputFormat::Text => {
                    println!("{} {}", style("File").dim(), path.display());
                    println!();
                    print_config_text(&cfg);
                }
            }
        }
        ConfigAction::SetUrl { url } => {
            let sanitized = AppConfig::sanitize_base_url(&url);
            if sanitized.is_empty() {
                return Err(MmError::InvalidUrl(url));
            }
            config.write().await.server.base_url = sanitized.clone();
            config.save_to(path).await?;
            println!("  {} server.base_url = {sanitized}", style("OK").green());
        }
        ConfigAction::Init { url, force } => {
            if path.exists() && !force {
                return Err(MmError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }

            let url = match url {
                Some(url) => url,
                None => Input::new()
                    .with_prompt("Broker base URL")
                    .interact_text()
                    .map_err(|e| MmError::Internal(e.to_string()))?,
            };

            let mut fresh = AppConfig::default();
            fresh.server.base_url = AppConfig::sanitize_base_url(&url);
            fresh.save_to_file(path)?;
            *config.write().await = fresh;
            println!("  {} Config written to {}", style("OK").green(), path.display());
        }
    }
    Ok(())
}

fn print_config_text(cfg: &AppConfig) {
    println!("{}", style("Server").bold().underlined());
    println!("  server.base_url                   {}", cfg.server.base_url);
    for key in cfg.server.custom_headers.keys() {
        println!("  server.custom_headers.{key:<12}********");
    }

    println!();
    println!("{}", style("Socket").bold().underlined());
    let socket = &cfg.socket;
    println!("  socket.connect_timeout_ms         {}", socket.connect_timeout_ms);
    println!("  socket.write_timeout_ms           {}", socket.write_timeout_ms);
    println!("  socket.ping_interval_ms           {}", socket.ping_interval_ms);
    println!("  socket.heartbeat_outgoing_ms      {}", socket.heartbeat_outgoing_ms);
    println!("  socket.heartbeat_incoming_ms      {}", socket.heartbeat_incoming_ms);
    println!("  socket.max_reconnect_attempts     {}", socket.max_reconnect_attempts);
    println!("  socket.reconnect_base_delay_ms    {}", socket.reconnect_base_delay_ms);
    println!("  socket.reconnect_max_delay_ms     {}", socket.reconnect_max_delay_ms);
    println!("  socket.event_buffer               {}", socket.event_buffer);
    println!("  socket.dedup_history              {}", socket.dedup_history);

    println!();
    println!("{}", style("Logging").bold().underlined());
    println!("  logging.level                     {}", cfg.logging.level);
    println!("  logging.directory                 {}", cfg.logging.directory);
    println!("  logging.json_output               {}", cfg.logging.json_output);
}
