//! Application configuration management.
//!
//! Handles loading, saving, and accessing application configuration including
//! the broker URL, socket tuning, and logging preferences. Configuration
//! is persisted as TOML on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{MmError, MmResult};
use crate::platform::Platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Broker connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Socket, heart-beat and reconnect tuning.
    #[serde(default)]
    pub socket: SocketConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Broker connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Broker base URL (e.g., "https://api.example.com" or "wss://api.example.com/ws").
    #[serde(default)]
    pub base_url: String,

    /// Extra headers sent with the STOMP CONNECT frame.
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
}

/// Socket connection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Transport connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Per-write timeout in milliseconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// WebSocket ping interval in milliseconds (0 disables).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,

    /// Outgoing STOMP heart-beat we offer, in milliseconds.
    #[serde(default = "default_heartbeat")]
    pub heartbeat_outgoing_ms: u64,

    /// Incoming STOMP heart-beat we request, in milliseconds.
    #[serde(default = "default_heartbeat")]
    pub heartbeat_incoming_ms: u64,

    /// Maximum automatic reconnect attempts after a failure.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Linear backoff step in milliseconds.
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay_ms: u64,

    /// Backoff cap in milliseconds.
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay_ms: u64,

    /// Capacity of the inbound event broadcast buffer.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Number of recently seen message ids kept for deduplication (0 disables).
    #[serde(default = "default_dedup_history")]
    pub dedup_history: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

// Default value functions for serde

fn default_connect_timeout() -> u64 {
    constants::DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_write_timeout() -> u64 {
    constants::DEFAULT_WRITE_TIMEOUT_MS
}

fn default_ping_interval() -> u64 {
    constants::DEFAULT_PING_INTERVAL_MS
}

fn default_heartbeat() -> u64 {
    constants::DEFAULT_HEARTBEAT_MS
}

fn default_max_reconnect_attempts() -> u32 {
    constants::DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_reconnect_base_delay() -> u64 {
    constants::DEFAULT_RECONNECT_BASE_DELAY_MS
}

fn default_reconnect_max_delay() -> u64 {
    constants::DEFAULT_RECONNECT_MAX_DELAY_MS
}

fn default_event_buffer() -> usize {
    constants::DEFAULT_EVENT_BUFFER
}

fn default_dedup_history() -> usize {
    constants::MAX_HANDLED_ID_HISTORY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            write_timeout_ms: default_write_timeout(),
            ping_interval_ms: default_ping_interval(),
            heartbeat_outgoing_ms: default_heartbeat(),
            heartbeat_incoming_ms: default_heartbeat(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay(),
            reconnect_max_delay_ms: default_reconnect_max_delay(),
            event_buffer: default_event_buffer(),
            dedup_history: default_dedup_history(),
        }
    }
}

impl SocketConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// `None` when transport pings are disabled.
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_ms > 0).then(|| Duration::from_millis(self.ping_interval_ms))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> MmResult<Self> {
        Self::load_or_default(&Self::default_config_path()?)
    }

    /// Load from `path`, or fall back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> MmResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> MmResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> MmResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| MmError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> MmResult<PathBuf> {
        let config_dir = Platform::config_dir()?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> MmResult<PathBuf> {
        if self.logging.directory.is_empty() {
            let data_dir = Platform::data_dir()?;
            Ok(data_dir.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Check whether the broker connection is configured.
    pub fn is_server_configured(&self) -> bool {
        !self.server.base_url.is_empty()
    }

    /// Sanitize and normalize a broker base URL.
    ///
    /// Strips surrounding quotes and whitespace, removes trailing slashes,
    /// and adds `https://` when no scheme is given.
    pub fn sanitize_base_url(url: &str) -> String {
        let trimmed = url.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let has_scheme = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| trimmed.starts_with(scheme));
        let with_scheme = if has_scheme {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}

/// Thread-safe configuration holder for shared access.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Save the current configuration to a file.
    pub async fn save_to(&self, path: &Path) -> MmResult<()> {
        let config = self.inner.read().await;
        config.save_to_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.socket.connect_timeout_ms, 20_000);
        assert_eq!(config.socket.write_timeout_ms, 20_000);
        assert_eq!(config.socket.ping_interval_ms, 30_000);
        assert_eq!(config.socket.heartbeat_outgoing_ms, 10_000);
        assert_eq!(config.socket.heartbeat_incoming_ms, 10_000);
        assert_eq!(config.socket.max_reconnect_attempts, 20);
        assert_eq!(config.logging.level, "info");
        assert!(!config.is_server_configured());
    }

    #[test]
    fn test_sanitize_base_url() {
        assert_eq!(
            AppConfig::sanitize_base_url("api.example.com"),
            "https://api.example.com"
        );
        assert_eq!(
            AppConfig::sanitize_base_url("http://10.0.2.2:8080/"),
            "http://10.0.2.2:8080"
        );
        assert_eq!(
            AppConfig::sanitize_base_url("  \"wss://example.com/ws/\"  "),
            "wss://example.com/ws"
        );
        assert_eq!(AppConfig::sanitize_base_url("   "), "");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            [server]
            base_url = "https://api.example.com"

            [socket]
            max_reconnect_attempts = 5
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.is_server_configured());
        assert_eq!(config.socket.max_reconnect_attempts, 5);
        assert_eq!(config.socket.reconnect_base_delay_ms, 2_000);
        assert_eq!(config.socket.ping_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_ping_interval_disabled() {
        let socket = SocketConfig {
            ping_interval_ms: 0,
            ..SocketConfig::default()
        };
        assert_eq!(socket.ping_interval(), None);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.server.base_url = "https://api.example.com".into();
        config
            .server
            .custom_headers
            .insert("X-Client".into(), "android".into());
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.server.base_url, "https://api.example.com");
        assert_eq!(loaded.server.custom_headers["X-Client"], "android");
        assert_eq!(loaded.socket.event_buffer, config.socket.event_buffer);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert!(!config.is_server_configured());
        assert_eq!(config.socket.max_reconnect_attempts, 20);

        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nbase_url = \"https://api.example.com\"\n").unwrap();
        let config = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(config.server.base_url, "https://api.example.com");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err: MmError = toml::from_str::<AppConfig>("server = 3").unwrap_err().into();
        assert!(matches!(err, MmError::Config(_)));
    }
}
