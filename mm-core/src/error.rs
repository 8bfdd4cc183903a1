//! Global error types for the matchmaker client.
//!
//! All error categories are unified into a single `MmError` enum with
//! conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using MmError.
pub type MmResult<T> = Result<T, MmError>;

/// Unified error type covering all error categories.
#[derive(Error, Debug)]
pub enum MmError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// The broker URL could not be turned into a socket endpoint.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    // -- Network errors --
    /// The socket closed while an operation was in flight.
    #[error("socket disconnected")]
    SocketDisconnected,

    /// Opening the transport failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// An operation exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Malformed or unexpected STOMP frame, or a protocol misuse.
    #[error("protocol error: {0}")]
    Protocol(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for MmError {
    fn from(e: serde_json::Error) -> Self {
        MmError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for MmError {
    fn from(e: toml::de::Error) -> Self {
        MmError::Config(e.to_string())
    }
}

impl MmError {
    /// Whether this error came from the network side (transport or protocol).
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::SocketDisconnected
                | Self::ConnectFailed(_)
                | Self::Timeout(_)
                | Self::Protocol(_)
        )
    }
}
