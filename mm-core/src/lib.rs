//! Matchmaker Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by the other workspace crates:
//! - Application configuration (broker URL, socket tuning, logging)
//! - Global error type covering all error categories
//! - Structured logging with tracing
//! - Platform directory lookup
//! - Common constants

pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod constants;

// Re-export commonly used items at the crate root
pub use config::AppConfig;
pub use error::{MmError, MmResult};
pub use logging::init_logging;
pub use platform::Platform;
