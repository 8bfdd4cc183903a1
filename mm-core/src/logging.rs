//! Structured logging setup using the `tracing` ecosystem.
//!
//! Console output goes to stderr; a daily-rotated file under the log
//! directory receives the same events, optionally as JSON.

use std::path::Path;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{MmError, MmResult};

const LOG_FILE_PREFIX: &str = "matchmaker.log";

/// Build the filter: `RUST_LOG` wins over the configured level.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber from the logging config.
///
/// `log_dir` is created if missing. The returned guard must be held for
/// the lifetime of the process, dropping it flushes the file writer.
pub fn init_logging(config: &LoggingConfig, log_dir: &Path) -> MmResult<LogGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    // Layers of different types cannot share one `if`, so each branch installs its own stack.
    let result = if config.json_output {
        tracing_subscriber::registry()
            .with(build_filter(&config.level))
            .with(console_layer)
            .with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .json()
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(build_filter(&config.level))
            .with(console_layer)
            .with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
    };
    result.map_err(|e| MmError::Internal(format!("logging already initialized: {e}")))?;

    tracing::info!(
        "logging initialized at level={}, dir={}",
        config.level,
        log_dir.display()
    );

    Ok(LogGuard { _guard: guard })
}

/// Guard that keeps the non-blocking log writer alive.
pub struct LogGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Initialize a console-only logger for tests and quick tools.
///
/// Silently does nothing if a global subscriber is already installed.
pub fn init_console_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(build_filter(level))
        .with(fmt::layer().with_test_writer().with_target(true).compact())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_logging_is_idempotent() {
        init_console_logging("debug");
        init_console_logging("trace");
    }

    #[test]
    fn test_invalid_level_falls_back() {
        // An unparsable directive must not panic.
        let _ = build_filter("[[not a level");
    }
}
