//! CLI command implementations.

pub mod config;
pub mod listen;
pub mod topics;

use mm_core::config::{AppConfig, ConfigHandle};
use mm_core::error::{MmError, MmResult};

/// Broker base URL: the `--url` override if given, else the configured one.
///
/// The override is written back into the handle so later readers agree.
pub async fn resolve_base_url(config: &ConfigHandle, url: Option<String>) -> MmResult<String> {
    if let Some(url) = url {
        config.write().await.server.base_url = AppConfig::sanitize_base_url(&url);
    }

    let base_url = config.read().await.server.base_url.clone();
    if base_url.is_empty() {
        return Err(MmError::MissingConfig(
            "broker base URL. Use --url or `matchmaker config set-url`".into(),
        ));
    }
    Ok(base_url)
}

/// Truncate a string to a maximum number of characters, appending an ellipsis if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
        assert_eq!(truncate("hello", 2), "he");
    }

    #[tokio::test]
    async fn test_resolve_base_url_prefers_override() {
        let config = ConfigHandle::new(AppConfig::default());
        assert!(resolve_base_url(&config, None).await.is_err());

        let url = resolve_base_url(&config, Some("chat.example.com/".into()))
            .await
            .unwrap();
        assert_eq!(url, "https://chat.example.com");
        assert_eq!(config.read().await.server.base_url, url);
    }
}
