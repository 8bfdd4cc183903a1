//! Broker endpoint URL composition.
//!
//! The base URL may point at the host (`https://api.example.com`), at the
//! socket endpoint (`https://api.example.com/ws`) or at the raw WebSocket
//! path (`wss://api.example.com/ws/websocket`). All three end up at
//! `.../ws/websocket?userId=<id>` with a `ws`/`wss` scheme.

use mm_core::config::AppConfig;
use mm_core::constants::{IDENTITY_QUERY_PARAM, SOCKET_ENDPOINT_SEGMENT, SOCKET_FINAL_SEGMENT};
use mm_core::error::{MmError, MmResult};

/// Build the socket URL for `identity` from the configured base URL.
pub fn socket_url(base_url: &str, identity: u64) -> MmResult<String> {
    if let Some((scheme, _)) = base_url.trim().trim_matches('"').split_once("://") {
        if !matches!(scheme, "http" | "https" | "ws" | "wss") {
            return Err(MmError::InvalidUrl(format!("unsupported scheme: {scheme}")));
        }
    }
    let base = AppConfig::sanitize_base_url(base_url);
    if base.is_empty() {
        return Err(MmError::MissingConfig("broker base url".into()));
    }

    let (scheme, rest) = base
        .split_once("://")
        .ok_or_else(|| MmError::InvalidUrl(base.clone()))?;
    let scheme = if matches!(scheme, "https" | "wss") { "wss" } else { "ws" };

    let (location, query) = match rest.split_once('?') {
        Some((loc, q)) => (loc.trim_end_matches('/'), Some(q)),
        None => (rest, None),
    };
    let (host, path) = match location.find('/') {
        Some(idx) => location.split_at(idx),
        None => (location, ""),
    };
    if host.is_empty() {
        return Err(MmError::InvalidUrl(base.clone()));
    }

    let path = if has_segment(path, SOCKET_ENDPOINT_SEGMENT) {
        if path.ends_with(SOCKET_FINAL_SEGMENT) {
            path.to_string()
        } else {
            format!("{path}{SOCKET_FINAL_SEGMENT}")
        }
    } else {
        format!("{path}{SOCKET_ENDPOINT_SEGMENT}{SOCKET_FINAL_SEGMENT}")
    };

    let separator_query = match query {
        Some(q) if !q.is_empty() => format!("?{q}&"),
        _ => "?".to_string(),
    };

    Ok(format!(
        "{scheme}://{host}{path}{separator_query}{IDENTITY_QUERY_PARAM}={identity}"
    ))
}

/// Whether `path` contains `segment` as a whole path segment.
fn has_segment(path: &str, segment: &str) -> bool {
    let name = segment.trim_start_matches('/');
    path.split('/').any(|s| s == name)
}
