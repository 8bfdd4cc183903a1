//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "Matchmaker";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Transport connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;

/// Transport write timeout in milliseconds.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 20_000;

/// Transport-level keep-alive ping interval in milliseconds.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 30_000;

/// STOMP heart-beat interval, both directions, in milliseconds.
pub const DEFAULT_HEARTBEAT_MS: u64 = 10_000;

/// Maximum number of automatic reconnect attempts after a failure.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 20;

/// Linear backoff step between reconnect attempts in milliseconds.
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 2_000;

/// Upper bound of the reconnect backoff in milliseconds.
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Broadcast buffer for inbound events.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Maximum number of remembered message ids for deduplication.
pub const MAX_HANDLED_ID_HISTORY: usize = 100;

/// Broker path segment that marks a socket endpoint.
pub const SOCKET_ENDPOINT_SEGMENT: &str = "/ws";

/// Final path segment of the raw WebSocket endpoint.
pub const SOCKET_FINAL_SEGMENT: &str = "/websocket";

/// Query parameter carrying the connection identity.
pub const IDENTITY_QUERY_PARAM: &str = "userId";

/// STOMP protocol versions offered in the CONNECT frame.
pub const STOMP_ACCEPT_VERSION: &str = "1.2,1.1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_constants_are_consistent() {
        assert!(DEFAULT_RECONNECT_BASE_DELAY_MS < DEFAULT_RECONNECT_MAX_DELAY_MS);
        // The cap is reached at the 15th attempt.
        assert_eq!(DEFAULT_RECONNECT_MAX_DELAY_MS / DEFAULT_RECONNECT_BASE_DELAY_MS, 15);
    }
}
