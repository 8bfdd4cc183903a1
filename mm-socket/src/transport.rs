//! Socket transport layer.
//!
//! A `Connector` opens a full-duplex, message-framed socket and hands back a
//! pair of channels. The WebSocket implementation runs one pump task per
//! socket that owns the stream, writes outgoing text with a per-write
//! deadline, sends keep-alive pings, and reports inbound text and closure.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use mm_core::config::SocketConfig;
use mm_core::error::{MmError, MmResult};

/// Timeouts and keep-alive settings for one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketClientConfig {
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    /// `None` means reads never time out, the socket is long-lived.
    pub read_timeout: Option<Duration>,
    /// Transport-level ping interval, `None` disables.
    pub ping_interval: Option<Duration>,
}

impl Default for SocketClientConfig {
    fn default() -> Self {
        Self::from(&SocketConfig::default())
    }
}

impl From<&SocketConfig> for SocketClientConfig {
    fn from(config: &SocketConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            write_timeout: config.write_timeout(),
            read_timeout: None,
            ping_interval: config.ping_interval(),
        }
    }
}

/// Something that arrived on a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketMessage {
    Text(String),
    /// The peer closed the socket, with an optional reason.
    Closed(Option<String>),
    Error(String),
}

/// An open socket: write text into `outgoing`, read from `incoming`.
///
/// Dropping `outgoing` closes the socket. After `Closed` or `Error` nothing
/// else is delivered on `incoming`.
pub struct Socket {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<SocketMessage>,
}

/// Connection provider: opens sockets to a URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
        config: &SocketClientConfig,
    ) -> MmResult<Socket>;
}

/// WebSocket connector on top of `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
        config: &SocketClientConfig,
    ) -> MmResult<Socket> {
        let mut request = url
            .into_client_request()
            .map_err(|e| MmError::InvalidUrl(format!("{url}: {e}")))?;
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| MmError::Config(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| MmError::Config(format!("invalid header value: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let (stream, response) = timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| {
            MmError::Timeout(format!(
                "connect after {}ms",
                config.connect_timeout.as_millis()
            ))
        })?
        .map_err(|e| MmError::ConnectFailed(e.to_string()))?;

        info!("websocket open: {url} (status {})", response.status());

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(stream, out_rx, in_tx, config.clone()));

        Ok(Socket {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Own the stream until either side goes away.
async fn pump(
    stream: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    incoming: mpsc::UnboundedSender<SocketMessage>,
    config: SocketClientConfig,
) {
    let (mut sink, mut source) = stream.split();

    // The timer also exists when pings are off; its arm is then disabled.
    let ping_every = config.ping_interval.unwrap_or(Duration::from_secs(3600));
    let mut ping = interval_at(Instant::now() + ping_every, ping_every);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        tokio::select! {
            text = outgoing.recv() => {
                let Some(text) = text else {
                    debug!("socket writer dropped, closing");
                    let _ = timeout(config.write_timeout, sink.send(Message::Close(None))).await;
                    return;
                };
                match timeout(config.write_timeout, sink.send(Message::Text(text))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break SocketMessage::Error(format!("write failed: {e}")),
                    Err(_) => break SocketMessage::Error(format!(
                        "write timed out after {}ms",
                        config.write_timeout.as_millis()
                    )),
                }
            }
            _ = ping.tick(), if config.ping_interval.is_some() => {
                match timeout(config.write_timeout, sink.send(Message::Ping(Vec::new()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break SocketMessage::Error(format!("ping failed: {e}")),
                    Err(_) => break SocketMessage::Error("ping timed out".into()),
                }
            }
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if incoming.send(SocketMessage::Text(text)).is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        if incoming.send(SocketMessage::Text(text)).is_err() {
                            return;
                        }
                    }
                    Err(_) => warn!("dropping non-utf8 binary message"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break SocketMessage::Closed(frame.map(|f| f.reason.to_string()));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break SocketMessage::Error(e.to_string()),
                None => break SocketMessage::Closed(None),
            },
        }
    };

    debug!("socket pump finished: {outcome:?}");
    let _ = incoming.send(outcome);
}
