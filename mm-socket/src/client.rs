//! STOMP protocol client over a `Connector` socket.
//!
//! Topics are registered locally first, then `connect()` opens the socket,
//! performs the CONNECT handshake and, once CONNECTED arrives, sends one
//! SUBSCRIBE per topic. A reader task routes MESSAGE frames to the topic
//! streams, writes heart-beats and watches for a silent peer. Lifecycle
//! changes are reported on a separate stream; the client never retries.

use std::collections::HashMap;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use mm_core::constants::STOMP_ACCEPT_VERSION;
use mm_core::error::{MmError, MmResult};

use crate::stomp::{self, Command, Frame, HeartBeat, Incoming, HEARTBEAT_EOL};
use crate::transport::{Connector, Socket, SocketClientConfig, SocketMessage};

/// Raw frame bodies delivered for one topic.
pub type FrameStream = mpsc::UnboundedReceiver<String>;

/// Session lifecycle as seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Opened,
    Error(String),
    Closed,
}

/// Settings for one protocol session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub socket: SocketClientConfig,
    pub heartbeat: HeartBeat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&mm_core::config::SocketConfig::default())
    }
}

impl From<&mm_core::config::SocketConfig> for SessionConfig {
    fn from(config: &mm_core::config::SocketConfig) -> Self {
        Self {
            socket: SocketClientConfig::from(config),
            heartbeat: HeartBeat::new(config.heartbeat_outgoing_ms, config.heartbeat_incoming_ms),
        }
    }
}

/// A subscribe-then-receive session over one shared socket.
#[async_trait]
pub trait ProtocolSession: Send {
    /// Register a topic. Must be called before `connect`.
    fn topic(&mut self, path: &str) -> FrameStream;

    /// Take the lifecycle stream. Only the first call returns it.
    fn take_lifecycle(&mut self) -> Option<mpsc::UnboundedReceiver<LifecycleEvent>>;

    /// Open the transport and start the handshake. `Opened` follows on the
    /// lifecycle stream once the broker accepts.
    async fn connect(&mut self) -> MmResult<()>;

    /// Tear down. Best effort, never fails.
    async fn disconnect(&mut self);
}

/// Builds protocol sessions for the controller.
pub trait SessionFactory: Send + Sync + 'static {
    fn create(
        &self,
        url: &str,
        headers: &[(String, String)],
        config: &SessionConfig,
    ) -> MmResult<Box<dyn ProtocolSession>>;
}

/// `SessionFactory` producing `StompClient`s over a shared connector.
pub struct StompSessionFactory<C: Connector> {
    connector: Arc<C>,
}

impl<C: Connector> StompSessionFactory<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }
}

impl<C: Connector> SessionFactory for StompSessionFactory<C> {
    fn create(
        &self,
        url: &str,
        headers: &[(String, String)],
        config: &SessionConfig,
    ) -> MmResult<Box<dyn ProtocolSession>> {
        Ok(Box::new(StompClient::new(
            self.connector.clone(),
            url,
            headers.to_vec(),
            config.clone(),
        )))
    }
}

struct TopicRoute {
    id: String,
    destination: String,
    sender: mpsc::UnboundedSender<String>,
}

/// STOMP client for one session attempt.
pub struct StompClient<C: Connector> {
    connector: Arc<C>,
    url: String,
    headers: Vec<(String, String)>,
    config: SessionConfig,
    routes: Vec<TopicRoute>,
    lifecycle_tx: mpsc::UnboundedSender<LifecycleEvent>,
    lifecycle_rx: Option<mpsc::UnboundedReceiver<LifecycleEvent>>,
    handshake_attempted: bool,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    reader: Option<JoinHandle<()>>,
}

impl<C: Connector> StompClient<C> {
    pub fn new(
        connector: Arc<C>,
        url: &str,
        headers: Vec<(String, String)>,
        config: SessionConfig,
    ) -> Self {
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            url: url.to_string(),
            headers,
            config,
            routes: Vec::new(),
            lifecycle_tx,
            lifecycle_rx: Some(lifecycle_rx),
            handshake_attempted: false,
            outgoing: None,
            reader: None,
        }
    }

    fn connect_frame(&self) -> Frame {
        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", STOMP_ACCEPT_VERSION)
            .header("host", host_of(&self.url))
            .header("heart-beat", self.config.heartbeat.header_value());
        for (name, value) in &self.headers {
            frame = frame.header(name.clone(), value.clone());
        }
        frame
    }
}

#[async_trait]
impl<C: Connector> ProtocolSession for StompClient<C> {
    fn topic(&mut self, path: &str) -> FrameStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = format!("sub-{}", self.routes.len());
        debug!("registered topic {path} as {id}");
        self.routes.push(TopicRoute {
            id,
            destination: path.to_string(),
            sender,
        });
        receiver
    }

    fn take_lifecycle(&mut self) -> Option<mpsc::UnboundedReceiver<LifecycleEvent>> {
        self.lifecycle_rx.take()
    }

    async fn connect(&mut self) -> MmResult<()> {
        if self.handshake_attempted {
            return Err(MmError::Protocol("handshake already attempted".into()));
        }
        self.handshake_attempted = true;

        let Socket { outgoing, incoming } = self
            .connector
            .open(&self.url, &self.headers, &self.config.socket)
            .await?;

        outgoing
            .send(self.connect_frame().encode())
            .map_err(|_| MmError::SocketDisconnected)?;

        let subscribe_frames = self
            .routes
            .iter()
            .map(|r| {
                Frame::new(Command::Subscribe)
                    .header("id", r.id.clone())
                    .header("destination", r.destination.clone())
                    .header("ack", "auto")
                    .encode()
            })
            .collect();
        let reader = Reader {
            incoming,
            outgoing: outgoing.clone(),
            lifecycle: self.lifecycle_tx.clone(),
            routes: self
                .routes
                .iter()
                .map(|r| (r.id.clone(), r.sender.clone()))
                .collect(),
            destinations: self
                .routes
                .iter()
                .map(|r| (r.destination.clone(), r.id.clone()))
                .collect(),
            subscribe_frames,
            offer: self.config.heartbeat,
            handshake_timeout: self.config.socket.connect_timeout,
            connected: false,
        };

        self.reader = Some(tokio::spawn(reader.run()));
        self.outgoing = Some(outgoing);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(outgoing) = self.outgoing.take() {
            let _ = outgoing.send(Frame::new(Command::Disconnect).encode());
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        info!("stomp session closed: {}", self.url);
    }
}

impl<C: Connector> Drop for StompClient<C> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Reader task state. Owns the inbound half of the socket.
struct Reader {
    incoming: mpsc::UnboundedReceiver<SocketMessage>,
    outgoing: mpsc::UnboundedSender<String>,
    lifecycle: mpsc::UnboundedSender<LifecycleEvent>,
    routes: HashMap<String, mpsc::UnboundedSender<String>>,
    destinations: HashMap<String, String>,
    subscribe_frames: Vec<String>,
    offer: HeartBeat,
    /// How long CONNECTED may take once CONNECT is on the wire.
    handshake_timeout: Duration,
    connected: bool,
}

enum Step {
    Continue,
    Stop(LifecycleEvent),
}

impl Reader {
    async fn run(mut self) {
        let mut send_every: Option<Duration> = None;
        let mut expect_every: Option<Duration> = None;
        let mut next_beat: Option<Instant> = None;
        let mut last_seen = Instant::now();
        let mut handshake_deadline = Some(last_seen + self.handshake_timeout);

        let terminal = loop {
            let watchdog = expect_every.map(|every| last_seen + every * 2);
            tokio::select! {
                msg = self.incoming.recv() => {
                    let text = match msg {
                        Some(SocketMessage::Text(text)) => text,
                        Some(SocketMessage::Error(reason)) => break LifecycleEvent::Error(reason),
                        Some(SocketMessage::Closed(_)) | None => break LifecycleEvent::Closed,
                    };
                    last_seen = Instant::now();
                    match self.handle_text(&text, &mut send_every, &mut expect_every) {
                        Step::Continue => {}
                        Step::Stop(event) => break event,
                    }
                    if self.connected {
                        handshake_deadline = None;
                    }
                    if next_beat.is_none() {
                        next_beat = send_every.map(|every| Instant::now() + every);
                    }
                }
                _ = wait_until(next_beat) => {
                    if self.outgoing.send(HEARTBEAT_EOL.to_string()).is_err() {
                        break LifecycleEvent::Closed;
                    }
                    next_beat = send_every.map(|every| Instant::now() + every);
                }
                _ = wait_until(watchdog) => {
                    break LifecycleEvent::Error("heart-beat timeout".into());
                }
                _ = wait_until(handshake_deadline) => {
                    break LifecycleEvent::Error("handshake timeout".into());
                }
            }
        };

        debug!("stomp reader finished: {terminal:?}");
        let _ = self.lifecycle.send(terminal);
    }

    fn handle_text(
        &mut self,
        text: &str,
        send_every: &mut Option<Duration>,
        expect_every: &mut Option<Duration>,
    ) -> Step {
        for item in stomp::decode(text) {
            let frame = match item {
                Ok(Incoming::Frame(frame)) => frame,
                Ok(Incoming::HeartBeat) => continue,
                Err(e) => {
                    warn!("ignoring undecodable stomp frame: {e}");
                    continue;
                }
            };
            match frame.command {
                Command::Connected => {
                    let negotiated = self
                        .offer
                        .negotiate(&HeartBeat::parse(frame.get("heart-beat")));
                    *send_every = negotiated.send_every;
                    *expect_every = negotiated.expect_every;
                    info!(
                        "stomp connected (version {}, heart-beat send={:?} expect={:?})",
                        frame.get("version").unwrap_or("?"),
                        negotiated.send_every,
                        negotiated.expect_every
                    );
                    for subscribe in self.subscribe_frames.drain(..) {
                        if self.outgoing.send(subscribe).is_err() {
                            return Step::Stop(LifecycleEvent::Closed);
                        }
                    }
                    self.connected = true;
                    let _ = self.lifecycle.send(LifecycleEvent::Opened);
                }
                Command::Message => self.route(frame),
                Command::Error => {
                    let reason = frame
                        .get("message")
                        .map(str::to_string)
                        .unwrap_or_else(|| frame.body.clone());
                    warn!("stomp error frame: {reason}");
                    return Step::Stop(LifecycleEvent::Error(reason));
                }
                Command::Receipt => debug!("receipt {:?}", frame.get("receipt-id")),
                other => debug!("ignoring unexpected {other} frame"),
            }
        }
        Step::Continue
    }

    fn route(&self, frame: Frame) {
        let id = frame
            .get("subscription")
            .map(str::to_string)
            .or_else(|| {
                frame
                    .get("destination")
                    .and_then(|d| self.destinations.get(d))
                    .cloned()
            });
        match id.as_ref().and_then(|id| self.routes.get(id)) {
            Some(sender) => {
                // A dropped topic stream just means nobody listens any more.
                let _ = sender.send(frame.body);
            }
            None => debug!(
                "message for unknown subscription {:?} ({:?})",
                frame.get("subscription"),
                frame.get("destination")
            ),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Host part of a socket URL, for the CONNECT `host` header.
fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let end = rest.find(['/', '?']).unwrap_or(rest.len());
    let authority = &rest[..end];
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    }
}
