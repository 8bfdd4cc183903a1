//! Connection lifecycle controller.
//!
//! One actor task owns the logical connection: identity, state, reconnect
//! counter, the active protocol session and any pending reconnect timer.
//! `SocketManager` handles, lifecycle callbacks from the session and
//! backoff timers all talk to it through one command channel, so every
//! mutation happens on a single writer.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use mm_core::config::{AppConfig, SocketConfig};
use mm_core::error::{MmError, MmResult};

use crate::client::{
    LifecycleEvent, ProtocolSession, SessionConfig, SessionFactory, StompSessionFactory,
};
use crate::endpoint;
use crate::events::{ConnectionState, EventDispatcher, InboundEvent};
use crate::normalizer::Normalizer;
use crate::topics;
use crate::transport::WebSocketConnector;

/// Linear, capped reconnect backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay added per attempt.
    pub base_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
    /// Attempts allowed after a failure before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from(&SocketConfig::default())
    }
}

impl From<&SocketConfig> for ReconnectConfig {
    fn from(config: &SocketConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
            max_attempts: config.max_reconnect_attempts,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the 1-based `attempt`: `min(base * attempt, max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt).min(self.max_delay)
    }
}

/// Point-in-time view of the controller for readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSnapshot {
    pub state: ConnectionState,
    pub identity: Option<u64>,
    pub reconnect_attempts: u32,
}

enum Command {
    Connect {
        identity: u64,
        done: oneshot::Sender<()>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
    /// The handshake of a session started by `attempt_session` finished.
    SessionStarted {
        generation: u64,
        active: ActiveSession,
        result: MmResult<()>,
    },
    Lifecycle {
        generation: u64,
        event: LifecycleEvent,
    },
    ReconnectDue {
        token: u64,
    },
}

/// Handle to the connection lifecycle controller.
///
/// Cheap to clone. When the last handle is dropped the controller tears
/// down its session and stops.
#[derive(Clone)]
pub struct SocketManager {
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    status_rx: watch::Receiver<bool>,
    snapshot_rx: watch::Receiver<ManagerSnapshot>,
    dispatcher: EventDispatcher,
}

impl SocketManager {
    /// Spawn a controller using the given session factory.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<F: SessionFactory>(
        factory: F,
        base_url: impl Into<String>,
        headers: Vec<(String, String)>,
        config: &SocketConfig,
    ) -> Self {
        let dispatcher = EventDispatcher::new(config.event_buffer);
        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (status_tx, status_rx) = watch::channel(false);
        let (snapshot_tx, snapshot_rx) = watch::channel(ManagerSnapshot {
            state: ConnectionState::Disconnected,
            identity: None,
            reconnect_attempts: 0,
        });

        let actor = Controller {
            factory: Box::new(factory),
            base_url: base_url.into(),
            headers,
            session_config: SessionConfig::from(config),
            reconnect: ReconnectConfig::from(config),
            normalizer: Normalizer::new(dispatcher.clone(), config.dedup_history),
            commands: commands.downgrade(),
            state: ConnectionState::Disconnected,
            identity: None,
            reconnect_desired: false,
            reconnect_attempts: 0,
            generation: 0,
            session: None,
            pending_start: None,
            pending_reconnect: None,
            next_token: 0,
            state_tx,
            status_tx,
            snapshot_tx,
        };
        tokio::spawn(actor.run(rx));

        Self {
            commands,
            state_rx,
            status_rx,
            snapshot_rx,
            dispatcher,
        }
    }

    /// Controller speaking STOMP over WebSocket, configured from `AppConfig`.
    pub fn from_config(config: &AppConfig) -> Self {
        let headers = config
            .server
            .custom_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self::new(
            StompSessionFactory::new(WebSocketConnector),
            config.server.base_url.clone(),
            headers,
            &config.socket,
        )
    }

    /// Start (or switch) the logical connection for `identity`.
    ///
    /// A no-op when already connected as `identity`. Returns once the first
    /// session attempt has been issued; failures only show up in the state.
    pub async fn connect(&self, identity: u64) {
        let (done, ack) = oneshot::channel();
        if self.commands.send(Command::Connect { identity, done }).is_ok() {
            let _ = ack.await;
        }
    }

    /// Stop the connection and any pending reconnect.
    ///
    /// When this returns no further session will be opened until the next
    /// `connect`.
    pub async fn disconnect(&self) {
        let (done, ack) = oneshot::channel();
        if self.commands.send(Command::Disconnect { done }).is_ok() {
            let _ = ack.await;
        }
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Subscribe to the "is connected" signal.
    pub fn status_receiver(&self) -> watch::Receiver<bool> {
        self.status_rx.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        *self.status_rx.borrow()
    }

    pub fn identity(&self) -> Option<u64> {
        self.snapshot_rx.borrow().identity
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.snapshot_rx.borrow().reconnect_attempts
    }

    /// State, identity and attempt counter read together.
    pub fn snapshot(&self) -> ManagerSnapshot {
        *self.snapshot_rx.borrow()
    }

    /// Subscribe to inbound events. Only events published after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.dispatcher.subscribe()
    }
}

/// A session owned by the controller, or by its handshake task.
struct ActiveSession {
    generation: u64,
    session: Box<dyn ProtocolSession>,
    /// Topic pumps, plus the lifecycle forwarder once the handshake is sent.
    tasks: Vec<JoinHandle<()>>,
    /// Held back until the handshake succeeds so events queue up in order.
    lifecycle: Option<mpsc::UnboundedReceiver<LifecycleEvent>>,
}

impl ActiveSession {
    async fn close(mut self) {
        self.abort_tasks();
        self.session.disconnect().await;
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// A handshake running off the actor.
struct PendingStart {
    generation: u64,
    handle: JoinHandle<()>,
}

struct PendingReconnect {
    token: u64,
    handle: JoinHandle<()>,
}

struct Controller {
    factory: Box<dyn SessionFactory>,
    base_url: String,
    headers: Vec<(String, String)>,
    session_config: SessionConfig,
    reconnect: ReconnectConfig,
    normalizer: Normalizer,
    /// Weak so that in-flight callbacks never keep the controller alive.
    commands: mpsc::WeakUnboundedSender<Command>,

    state: ConnectionState,
    identity: Option<u64>,
    reconnect_desired: bool,
    reconnect_attempts: u32,
    generation: u64,
    session: Option<ActiveSession>,
    pending_start: Option<PendingStart>,
    pending_reconnect: Option<PendingReconnect>,
    next_token: u64,

    state_tx: watch::Sender<ConnectionState>,
    status_tx: watch::Sender<bool>,
    snapshot_tx: watch::Sender<ManagerSnapshot>,
}

impl Controller {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Connect { identity, done } => {
                    self.connect(identity).await;
                    let _ = done.send(());
                }
                Command::Disconnect { done } => {
                    self.disconnect().await;
                    let _ = done.send(());
                }
                Command::SessionStarted {
                    generation,
                    active,
                    result,
                } => {
                    self.on_session_started(generation, active, result).await;
                }
                Command::Lifecycle { generation, event } => {
                    self.on_lifecycle(generation, event).await;
                }
                Command::ReconnectDue { token } => {
                    self.on_reconnect_due(token).await;
                }
            }
            self.publish_snapshot();
        }

        debug!("all socket manager handles dropped, shutting down");
        self.cancel_reconnect();
        self.teardown().await;
    }

    async fn connect(&mut self, identity: u64) {
        if self.state == ConnectionState::Connected && self.identity == Some(identity) {
            debug!("already connected as {identity}, skipping");
            return;
        }

        self.cancel_reconnect();
        self.teardown().await;
        if self.identity != Some(identity) {
            self.normalizer.clear_history().await;
        }

        info!("socket connect requested for identity {identity}");
        self.identity = Some(identity);
        self.reconnect_desired = true;
        self.reconnect_attempts = 0;
        self.attempt_session().await;
    }

    async fn disconnect(&mut self) {
        self.reconnect_desired = false;
        self.cancel_reconnect();
        self.teardown().await;
        if let Some(identity) = self.identity.take() {
            info!("socket disconnected for identity {identity}");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Open a fresh session for the current identity.
    ///
    /// The session is built here; its handshake runs on a separate task and
    /// reports back with `SessionStarted`, so the actor keeps serving
    /// commands while the transport connects.
    async fn attempt_session(&mut self) {
        let Some(identity) = self.identity else {
            return;
        };

        self.set_state(ConnectionState::Connecting);
        self.generation += 1;
        let generation = self.generation;

        let mut active = match self.build_session(identity, generation) {
            Ok(active) => active,
            Err(e) => {
                self.log_setup_failure(&e);
                self.on_failure().await;
                return;
            }
        };

        let commands = self.commands.clone();
        let handle = tokio::spawn(async move {
            let result = active.session.connect().await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::SessionStarted {
                    generation,
                    active,
                    result,
                });
            }
        });
        self.pending_start = Some(PendingStart { generation, handle });
    }

    fn log_setup_failure(&self, e: &MmError) {
        if e.is_connection_error() {
            warn!("session setup failed (attempt {}): {e}", self.reconnect_attempts);
        } else {
            error!("session setup failed (attempt {}): {e}", self.reconnect_attempts);
        }
    }

    fn build_session(&self, identity: u64, generation: u64) -> MmResult<ActiveSession> {
        let url = endpoint::socket_url(&self.base_url, identity)?;
        debug!("opening session {generation} to {url}");
        let mut session = self.factory.create(&url, &self.headers, &self.session_config)?;

        let mut tasks = Vec::new();
        for (path, kind) in topics::resolve_all(identity) {
            let mut frames = session.topic(&path);
            let normalizer = self.normalizer.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(raw) = frames.recv().await {
                    normalizer.handle(kind, &raw).await;
                }
            }));
        }

        let lifecycle = session
            .take_lifecycle()
            .ok_or_else(|| MmError::Internal("session lifecycle stream already taken".into()))?;

        Ok(ActiveSession {
            generation,
            session,
            tasks,
            lifecycle: Some(lifecycle),
        })
    }

    async fn on_session_started(
        &mut self,
        generation: u64,
        mut active: ActiveSession,
        result: MmResult<()>,
    ) {
        if self.pending_start.as_ref().map(|p| p.generation) != Some(generation) {
            debug!("discarding superseded session {generation}");
            active.close().await;
            return;
        }
        self.pending_start = None;

        if let Err(e) = result {
            self.log_setup_failure(&e);
            active.close().await;
            self.on_failure().await;
            return;
        }

        if let Some(mut lifecycle) = active.lifecycle.take() {
            let commands = self.commands.clone();
            active.tasks.push(tokio::spawn(async move {
                while let Some(event) = lifecycle.recv().await {
                    let Some(commands) = commands.upgrade() else {
                        break;
                    };
                    if commands.send(Command::Lifecycle { generation, event }).is_err() {
                        break;
                    }
                }
            }));
        }
        self.session = Some(active);
    }

    async fn on_lifecycle(&mut self, generation: u64, event: LifecycleEvent) {
        if self.session.as_ref().map(|s| s.generation) != Some(generation) {
            debug!("ignoring {event:?} from stale session {generation}");
            return;
        }

        match event {
            LifecycleEvent::Opened => {
                if self.reconnect_attempts > 0 {
                    info!("reconnected after {} attempt(s)", self.reconnect_attempts);
                }
                self.reconnect_attempts = 0;
                self.set_state(ConnectionState::Connected);
            }
            LifecycleEvent::Error(reason) => {
                warn!("socket error: {reason}");
                self.on_failure().await;
            }
            LifecycleEvent::Closed => {
                warn!("socket closed");
                self.on_failure().await;
            }
        }
    }

    /// Shared path for setup errors, transport errors and closes.
    async fn on_failure(&mut self) {
        self.teardown().await;
        self.set_state(ConnectionState::Disconnected);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if !self.reconnect_desired {
            return;
        }
        if self.reconnect_attempts >= self.reconnect.max_attempts {
            error!(
                "max reconnection attempts ({}) reached, staying disconnected",
                self.reconnect.max_attempts
            );
            return;
        }

        self.reconnect_attempts += 1;
        let attempt = self.reconnect_attempts;
        let delay = self.reconnect.delay(attempt);
        warn!("reconnection attempt {attempt} in {:.1}s", delay.as_secs_f64());

        self.next_token += 1;
        let token = self.next_token;
        let commands = self.commands.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::ReconnectDue { token });
            }
        });
        self.pending_reconnect = Some(PendingReconnect { token, handle });
    }

    async fn on_reconnect_due(&mut self, token: u64) {
        if self.pending_reconnect.as_ref().map(|p| p.token) != Some(token) {
            debug!("ignoring superseded reconnect timer {token}");
            return;
        }
        self.pending_reconnect = None;
        if !self.reconnect_desired || self.session.is_some() || self.pending_start.is_some() {
            debug!("reconnect no longer needed");
            return;
        }
        self.attempt_session().await;
    }

    fn cancel_reconnect(&mut self) {
        if let Some(pending) = self.pending_reconnect.take() {
            debug!("cancelling pending reconnect {}", pending.token);
            pending.handle.abort();
        }
    }

    async fn teardown(&mut self) {
        if let Some(pending) = self.pending_start.take() {
            debug!("abandoning handshake of session {}", pending.generation);
            // Aborting drops the half-open session with it.
            pending.handle.abort();
        }
        if let Some(active) = self.session.take() {
            debug!("tearing down session {}", active.generation);
            active.close().await;
        }
    }

    fn set_state(&mut self, new_state: ConnectionState) {
        if self.state != new_state {
            info!("socket state: {} -> {}", self.state, new_state);
            self.state = new_state;
            self.state_tx.send_replace(new_state);
        }
        let connected = new_state.is_connected();
        self.status_tx.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        let snapshot = ManagerSnapshot {
            state: self.state,
            identity: self.identity,
            reconnect_attempts: self.reconnect_attempts,
        };
        self.snapshot_tx.send_if_modified(|current| {
            let changed = *current != snapshot;
            *current = snapshot;
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_capped_backoff() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay(1), Duration::from_millis(2_000));
        assert_eq!(config.delay(2), Duration::from_millis(4_000));
        assert_eq!(config.delay(3), Duration::from_millis(6_000));
        assert_eq!(config.delay(14), Duration::from_millis(28_000));
        assert_eq!(config.delay(15), Duration::from_millis(30_000));
        assert_eq!(config.delay(20), Duration::from_millis(30_000));
        assert_eq!(config.delay(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_reconnect_config_from_socket_config() {
        let socket = SocketConfig {
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 1_200,
            max_reconnect_attempts: 3,
            ..SocketConfig::default()
        };
        let config = ReconnectConfig::from(&socket);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.delay(2), Duration::from_millis(1_000));
        assert_eq!(config.delay(3), Duration::from_millis(1_200));
    }
}
