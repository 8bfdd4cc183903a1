//! Shared test utilities for integration tests.
//!
//! `scripted()` returns a session factory whose sessions do no I/O. Every
//! `connect()` call hands a `ScriptedPeer` to the test so it can push frames
//! and lifecycle events into that session.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use mm_core::config::SocketConfig;
use mm_core::error::{MmError, MmResult};
use mm_socket::{
    ConnectionState, FrameStream, LifecycleEvent, ProtocolSession, SessionConfig, SessionFactory,
    SocketManager,
};

pub const BASE_URL: &str = "https://api.example.com";

/// What the sessions did, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    Connect(String),
    Disconnect(String),
}

#[derive(Default)]
struct Script {
    calls: Vec<Call>,
    fail_creates: u32,
    fail_connects: u32,
    stall_connects: u32,
}

/// Test-side view of one session.
pub struct ScriptedPeer {
    pub url: String,
    pub opened_at: Instant,
    pub topics: Vec<(String, mpsc::UnboundedSender<String>)>,
    pub lifecycle: mpsc::UnboundedSender<LifecycleEvent>,
    pub connect_ok: bool,
    /// The session's `connect()` never returns.
    pub stalled: bool,
}

impl ScriptedPeer {
    pub fn open(&self) {
        let _ = self.lifecycle.send(LifecycleEvent::Opened);
    }

    pub fn close(&self) {
        let _ = self.lifecycle.send(LifecycleEvent::Closed);
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.lifecycle.send(LifecycleEvent::Error(reason.to_string()));
    }

    /// Push a raw frame body on the topic registered under `path`.
    pub fn deliver(&self, path: &str, body: &str) {
        let (_, sender) = self
            .topics
            .iter()
            .find(|(p, _)| p == path)
            .unwrap_or_else(|| panic!("topic {path} not registered"));
        let _ = sender.send(body.to_string());
    }
}

pub struct ScriptedFactory {
    script: Arc<Mutex<Script>>,
    peers: mpsc::UnboundedSender<ScriptedPeer>,
}

/// Handle the test keeps to steer and observe the factory.
pub struct ScriptHandle {
    script: Arc<Mutex<Script>>,
    pub peers: mpsc::UnboundedReceiver<ScriptedPeer>,
}

impl ScriptHandle {
    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Connect(_)))
            .count()
    }

    pub fn fail_next_creates(&self, n: u32) {
        self.script.lock().unwrap().fail_creates = n;
    }

    pub fn fail_next_connects(&self, n: u32) {
        self.script.lock().unwrap().fail_connects = n;
    }

    /// Make the next `n` handshakes hang forever.
    pub fn stall_next_connects(&self, n: u32) {
        self.script.lock().unwrap().stall_connects = n;
    }

    /// Next session that reached `connect()`.
    pub async fn next_session(&mut self) -> ScriptedPeer {
        self.peers.recv().await.expect("factory dropped")
    }

    /// True if no session reaches `connect()` within `within`.
    pub async fn no_session_within(&mut self, within: Duration) -> bool {
        tokio::time::timeout(within, self.peers.recv()).await.is_err()
    }
}

pub fn scripted() -> (ScriptedFactory, ScriptHandle) {
    let script = Arc::new(Mutex::new(Script::default()));
    let (peers_tx, peers_rx) = mpsc::unbounded_channel();
    (
        ScriptedFactory {
            script: script.clone(),
            peers: peers_tx,
        },
        ScriptHandle {
            script,
            peers: peers_rx,
        },
    )
}

impl SessionFactory for ScriptedFactory {
    fn create(
        &self,
        url: &str,
        _headers: &[(String, String)],
        _config: &SessionConfig,
    ) -> MmResult<Box<dyn ProtocolSession>> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call::Create(url.to_string()));
        if script.fail_creates > 0 {
            script.fail_creates -= 1;
            return Err(MmError::Internal("scripted create failure".into()));
        }
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        Ok(Box::new(ScriptedSession {
            url: url.to_string(),
            script: self.script.clone(),
            peers: self.peers.clone(),
            topics: Vec::new(),
            lifecycle_tx,
            lifecycle_rx: Some(lifecycle_rx),
        }))
    }
}

struct ScriptedSession {
    url: String,
    script: Arc<Mutex<Script>>,
    peers: mpsc::UnboundedSender<ScriptedPeer>,
    topics: Vec<(String, mpsc::UnboundedSender<String>)>,
    lifecycle_tx: mpsc::UnboundedSender<LifecycleEvent>,
    lifecycle_rx: Option<mpsc::UnboundedReceiver<LifecycleEvent>>,
}

#[async_trait]
impl ProtocolSession for ScriptedSession {
    fn topic(&mut self, path: &str) -> FrameStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.topics.push((path.to_string(), tx));
        rx
    }

    fn take_lifecycle(&mut self) -> Option<mpsc::UnboundedReceiver<LifecycleEvent>> {
        self.lifecycle_rx.take()
    }

    async fn connect(&mut self) -> MmResult<()> {
        let (connect_ok, stalled) = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(Call::Connect(self.url.clone()));
            let stalled = script.stall_connects > 0;
            if stalled {
                script.stall_connects -= 1;
            }
            if script.fail_connects > 0 {
                script.fail_connects -= 1;
                (false, stalled)
            } else {
                (true, stalled)
            }
        };
        let _ = self.peers.send(ScriptedPeer {
            url: self.url.clone(),
            opened_at: Instant::now(),
            topics: self.topics.clone(),
            lifecycle: self.lifecycle_tx.clone(),
            connect_ok,
            stalled,
        });
        if stalled {
            std::future::pending::<()>().await;
        }
        if connect_ok {
            Ok(())
        } else {
            Err(MmError::ConnectFailed("scripted connect failure".into()))
        }
    }

    async fn disconnect(&mut self) {
        self.script
            .lock()
            .unwrap()
            .calls
            .push(Call::Disconnect(self.url.clone()));
    }
}

/// A manager over a scripted factory with default socket settings.
pub fn manager() -> (SocketManager, ScriptHandle) {
    manager_with(SocketConfig::default())
}

pub fn manager_with(config: SocketConfig) -> (SocketManager, ScriptHandle) {
    let (factory, handle) = scripted();
    (SocketManager::new(factory, BASE_URL, Vec::new(), &config), handle)
}

pub fn url_for(identity: u64) -> String {
    format!("wss://api.example.com/ws/websocket?userId={identity}")
}

/// Wait until the state watcher reports `state`.
pub async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, state: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for state")
        .expect("manager dropped");
}

/// Let spawned tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
