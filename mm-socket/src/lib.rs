//! Matchmaker Socket - real-time messaging connection manager.
//!
//! This crate keeps one persistent STOMP-over-WebSocket connection to the
//! message broker and handles:
//! - Session setup with heart-beat negotiation and a fixed topic table
//! - Automatic reconnection with linear, capped backoff
//! - Typed decoding of chat messages, chat requests and notifications
//! - Event dispatching via tokio broadcast channels
//! - Connection state signalling via tokio watch channels

pub mod client;
pub mod endpoint;
pub mod events;
pub mod manager;
pub mod normalizer;
pub mod stomp;
pub mod topics;
pub mod transport;

// Re-export key types
pub use client::{
    FrameStream, LifecycleEvent, ProtocolSession, SessionConfig, SessionFactory, StompClient,
    StompSessionFactory,
};
pub use events::{
    ChatMessagePayload, ChatRequestPayload, ConnectionState, EventDispatcher, EventKind,
    InboundEvent, NotificationPayload,
};
pub use manager::{ManagerSnapshot, ReconnectConfig, SocketManager};
pub use normalizer::Normalizer;
pub use topics::{TopicSubscription, SUBSCRIPTIONS};
pub use transport::{Connector, Socket, SocketClientConfig, SocketMessage, WebSocketConnector};
