//! Inbound event types and the event dispatcher.
//!
//! Defines the closed set of events delivered by the broker and a
//! broadcast-based dispatcher for decoupled consumption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Which schema a topic's payloads follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ChatMessage,
    ChatRequest,
    Notification,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatMessage => "chat-message",
            Self::ChatRequest => "chat-request",
            Self::Notification => "notification",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message pushed to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub chat_id: Option<i64>,
    pub sender_id: i64,
    #[serde(default)]
    pub receiver_id: Option<i64>,
    pub content: String,
    /// e.g. "TEXT", "IMAGE".
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_read: bool,
}

/// Someone asked to open a chat with the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestPayload {
    #[serde(default)]
    pub id: Option<i64>,
    pub sender_id: i64,
    #[serde(default)]
    pub receiver_id: Option<i64>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// "PENDING", "ACCEPTED" or "REJECTED".
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A generic in-app notification (likes, profile views, matches).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "message")]
    pub body: Option<String>,
    #[serde(default, alias = "type")]
    pub notification_type: Option<String>,
    #[serde(default)]
    pub reference_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// An event published to consumers.
///
/// Serializes as `{"kind": "chat-message", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum InboundEvent {
    ChatMessage(ChatMessagePayload),
    ChatRequest(ChatRequestPayload),
    Notification(NotificationPayload),
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ChatMessage(_) => EventKind::ChatMessage,
            Self::ChatRequest(_) => EventKind::ChatRequest,
            Self::Notification(_) => EventKind::Notification,
        }
    }

    /// Server-assigned id, when the payload carries one.
    pub fn id(&self) -> Option<i64> {
        match self {
            Self::ChatMessage(p) => p.id,
            Self::ChatRequest(p) => p.id,
            Self::Notification(p) => p.id,
        }
    }
}

/// Broadcast-based event dispatcher.
///
/// Receivers only see events sent after they subscribed. A receiver that
/// falls more than the capacity behind gets `RecvError::Lagged` and skips
/// ahead; the sender never blocks.
#[derive(Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<InboundEvent>,
}

impl EventDispatcher {
    /// Create a new EventDispatcher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.sender.subscribe()
    }

    /// Dispatch an event to all active subscribers.
    pub fn dispatch(&self, event: InboundEvent) {
        let kind = event.kind();
        match self.sender.send(event) {
            Ok(count) => debug!("dispatched {kind} to {count} subscriber(s)"),
            // No receivers yet, or all gone.
            Err(_) => debug!("no subscribers for {kind}"),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Connection state of the lifecycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_message(id: i64) -> InboundEvent {
        InboundEvent::ChatMessage(ChatMessagePayload {
            id: Some(id),
            chat_id: Some(1),
            sender_id: 7,
            receiver_id: Some(42),
            content: "hello".into(),
            message_type: None,
            created_at: None,
            is_read: false,
        })
    }

    #[test]
    fn test_chat_message_payload_camel_case() {
        let json = serde_json::json!({
            "id": 10,
            "chatId": 3,
            "senderId": 7,
            "receiverId": 42,
            "content": "hi there",
            "messageType": "TEXT",
            "createdAt": "2024-05-01T12:00:00Z",
            "isRead": true,
            "extra": "ignored"
        });
        let payload: ChatMessagePayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.chat_id, Some(3));
        assert_eq!(payload.message_type.as_deref(), Some("TEXT"));
        assert!(payload.is_read);
        assert!(payload.created_at.is_some());
    }

    #[test]
    fn test_chat_message_requires_sender_and_content() {
        let json = serde_json::json!({"senderId": 7});
        assert!(serde_json::from_value::<ChatMessagePayload>(json).is_err());
    }

    #[test]
    fn test_notification_aliases() {
        let json = serde_json::json!({"type": "LIKE", "message": "Someone liked you"});
        let payload: NotificationPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.notification_type.as_deref(), Some("LIKE"));
        assert_eq!(payload.body.as_deref(), Some("Someone liked you"));
    }

    #[test]
    fn test_inbound_event_accessors() {
        let event = chat_message(5);
        assert_eq!(event.kind(), EventKind::ChatMessage);
        assert_eq!(event.id(), Some(5));
    }

    #[test]
    fn test_inbound_event_serializes_with_kind_tag() {
        let value = serde_json::to_value(chat_message(5)).unwrap();
        assert_eq!(value["kind"], EventKind::ChatMessage.as_str());
        assert_eq!(value["payload"]["senderId"], 7);
        assert_eq!(value["payload"]["content"], "hello");
    }

    #[tokio::test]
    async fn test_dispatcher_fans_out() {
        let dispatcher = EventDispatcher::new(16);
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.subscriber_count(), 2);

        dispatcher.dispatch(chat_message(1));

        assert_eq!(a.recv().await.unwrap(), chat_message(1));
        assert_eq!(b.recv().await.unwrap(), chat_message(1));
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_no_replay() {
        let dispatcher = EventDispatcher::new(16);
        dispatcher.dispatch(chat_message(1));

        let mut late = dispatcher.subscribe();
        dispatcher.dispatch(chat_message(2));
        assert_eq!(late.recv().await.unwrap().id(), Some(2));
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
    }
}
