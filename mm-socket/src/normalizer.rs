//! Inbound frame normalization.
//!
//! Maps a raw frame body plus its topic's event kind to a typed
//! `InboundEvent` and publishes it. Malformed bodies are logged and dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use mm_core::error::MmResult;

use crate::events::{
    ChatMessagePayload, ChatRequestPayload, EventDispatcher, EventKind, InboundEvent,
    NotificationPayload,
};

/// Decode a raw body against the schema of `kind`.
pub fn decode(kind: EventKind, raw: &str) -> MmResult<InboundEvent> {
    let event = match kind {
        EventKind::ChatMessage => {
            InboundEvent::ChatMessage(serde_json::from_str::<ChatMessagePayload>(raw)?)
        }
        EventKind::ChatRequest => {
            InboundEvent::ChatRequest(serde_json::from_str::<ChatRequestPayload>(raw)?)
        }
        EventKind::Notification => {
            InboundEvent::Notification(serde_json::from_str::<NotificationPayload>(raw)?)
        }
    };
    Ok(event)
}

/// Decodes frames and publishes them on the dispatcher.
///
/// The same message can arrive on several redundant topics; a bounded
/// history of `(kind, id)` keys drops the repeats.
#[derive(Clone)]
pub struct Normalizer {
    dispatcher: EventDispatcher,
    handled: Arc<Mutex<VecDeque<(EventKind, i64)>>>,
    history: usize,
}

impl Normalizer {
    /// `history` of 0 disables deduplication.
    pub fn new(dispatcher: EventDispatcher, history: usize) -> Self {
        Self {
            dispatcher,
            handled: Arc::new(Mutex::new(VecDeque::with_capacity(history))),
            history,
        }
    }

    /// Handle one frame. Returns whether an event was published.
    pub async fn handle(&self, kind: EventKind, raw: &str) -> bool {
        let event = match decode(kind, raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("dropping malformed {kind} payload: {e}");
                return false;
            }
        };

        if self.history > 0 {
            if let Some(id) = event.id() {
                let mut handled = self.handled.lock().await;
                if handled.contains(&(kind, id)) {
                    debug!("duplicate {kind} {id} skipped");
                    return false;
                }
                handled.push_back((kind, id));
                if handled.len() > self.history {
                    handled.pop_front();
                }
            }
        }

        self.dispatcher.dispatch(event);
        true
    }

    /// Forget every remembered id.
    pub async fn clear_history(&self) {
        self.handled.lock().await.clear();
    }
}
