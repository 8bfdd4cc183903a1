//! Fixed topic subscriptions registered on every session.
//!
//! Several paths feed the same event kind because the broker routes user
//! queues under more than one spelling. Every entry is registered each time
//! a session opens.

use crate::events::EventKind;

/// Placeholder replaced by the connection identity.
const USER_PLACEHOLDER: &str = "{user}";

/// A (path template, event kind) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicSubscription {
    pub path: &'static str,
    pub kind: EventKind,
}

impl TopicSubscription {
    /// Resolve the path template for one identity.
    pub fn resolve(&self, identity: u64) -> String {
        self.path.replace(USER_PLACEHOLDER, &identity.to_string())
    }
}

/// Every subscription opened per session.
pub const SUBSCRIPTIONS: &[TopicSubscription] = &[
    TopicSubscription {
        path: "/user/{user}/queue/messages",
        kind: EventKind::ChatMessage,
    },
    TopicSubscription {
        path: "/user/queue/messages",
        kind: EventKind::ChatMessage,
    },
    TopicSubscription {
        path: "/topic/messages",
        kind: EventKind::ChatMessage,
    },
    TopicSubscription {
        path: "/user/{user}/queue/chat-requests",
        kind: EventKind::ChatRequest,
    },
    TopicSubscription {
        path: "/user/{user}/queue/notifications",
        kind: EventKind::Notification,
    },
];

/// Resolve the whole table for one identity, in table order.
pub fn resolve_all(identity: u64) -> Vec<(String, EventKind)> {
    SUBSCRIPTIONS
        .iter()
        .map(|sub| (sub.resolve(identity), sub.kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_scoped_paths() {
        let resolved = resolve_all(42);
        assert_eq!(resolved.len(), SUBSCRIPTIONS.len());
        assert_eq!(resolved[0].0, "/user/42/queue/messages");
        assert_eq!(resolved[1].0, "/user/queue/messages");
        assert_eq!(resolved[3], ("/user/42/queue/chat-requests".to_string(), EventKind::ChatRequest));
    }

    #[test]
    fn test_every_kind_is_covered() {
        for kind in [EventKind::ChatMessage, EventKind::ChatRequest, EventKind::Notification] {
            assert!(SUBSCRIPTIONS.iter().any(|s| s.kind == kind), "{kind:?} has no topic");
        }
    }

    #[test]
    fn test_resolved_paths_are_unique() {
        let resolved = resolve_all(7);
        let mut paths: Vec<_> = resolved.iter().map(|(p, _)| p.clone()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), resolved.len());
    }
}
