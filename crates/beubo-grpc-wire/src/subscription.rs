//! Subscription endpoint — peers registering for future request delivery.
//!
//! Subscriptions are recorded for observability only. Requests still go to
//! whichever stream session drains the request queue.

use beubo_grpc_types::message::PluginMessage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

/// A peer that asked to receive requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscriber {
    /// Human-readable peer name (latest seen).
    pub name: String,
    /// Peer identifier.
    pub identifier: String,
    /// When the peer first subscribed.
    pub first_seen: DateTime<Utc>,
    /// When the peer last subscribed.
    pub last_seen: DateTime<Utc>,
    /// How many times the peer has subscribed.
    pub calls: u64,
}

/// Thread-safe record of subscribed peers, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct SubscriberRegistry {
    subscribers: Arc<RwLock<HashMap<String, Subscriber>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a subscription call. Repeating it for the same identifier only
    /// refreshes the record.
    pub fn subscribe(&self, peer: &PluginMessage) {
        info!(
            name = %peer.name,
            identifier = %peer.identifier,
            "Plugin registered to receive requests"
        );
        let now = Utc::now();
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers
            .entry(peer.identifier.clone())
            .and_modify(|s| {
                s.name = peer.name.clone();
                s.last_seen = now;
                s.calls += 1;
            })
            .or_insert_with(|| Subscriber {
                name: peer.name.clone(),
                identifier: peer.identifier.clone(),
                first_seen: now,
                last_seen: now,
                calls: 1,
            });
    }

    /// Look up one subscriber.
    pub fn get(&self, identifier: &str) -> Option<Subscriber> {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        subscribers.get(identifier).cloned()
    }

    pub fn count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_records_peer() {
        let registry = SubscriberRegistry::new();
        registry.subscribe(&PluginMessage::new("Pages", "beubo_pages"));
        let sub = registry.get("beubo_pages").unwrap();
        assert_eq!(sub.name, "Pages");
        assert_eq!(sub.calls, 1);
        assert_eq!(sub.first_seen, sub.last_seen);
    }

    #[test]
    fn test_repeat_subscription_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let peer = PluginMessage::new("Pages", "beubo_pages");
        registry.subscribe(&peer);
        registry.subscribe(&peer);
        assert_eq!(registry.count(), 1);
        let sub = registry.get("beubo_pages").unwrap();
        assert_eq!(sub.calls, 2);
        assert!(sub.last_seen >= sub.first_seen);
    }

    #[test]
    fn test_distinct_identifiers_counted() {
        let registry = SubscriberRegistry::new();
        registry.subscribe(&PluginMessage::new("Zed", "z"));
        registry.subscribe(&PluginMessage::new("Alpha", "a"));
        assert_eq!(registry.count(), 2);
        assert!(registry.get("missing").is_none());
    }
}
