//! The WebSocket Broadcast Manager: tracks connected clients, fans out
//! typed events to all of them, and answers heartbeat/connection-count
//! queries. Grounded on `websocket_manager.py`'s `WebSocketManager`, reshaped
//! around a `tokio::sync::broadcast` channel -- axum's WS handler owns the
//! actual socket per connection and just subscribes to the channel, so a
//! slow or dead client never blocks a broadcast to the others.

use crate::events::Event;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

const CHANNEL_CAPACITY: usize = 1024;

/// A connection's subscription filter, set via a `subscribe`/`update_filter`
/// client message. Any field left `None` (or an empty list) means "no
/// restriction on this dimension" -- a filter with every field absent
/// matches everything, which is the default for a freshly connected client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionFilter {
    #[serde(default)]
    pub agent_ids: Option<HashSet<String>>,
    #[serde(default)]
    pub task_ids: Option<HashSet<String>>,
    #[serde(default)]
    pub workflow_ids: Option<HashSet<String>>,
    #[serde(default)]
    pub event_categories: Option<HashSet<String>>,
}

impl SubscriptionFilter {
    /// `adw_id` stands in for this domain's notion of agent/task/workflow
    /// identity -- there is exactly one id per run, so the three id
    /// dimensions in the subscribe message all match against it.
    fn matches(&self, kind: &str, adw_id: Option<&str>) -> bool {
        let id_dims = [&self.agent_ids, &self.task_ids, &self.workflow_ids];
        for dim in id_dims {
            if let Some(ids) = dim {
                if ids.is_empty() {
                    continue;
                }
                match adw_id {
                    Some(id) if ids.contains(id) => {}
                    _ => return false,
                }
            }
        }
        if let Some(categories) = &self.event_categories {
            if !categories.is_empty() && !categories.contains(kind) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    pub client_id: String,
    pub connected_at: DateTime<Utc>,
    pub message_count: u64,
    pub filter: Option<SubscriptionFilter>,
}

pub struct BroadcastManager {
    sender: broadcast::Sender<Value>,
    connections: DashMap<u64, ConnectionMetadata>,
    next_conn_id: AtomicU64,
}

impl BroadcastManager {
    pub fn new() -> Arc<Self> {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(Self {
            sender,
            connections: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// Registers a new connection and returns its id plus a receiver the
    /// caller's WS task should forward to the socket.
    pub fn connect(&self, client_id: Option<String>) -> (u64, broadcast::Receiver<Value>) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        let client_id = client_id.unwrap_or_else(|| format!("client_{}_{conn_id}", Utc::now().timestamp_millis()));
        self.connections.insert(
            conn_id,
            ConnectionMetadata {
                client_id: client_id.clone(),
                connected_at: Utc::now(),
                message_count: 0,
                filter: None,
            },
        );
        info!(client_id, total = self.connections.len(), "websocket connected");
        (conn_id, self.sender.subscribe())
    }

    pub fn disconnect(&self, conn_id: u64) {
        if let Some((_, meta)) = self.connections.remove(&conn_id) {
            let duration = (Utc::now() - meta.connected_at).num_seconds();
            info!(
                client_id = meta.client_id,
                duration_secs = duration,
                messages = meta.message_count,
                remaining = self.connections.len(),
                "websocket disconnected"
            );
        }
    }

    pub fn record_activity(&self, conn_id: u64) {
        if let Some(mut meta) = self.connections.get_mut(&conn_id) {
            meta.message_count += 1;
        }
    }

    /// Installs (or replaces) the subscription filter for `conn_id`. Both
    /// the initial `subscribe` and a later `update_filter` message call
    /// this -- there is no merge semantics, the new filter fully replaces
    /// the old one.
    pub fn set_filter(&self, conn_id: u64, filter: SubscriptionFilter) {
        if let Some(mut meta) = self.connections.get_mut(&conn_id) {
            meta.filter = Some(filter);
        }
    }

    /// Removes `conn_id`'s filter, reverting it to "receive everything".
    pub fn clear_filter(&self, conn_id: u64) {
        if let Some(mut meta) = self.connections.get_mut(&conn_id) {
            meta.filter = None;
        }
    }

    /// Whether `conn_id` should be shown this already-enveloped `{type,
    /// data}` value, per its current subscription filter. A connection with
    /// no filter set (the default) sees everything.
    pub fn should_deliver(&self, conn_id: u64, envelope: &Value) -> bool {
        let Some(meta) = self.connections.get(&conn_id) else { return true };
        let Some(filter) = &meta.filter else { return true };
        let kind = envelope.get("type").and_then(|t| t.as_str()).unwrap_or("");
        let adw_id = envelope.get("data").and_then(|d| d.get("adw_id")).and_then(|a| a.as_str());
        filter.matches(kind, adw_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Sends `event`'s wire envelope to every current subscriber. A send
    /// failing because there are no receivers is not an error -- it just
    /// means nobody is connected right now.
    pub fn broadcast(&self, event: Event) {
        let _ = self.sender.send(event.to_wire());
    }

    pub fn broadcast_heartbeat(&self) {
        self.broadcast(crate::events::heartbeat(self.connection_count()));
    }

    /// Like `broadcast`, but for an event kind known only at runtime (the
    /// agent-state-update endpoint forwards whatever `type` the caller sent).
    pub fn broadcast_raw(&self, kind: &str, mut data: Value) {
        if let Value::Object(map) = &mut data {
            map.entry("timestamp").or_insert_with(|| serde_json::json!(Utc::now().to_rfc3339()));
        }
        let _ = self.sender.send(serde_json::json!({ "type": kind, "data": data }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_then_disconnect_updates_count() {
        let manager = BroadcastManager::new();
        let (id, _rx) = manager.connect(Some("c1".to_string()));
        assert_eq!(manager.connection_count(), 1);
        manager.disconnect(id);
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn broadcast_reaches_subscribed_receiver() {
        let manager = BroadcastManager::new();
        let (_id, mut rx) = manager.connect(None);
        manager.broadcast(crate::events::text_block("a1b2c3d4", "hello"));
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg["type"], "text_block");
        assert_eq!(msg["data"]["adw_id"], "a1b2c3d4");
    }

    #[test]
    fn broadcast_with_no_connections_does_not_panic() {
        let manager = BroadcastManager::new();
        manager.broadcast(crate::events::heartbeat(0));
    }

    #[test]
    fn no_filter_means_receive_everything() {
        let manager = BroadcastManager::new();
        let (id, _rx) = manager.connect(None);
        let envelope = crate::events::text_block("a1b2c3d4", "hi").to_wire();
        assert!(manager.should_deliver(id, &envelope));
    }

    #[test]
    fn filter_by_agent_id_excludes_non_matching_events() {
        let manager = BroadcastManager::new();
        let (id, _rx) = manager.connect(None);
        manager.set_filter(
            id,
            SubscriptionFilter { agent_ids: Some(["a1b2c3d4".to_string()].into()), ..Default::default() },
        );
        let matching = crate::events::text_block("a1b2c3d4", "hi").to_wire();
        let other = crate::events::text_block("zzzzzzzz", "hi").to_wire();
        assert!(manager.should_deliver(id, &matching));
        assert!(!manager.should_deliver(id, &other));
    }

    #[test]
    fn filter_by_event_category_excludes_non_matching_kinds() {
        let manager = BroadcastManager::new();
        let (id, _rx) = manager.connect(None);
        manager.set_filter(
            id,
            SubscriptionFilter { event_categories: Some(["thinking_block".to_string()].into()), ..Default::default() },
        );
        let thinking = crate::events::thinking_block("a1b2c3d4", "hmm").to_wire();
        let text = crate::events::text_block("a1b2c3d4", "hi").to_wire();
        assert!(manager.should_deliver(id, &thinking));
        assert!(!manager.should_deliver(id, &text));
    }

    #[test]
    fn clear_filter_reverts_to_receive_everything() {
        let manager = BroadcastManager::new();
        let (id, _rx) = manager.connect(None);
        manager.set_filter(
            id,
            SubscriptionFilter { event_categories: Some(["thinking_block".to_string()].into()), ..Default::default() },
        );
        manager.clear_filter(id);
        let text = crate::events::text_block("a1b2c3d4", "hi").to_wire();
        assert!(manager.should_deliver(id, &text));
    }
}
