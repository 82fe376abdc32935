// SPDX-License-Identifier: MIT

use serde_json::Value;
use tokio::sync::broadcast;

/// Broadcasts JSON-RPC notifications (`ticket.created`, `ticket.claimed`,
/// `ticket.assigned`, `ticket.status_changed`, `ticket.response_added`) to
/// all connected WebSocket clients.
///
/// Sends never block or fail the operation that triggered them; with no
/// subscribers the notification is dropped.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn broadcast(&self, method: &str, params: Value) {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        let _ = self
            .tx
            .send(serde_json::to_string(&notification).unwrap_or_default());
    }

    /// Subscribe to all broadcast events.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}
