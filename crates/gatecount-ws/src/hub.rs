use axum::extract::ws::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// Outbound buffer per registered connection.
pub const SEND_BUFFER: usize = 64;

/// Generic fan-out registry: register a connection's sender, push payloads
/// to every registered connection, drop on failure. Shared by all three
/// channel instances.
pub struct Hub {
    connections: RwLock<HashMap<u64, mpsc::Sender<Message>>>,
    next_id: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Adds a connection; the returned id unregisters it.
    pub async fn register(&self, sender: mpsc::Sender<Message>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.connections.write().await.insert(id, sender);
        id
    }

    pub async fn unregister(&self, id: u64) {
        self.connections.write().await.remove(&id);
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Best-effort fan-out of `text` to every registered connection.
    /// Sends happen against a snapshot, so registration changes mid-publish
    /// never block or race; a failed send removes that connection only.
    /// Returns the delivered count; with no registrations it is a no-op.
    pub async fn publish(&self, text: &str) -> usize {
        let snapshot: Vec<(u64, mpsc::Sender<Message>)> = {
            self.connections
                .read()
                .await
                .iter()
                .map(|(id, sender)| (*id, sender.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, sender) in snapshot {
            if sender.send(Message::Text(text.to_string())).await.is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut connections = self.connections.write().await;
            for id in dead {
                connections.remove(&id);
                debug!(conn = id, "dropped dead connection during publish");
            }
        }
        delivered
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
