use crate::hub::{Hub, SEND_BUFFER};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use gatecount_domain::{DomainError, DomainResult, OccupancyPublisher, OccupancyUpdate};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Open occupancy channel: every subscriber gets the last-known payload on
/// connect and every subsequent broadcast.
pub struct UpdateHub {
    hub: Hub,
    last: RwLock<String>,
}

impl UpdateHub {
    pub fn new() -> Self {
        Self {
            hub: Hub::new(),
            last: RwLock::new(String::new()),
        }
    }

    pub async fn publish_update(&self, update: &OccupancyUpdate) -> DomainResult<()> {
        let payload = serde_json::to_string(update)
            .map_err(|err| DomainError::Serialization(err.to_string()))?;
        *self.last.write().await = payload.clone();
        let delivered = self.hub.publish(&payload).await;
        debug!(delivered, tot = update.tot, "occupancy update broadcast");
        Ok(())
    }

    /// Last broadcast payload; empty before the first broadcast.
    pub async fn last_payload(&self) -> String {
        self.last.read().await.clone()
    }

    pub async fn connection_count(&self) -> usize {
        self.hub.connection_count().await
    }
}

impl Default for UpdateHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OccupancyPublisher for UpdateHub {
    async fn publish(&self, update: &OccupancyUpdate) -> DomainResult<()> {
        self.publish_update(update).await
    }
}

pub fn router(hub: Arc<UpdateHub>) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(hub)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<UpdateHub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<UpdateHub>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Message>(SEND_BUFFER);
    let conn = hub.hub.register(tx.clone()).await;
    info!(conn, "occupancy client registered");

    // the newcomer starts from the last-known estimate
    let last = hub.last_payload().await;
    if !last.is_empty() {
        let _ = tx.send(Message::Text(last)).await;
    }

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(message) => {
                    if ws_sender.send(message).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = ws_receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.hub.unregister(conn).await;
    debug!(conn, "occupancy client unregistered");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(tot: i64, error: bool) -> OccupancyUpdate {
        OccupancyUpdate {
            tot,
            entered: tot,
            exited: 0,
            error,
        }
    }

    #[tokio::test]
    async fn publish_caches_and_delivers_the_payload() {
        let hub = UpdateHub::new();
        let (tx, mut rx) = mpsc::channel(SEND_BUFFER);
        hub.hub.register(tx).await;

        hub.publish_update(&update(4, false)).await.expect("published");

        match rx.recv().await.expect("delivered") {
            Message::Text(text) => {
                assert_eq!(text, r#"{"tot":4,"in":4,"out":0,"error":false}"#)
            }
            other => panic!("expected text, got {other:?}"),
        }
        assert_eq!(
            hub.last_payload().await,
            r#"{"tot":4,"in":4,"out":0,"error":false}"#
        );
    }

    #[tokio::test]
    async fn last_payload_tracks_the_newest_broadcast() {
        let hub = UpdateHub::new();
        assert!(hub.last_payload().await.is_empty());

        hub.publish_update(&update(1, false)).await.expect("published");
        hub.publish_update(&update(2, true)).await.expect("published");
        assert!(hub.last_payload().await.contains(r#""tot":2"#));
        assert!(hub.last_payload().await.contains(r#""error":true"#));
    }

    #[tokio::test]
    async fn dead_subscriber_does_not_break_the_broadcast() {
        let hub = UpdateHub::new();
        let (tx_dead, rx_dead) = mpsc::channel(SEND_BUFFER);
        let (tx_live, mut rx_live) = mpsc::channel(SEND_BUFFER);
        hub.hub.register(tx_dead).await;
        hub.hub.register(tx_live).await;
        drop(rx_dead);

        hub.publish_update(&update(7, false)).await.expect("published");
        assert!(rx_live.recv().await.is_some());
        assert_eq!(hub.connection_count().await, 1);
    }
}
