use crate::hub::{Hub, SEND_BUFFER};
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use gatecount_domain::{DomainError, DomainResult, Notice, NoticePublisher, Role};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Policy-violation close code sent on a bad role handshake.
const BAD_ROLE_CLOSE_CODE: u16 = 1008;

/// Role-tagged operator channel: one fan-out set per role, fed by the
/// liveness tracker and other notifiers through [`NoticePublisher`].
pub struct NoticeHub {
    hubs: HashMap<Role, Hub>,
}

impl NoticeHub {
    pub fn new() -> Self {
        Self {
            hubs: Role::ALL.iter().map(|role| (*role, Hub::new())).collect(),
        }
    }

    pub async fn publish_to(&self, role: Role, notice: &Notice) -> DomainResult<()> {
        let payload = serde_json::to_string(notice)
            .map_err(|err| DomainError::Serialization(err.to_string()))?;
        let delivered = self.hub(role).publish(&payload).await;
        debug!(role = role.tag(), delivered, "notice published");
        Ok(())
    }

    pub async fn broadcast_all(&self, notice: &Notice) -> DomainResult<()> {
        for role in Role::ALL {
            self.publish_to(role, notice).await?;
        }
        Ok(())
    }

    pub async fn connection_count(&self, role: Role) -> usize {
        self.hub(role).connection_count().await
    }

    fn hub(&self, role: Role) -> &Hub {
        &self.hubs[&role]
    }
}

impl Default for NoticeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NoticePublisher for NoticeHub {
    async fn publish(&self, role: Role, notice: &Notice) -> DomainResult<()> {
        self.publish_to(role, notice).await
    }
}

pub fn router(hub: Arc<NoticeHub>) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(hub)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<NoticeHub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Handshake: the first client message must be one of the fixed role tags;
/// anything else closes the socket before any registration happens.
async fn handle_socket(socket: WebSocket, hub: Arc<NoticeHub>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let tag = match ws_receiver.next().await {
        Some(Ok(Message::Text(tag))) => tag,
        _ => return,
    };
    let role = match Role::from_tag(tag.trim()) {
        Ok(role) => role,
        Err(err) => {
            warn!(error = %err, "notice client rejected");
            let _ = ws_sender
                .send(Message::Close(Some(CloseFrame {
                    code: BAD_ROLE_CLOSE_CODE,
                    reason: err.to_string().into(),
                })))
                .await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::channel::<Message>(SEND_BUFFER);
    let conn = hub.hub(role).register(tx).await;
    info!(role = role.tag(), conn, "operator client registered");

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

    hub.hub(role).unregister(conn).await;
    debug!(role = role.tag(), conn, "operator client unregistered");
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatecount_domain::NoticeKind;

    #[tokio::test]
    async fn notices_reach_only_the_addressed_role() {
        let hub = NoticeHub::new();
        let (sysadmin_tx, mut sysadmin_rx) = mpsc::channel(SEND_BUFFER);
        let (reception_tx, mut reception_rx) = mpsc::channel(SEND_BUFFER);
        hub.hub(Role::SysAdmin).register(sysadmin_tx).await;
        hub.hub(Role::Reception).register(reception_tx).await;

        let notice = Notice::new("MU JOIN", "Monitoring Unit gate-a JOIN", NoticeKind::Info, 15);
        hub.publish_to(Role::SysAdmin, &notice).await.expect("published");

        let delivered = sysadmin_rx.recv().await.expect("delivered");
        match delivered {
            Message::Text(text) => {
                assert!(text.contains("\"kind\":\"info\""));
                assert!(text.contains("\"timeout_ms\":15000"));
            }
            other => panic!("expected text, got {other:?}"),
        }
        assert!(reception_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_all_reaches_every_role() {
        let hub = NoticeHub::new();
        let mut receivers = Vec::new();
        for role in Role::ALL {
            let (tx, rx) = mpsc::channel(SEND_BUFFER);
            hub.hub(role).register(tx).await;
            receivers.push(rx);
        }

        let notice = Notice::new("Maintenance", "Collector restarting", NoticeKind::Warning, 5);
        hub.broadcast_all(&notice).await.expect("published");

        for mut rx in receivers {
            assert!(rx.recv().await.is_some());
        }
    }

    #[tokio::test]
    async fn publishing_to_an_idle_role_is_a_no_op() {
        let hub = NoticeHub::new();
        let notice = Notice::new("head", "msg", NoticeKind::Success, 3);
        hub.publish_to(Role::DeptAdmin, &notice).await.expect("published");
        assert_eq!(hub.connection_count(Role::DeptAdmin).await, 0);
    }
}
