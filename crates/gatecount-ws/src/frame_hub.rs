use crate::frame_codec::decode_frame;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use gatecount_domain::FrameStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Close code sent back on a wrong shared token, kept from the device
/// protocol.
const BAD_TOKEN_CLOSE_CODE: u16 = 404;
/// Close code for undecodable frame messages.
const MALFORMED_CLOSE_CODE: u16 = 1003;

#[derive(Debug, Clone)]
pub struct FrameIngestConfig {
    /// Shared token a streamer must present in its first message.
    pub token: String,
    /// A textual ack goes back every this many frames, as pacing.
    pub ack_every: u32,
}

/// Frame-ingest endpoint: devices authenticate with the shared token, then
/// stream `(device_id, frame)` messages that land in the [`FrameStore`].
pub struct FrameHub {
    frames: Arc<FrameStore>,
    config: FrameIngestConfig,
}

impl FrameHub {
    pub fn new(frames: Arc<FrameStore>, config: FrameIngestConfig) -> Self {
        let config = FrameIngestConfig {
            ack_every: config.ack_every.max(1),
            ..config
        };
        Self { frames, config }
    }
}

pub fn router(hub: Arc<FrameHub>) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(hub)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<FrameHub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<FrameHub>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // handshake: the very first message must be the shared token
    let token = match ws_receiver.next().await {
        Some(Ok(Message::Text(token))) => token,
        _ => return,
    };
    if token != hub.config.token {
        warn!("frame streamer rejected: wrong token");
        let _ = ws_sender
            .send(Message::Close(Some(CloseFrame {
                code: BAD_TOKEN_CLOSE_CODE,
                reason: "unknown token".into(),
            })))
            .await;
        return;
    }
    info!("frame streamer connected");

    // rolling ack counter, owned by this connection
    let mut since_ack: u32 = 0;
    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(Message::Binary(data)) => {
                let (device_id, frame) = match decode_frame(Bytes::from(data)) {
                    Ok(decoded) => decoded,
                    Err(err) => {
                        warn!(error = %err, "malformed frame message, closing stream");
                        let _ = ws_sender
                            .send(Message::Close(Some(CloseFrame {
                                code: MALFORMED_CLOSE_CODE,
                                reason: err.to_string().into(),
                            })))
                            .await;
                        return;
                    }
                };
                hub.frames.put(&device_id, frame).await;

                since_ack = (since_ack + 1) % hub.config.ack_every;
                if since_ack == 0
                    && ws_sender.send(Message::Text("OK".to_string())).await.is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    debug!("frame streamer disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gatecount_domain::{Frame, ManualClock};

    #[test]
    fn ack_interval_never_drops_to_zero() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap(),
        ));
        let hub = FrameHub::new(
            Arc::new(FrameStore::new(clock)),
            FrameIngestConfig {
                token: "secret".to_string(),
                ack_every: 0,
            },
        );
        assert_eq!(hub.config.ack_every, 1);
    }

    #[tokio::test]
    async fn decoded_frames_land_in_the_store() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap(),
        ));
        let frames = Arc::new(FrameStore::new(clock));
        let hub = FrameHub::new(
            frames.clone(),
            FrameIngestConfig {
                token: "secret".to_string(),
                ack_every: 100,
            },
        );

        let frame = Frame::new(2, 1, Bytes::from(vec![1, 2])).expect("frame");
        let encoded = crate::frame_codec::encode_frame("gate-a", &frame).expect("encoded");
        let (device_id, decoded) = decode_frame(encoded).expect("decoded");
        hub.frames.put(&device_id, decoded).await;

        assert_eq!(frames.get("gate-a").await, Some(frame));
    }
}
