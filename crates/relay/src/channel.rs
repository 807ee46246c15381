// Per-document edit broadcast hub.
//
// One WebSocket connection at `/v1/channel` may subscribe to any number of
// documents. Every edit published for a document is forwarded to all of its
// subscribers, the publishing connection included.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use folio_common::protocol::channel::{decode_frame, encode_frame, ChannelFrame};
use folio_common::types::EditMessage;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::RelayState;

pub const CHANNEL_PATH: &str = "/v1/channel";
pub const MAX_FRAME_BYTES: usize = 256 * 1024;

type ConnectionId = u64;

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, mpsc::Sender<ChannelFrame>>,
    subscribers: HashMap<Uuid, HashSet<ConnectionId>>,
}

pub struct ChannelHub {
    capacity: usize,
    next_connection: AtomicU64,
    inner: RwLock<HubInner>,
}

impl ChannelHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_connection: AtomicU64::new(1),
            inner: RwLock::new(HubInner::default()),
        }
    }

    async fn connect(&self) -> (ConnectionId, mpsc::Receiver<ChannelFrame>) {
        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.inner.write().await.connections.insert(id, sender);
        (id, receiver)
    }

    async fn disconnect(&self, connection: ConnectionId) {
        let mut inner = self.inner.write().await;
        inner.connections.remove(&connection);
        inner.subscribers.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });
    }

    async fn subscribe(&self, connection: ConnectionId, document_id: Uuid) {
        self.inner.write().await.subscribers.entry(document_id).or_default().insert(connection);
    }

    async fn unsubscribe(&self, connection: ConnectionId, document_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(members) = inner.subscribers.get_mut(&document_id) {
            members.remove(&connection);
            if members.is_empty() {
                inner.subscribers.remove(&document_id);
            }
        }
    }

    /// Number of connections subscribed to `document_id`.
    pub async fn subscriber_count(&self, document_id: Uuid) -> usize {
        self.inner.read().await.subscribers.get(&document_id).map_or(0, HashSet::len)
    }

    /// Fan `message` out to every subscriber of its document. Returns how
    /// many connections accepted it; a full outbound buffer drops the frame.
    async fn broadcast(&self, message: EditMessage) -> usize {
        let inner = self.inner.read().await;
        let Some(members) = inner.subscribers.get(&message.document_id) else {
            return 0;
        };
        let mut delivered = 0;
        for connection in members {
            let Some(sender) = inner.connections.get(connection) else {
                continue;
            };
            match sender.try_send(ChannelFrame::Edit(message.clone())) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => warn!(
                    connection,
                    document_id = %message.document_id,
                    "channel connection lagging, dropping edit"
                ),
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Apply one inbound frame. Returns the direct reply, if any.
    async fn handle_frame(
        &self,
        connection: ConnectionId,
        subscriptions: &mut HashSet<Uuid>,
        frame: ChannelFrame,
    ) -> Option<ChannelFrame> {
        match frame {
            ChannelFrame::Subscribe { document_id } => {
                self.subscribe(connection, document_id).await;
                subscriptions.insert(document_id);
                debug!(connection, %document_id, "channel subscribed");
                Some(ChannelFrame::Subscribed { document_id })
            }
            ChannelFrame::Unsubscribe { document_id } => {
                self.unsubscribe(connection, document_id).await;
                subscriptions.remove(&document_id);
                None
            }
            ChannelFrame::Edit(message) => {
                if !subscriptions.contains(&message.document_id) {
                    return Some(error_frame(
                        ErrorCode::ValidationFailed,
                        format!("not subscribed to document {}", message.document_id),
                    ));
                }
                self.broadcast(message).await;
                None
            }
            ChannelFrame::Subscribed { .. } | ChannelFrame::Error { .. } => Some(error_frame(
                ErrorCode::ValidationFailed,
                "frame type is server-to-client only",
            )),
        }
    }
}

fn error_frame(code: ErrorCode, message: impl Into<String>) -> ChannelFrame {
    ChannelFrame::Error { code: code.as_str().to_string(), message: message.into() }
}

// ── Socket handling ────────────────────────────────────────────────

pub async fn channel_upgrade(
    State(state): State<RelayState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.max_frame_size(MAX_FRAME_BYTES).on_upgrade(move |socket| handle_socket(hub, socket))
}

async fn send_frame(socket: &mut WebSocket, frame: &ChannelFrame) -> Result<(), axum::Error> {
    let encoded = match encode_frame(frame) {
        Ok(encoded) => encoded,
        Err(error) => {
            warn!(error = %error, "failed to encode channel frame");
            return Ok(());
        }
    };
    socket.send(Message::Text(encoded.into())).await
}

async fn handle_socket(hub: Arc<ChannelHub>, mut socket: WebSocket) {
    let (connection, mut outbound) = hub.connect().await;
    let mut subscriptions = HashSet::new();
    info!(connection, "channel connection opened");

    loop {
        tokio::select! {
            maybe_outbound = outbound.recv() => {
                let Some(frame) = maybe_outbound else {
                    break;
                };
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw)) => {
                        let reply = match decode_frame(raw.as_str()) {
                            Ok(frame) => hub.handle_frame(connection, &mut subscriptions, frame).await,
                            Err(error) => Some(error_frame(
                                ErrorCode::ValidationFailed,
                                format!("invalid channel frame: {error}"),
                            )),
                        };
                        if let Some(reply) = reply {
                            if send_frame(&mut socket, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        debug!(connection, error = %error, "channel socket error");
                        break;
                    }
                }
            }
        }
    }

    hub.disconnect(connection).await;
    info!(connection, subscriptions = subscriptions.len(), "channel connection closed");
}
