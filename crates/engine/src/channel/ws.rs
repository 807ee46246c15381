// WebSocket edit transport against the relay's `/v1/channel` hub.
//
// One socket multiplexes every subscription. A writer task drains outbound
// frames, a reader task fans inbound edits out to per-document broadcast
// senders. When the socket closes all receivers see `Closed`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use folio_common::protocol::channel::{decode_frame, encode_frame, ChannelFrame};
use folio_common::types::EditMessage;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsFrame};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::EditTransport;
use crate::backend::BackendFuture;
use crate::error::BackendError;

const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);
const RECEIVER_CAPACITY: usize = 256;

/// Path of the relay's edit channel socket.
pub const CHANNEL_PATH: &str = "/v1/channel";

/// Derive the channel socket URL from the relay's HTTP base URL.
pub fn channel_url(relay_url: &str) -> Result<Url, BackendError> {
    let mut url = Url::parse(relay_url)
        .map_err(|e| BackendError::InvalidResponse(format!("invalid relay url: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(BackendError::InvalidResponse(format!("unsupported relay scheme {other}")))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| BackendError::InvalidResponse(format!("cannot use {scheme} for {relay_url}")))?;
    url.set_path(CHANNEL_PATH);
    url.set_query(None);
    Ok(url)
}

#[derive(Default)]
struct Routes {
    senders: HashMap<Uuid, broadcast::Sender<EditMessage>>,
    pending_acks: HashMap<Uuid, Vec<oneshot::Sender<()>>>,
}

type SharedRoutes = Arc<Mutex<Routes>>;

fn lock(routes: &SharedRoutes) -> std::sync::MutexGuard<'_, Routes> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct WsTransport {
    outbound: mpsc::UnboundedSender<ChannelFrame>,
    routes: SharedRoutes,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WsTransport {
    /// Open the socket, e.g. `ws://127.0.0.1:8080/v1/channel`.
    pub async fn connect(url: &str) -> Result<Self, BackendError> {
        let (socket, _response) =
            connect_async(url).await.map_err(|e| BackendError::Network(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ChannelFrame>();
        let routes = SharedRoutes::default();

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let encoded = match encode_frame(&frame) {
                    Ok(encoded) => encoded,
                    Err(error) => {
                        warn!(error = %error, "failed to encode channel frame");
                        continue;
                    }
                };
                if sink.send(WsFrame::Text(encoded.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_routes = Arc::clone(&routes);
        let reader = tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                match next {
                    Ok(WsFrame::Text(raw)) => route_frame(&reader_routes, raw.as_str()),
                    Ok(WsFrame::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        warn!(error = %error, "edit channel socket error");
                        break;
                    }
                }
            }
            let mut routes = lock(&reader_routes);
            routes.senders.clear();
            routes.pending_acks.clear();
            debug!("edit channel socket closed");
        });

        Ok(Self { outbound, routes, reader, writer })
    }

    fn push(&self, frame: ChannelFrame) -> Result<(), BackendError> {
        self.outbound.send(frame).map_err(|_| BackendError::ChannelClosed)
    }
}

fn route_frame(routes: &SharedRoutes, raw: &str) {
    match decode_frame(raw) {
        Ok(ChannelFrame::Edit(message)) => {
            if let Some(sender) = lock(routes).senders.get(&message.document_id) {
                let _ = sender.send(message);
            }
        }
        Ok(ChannelFrame::Subscribed { document_id }) => {
            if let Some(waiters) = lock(routes).pending_acks.remove(&document_id) {
                for waiter in waiters {
                    let _ = waiter.send(());
                }
            }
        }
        Ok(ChannelFrame::Error { code, message }) => {
            warn!(code = %code, message = %message, "edit channel error frame");
        }
        Ok(other) => debug!(frame = ?other, "ignoring unexpected channel frame"),
        Err(error) => warn!(error = %error, "undecodable channel frame"),
    }
}

impl EditTransport for WsTransport {
    fn subscribe(&self, document_id: Uuid) -> BackendFuture<'_, broadcast::Receiver<EditMessage>> {
        Box::pin(async move {
            let (ack_tx, ack_rx) = oneshot::channel();
            let receiver = {
                let mut routes = lock(&self.routes);
                routes.pending_acks.entry(document_id).or_default().push(ack_tx);
                routes
                    .senders
                    .entry(document_id)
                    .or_insert_with(|| broadcast::channel(RECEIVER_CAPACITY).0)
                    .subscribe()
            };
            self.push(ChannelFrame::Subscribe { document_id })?;

            match tokio::time::timeout(SUBSCRIBE_TIMEOUT, ack_rx).await {
                Ok(Ok(())) => Ok(receiver),
                Ok(Err(_)) => Err(BackendError::ChannelClosed),
                Err(_) => Err(BackendError::Network(format!(
                    "subscribe to {document_id} was not acknowledged"
                ))),
            }
        })
    }

    fn unsubscribe(&self, document_id: Uuid) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            lock(&self.routes).senders.remove(&document_id);
            self.push(ChannelFrame::Unsubscribe { document_id })
        })
    }

    fn publish<'a>(&'a self, message: &'a EditMessage) -> BackendFuture<'a, ()> {
        Box::pin(async move { self.push(ChannelFrame::Edit(message.clone())) })
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
