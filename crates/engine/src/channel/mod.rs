// Per-document edit channel.
//
// An `EditChannel` holds at most one document subscription on an
// `EditTransport`. Inbound messages, the client's own echoes included, are
// pumped to every registered handler; echo suppression happens once, in
// `EchoFilter`, before anything touches the editable state.

pub mod local;
pub mod ws;

use std::sync::{Arc, Mutex, PoisonError};

use folio_common::types::{EditMessage, UserId};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::BackendFuture;
use crate::error::BackendError;

pub use local::LocalHub;
pub use ws::{channel_url, WsTransport};

/// Publish/subscribe transport. Delivery is best-effort and unordered;
/// reconnection is the transport's own business.
pub trait EditTransport: Send + Sync {
    /// Receiver yields every edit published for `document_id`, including
    /// this client's own.
    fn subscribe(&self, document_id: Uuid) -> BackendFuture<'_, broadcast::Receiver<EditMessage>>;

    fn unsubscribe(&self, document_id: Uuid) -> BackendFuture<'_, ()>;

    fn publish<'a>(&'a self, message: &'a EditMessage) -> BackendFuture<'a, ()>;
}

/// Drops messages this client sent itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoFilter {
    local_id: UserId,
}

impl EchoFilter {
    pub fn new(local_id: UserId) -> Self {
        Self { local_id }
    }

    pub fn local_id(&self) -> UserId {
        self.local_id
    }

    pub fn is_echo(&self, message: &EditMessage) -> bool {
        message.sender_id == self.local_id
    }

    /// Returns the message only if it came from another client.
    pub fn admit(&self, message: EditMessage) -> Option<EditMessage> {
        if self.is_echo(&message) {
            debug!(document_id = %message.document_id, "dropping echoed edit");
            None
        } else {
            Some(message)
        }
    }
}

pub type MessageHandler = Arc<dyn Fn(EditMessage) + Send + Sync>;

struct Subscription {
    document_id: Uuid,
    pump: JoinHandle<()>,
}

pub struct EditChannel {
    transport: Arc<dyn EditTransport>,
    handlers: Arc<Mutex<Vec<MessageHandler>>>,
    subscription: Option<Subscription>,
}

impl EditChannel {
    pub fn new(transport: Arc<dyn EditTransport>) -> Self {
        Self { transport, handlers: Arc::new(Mutex::new(Vec::new())), subscription: None }
    }

    /// Register a handler for every inbound message on the current and any
    /// later subscription.
    pub fn on_message(&self, handler: impl Fn(EditMessage) + Send + Sync + 'static) {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner).push(Arc::new(handler));
    }

    pub fn document_id(&self) -> Option<Uuid> {
        self.subscription.as_ref().map(|s| s.document_id)
    }

    /// Subscribe to `document_id`. Re-connecting to the current document is a
    /// no-op; connecting to another one drops the previous subscription.
    pub async fn connect(&mut self, document_id: Uuid) -> Result<(), BackendError> {
        if self.document_id() == Some(document_id) {
            return Ok(());
        }
        self.disconnect().await;

        let receiver = self.transport.subscribe(document_id).await?;
        let pump = tokio::spawn(pump_messages(document_id, receiver, Arc::clone(&self.handlers)));
        self.subscription = Some(Subscription { document_id, pump });
        debug!(%document_id, "edit channel connected");
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        subscription.pump.abort();
        // The receiver must be dropped before the transport is told.
        let _ = subscription.pump.await;
        if let Err(error) = self.transport.unsubscribe(subscription.document_id).await {
            warn!(document_id = %subscription.document_id, error = %error, "edit channel unsubscribe failed");
        }
        debug!(document_id = %subscription.document_id, "edit channel disconnected");
    }

    /// Best-effort publish. No acknowledgement, no ordering.
    pub async fn send(&self, message: &EditMessage) -> Result<(), BackendError> {
        self.transport.publish(message).await
    }
}

impl Drop for EditChannel {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.pump.abort();
        }
    }
}

async fn pump_messages(
    document_id: Uuid,
    mut receiver: broadcast::Receiver<EditMessage>,
    handlers: Arc<Mutex<Vec<MessageHandler>>>,
) {
    loop {
        match receiver.recv().await {
            Ok(message) => {
                if message.document_id != document_id {
                    continue;
                }
                let current: Vec<MessageHandler> =
                    handlers.lock().unwrap_or_else(PoisonError::into_inner).clone();
                for handler in current {
                    handler(message.clone());
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(%document_id, skipped, "edit channel lagged, messages dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(%document_id, "edit channel transport closed");
                break;
            }
        }
    }
}
