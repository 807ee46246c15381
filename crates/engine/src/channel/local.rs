// In-process edit transport: one broadcast channel per document.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use folio_common::types::EditMessage;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::EditTransport;
use crate::backend::BackendFuture;

const DEFAULT_CAPACITY: usize = 256;

/// Shared hub; clones publish to and subscribe on the same channels.
#[derive(Clone)]
pub struct LocalHub {
    capacity: usize,
    channels: Arc<Mutex<HashMap<Uuid, broadcast::Sender<EditMessage>>>>,
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LocalHub {
    /// `capacity` bounds how far a slow subscriber may lag before it starts
    /// losing messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), channels: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn subscriber_count(&self, document_id: Uuid) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&document_id)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }

    /// Documents with a live channel entry.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl EditTransport for LocalHub {
    fn subscribe(&self, document_id: Uuid) -> BackendFuture<'_, broadcast::Receiver<EditMessage>> {
        Box::pin(async move {
            let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            let sender = channels
                .entry(document_id)
                .or_insert_with(|| broadcast::channel(self.capacity).0);
            Ok(sender.subscribe())
        })
    }

    fn unsubscribe(&self, document_id: Uuid) -> BackendFuture<'_, ()> {
        // Receivers detach when the subscriber drops them; the entry goes
        // once the last one is gone.
        Box::pin(async move {
            let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            if channels.get(&document_id).is_some_and(|sender| sender.receiver_count() == 0) {
                channels.remove(&document_id);
            }
            Ok(())
        })
    }

    fn publish<'a>(&'a self, message: &'a EditMessage) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(sender) = channels.get(&message.document_id) {
                if sender.send(message.clone()).is_err() {
                    channels.remove(&message.document_id);
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped() {
        let hub = LocalHub::default();
        let doc = Uuid::new_v4();
        hub.publish(&EditMessage::new(doc, 1, "nobody")).await.unwrap();
        assert_eq!(hub.subscriber_count(doc), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let hub = LocalHub::with_capacity(2);
        let doc = Uuid::new_v4();
        let mut receiver = hub.subscribe(doc).await.unwrap();

        for n in 0..5 {
            hub.publish(&EditMessage::new(doc, 1, n.to_string())).await.unwrap();
        }

        assert!(matches!(receiver.recv().await, Err(broadcast::error::RecvError::Lagged(3))));
        assert_eq!(receiver.recv().await.unwrap().content, "3");
        assert_eq!(receiver.recv().await.unwrap().content, "4");
    }

    #[tokio::test]
    async fn hub_clones_share_channels() {
        let hub = LocalHub::default();
        let doc = Uuid::new_v4();
        let mut receiver = hub.clone().subscribe(doc).await.unwrap();
        assert_eq!(hub.subscriber_count(doc), 1);

        hub.publish(&EditMessage::new(doc, 3, "shared")).await.unwrap();
        assert_eq!(receiver.recv().await.unwrap().content, "shared");
    }

    #[tokio::test]
    async fn last_unsubscribe_removes_the_channel() {
        let hub = LocalHub::default();
        let doc = Uuid::new_v4();
        let first = hub.subscribe(doc).await.unwrap();
        let second = hub.subscribe(doc).await.unwrap();

        drop(first);
        hub.unsubscribe(doc).await.unwrap();
        assert_eq!(hub.channel_count(), 1);

        drop(second);
        hub.unsubscribe(doc).await.unwrap();
        assert_eq!(hub.channel_count(), 0);
    }
}
