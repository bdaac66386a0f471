use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::error::{Result, TransportError};
use crate::message::Message;
use crate::routing::RoutingTable;
use crate::transport::{SubscribeSettings, Transport};

/// In-memory transport.
///
/// Every queue is an unbounded channel, created on first use, so
/// messages published before a consumer attaches are buffered. Clones
/// share the same queues, which lets an orchestrator and its workers be
/// wired together in one process. Each publish is also recorded for
/// inspection with [`published_to`](Self::published_to).
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>,
    receivers: Mutex<HashMap<String, mpsc::UnboundedReceiver<Message>>>,
    published: Mutex<Vec<(String, Message)>>,
}

impl InMemoryTransport {
    /// Creates a new transport with no queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every message published to a queue, in publish order.
    pub async fn published_to(&self, queue: &str) -> Vec<Message> {
        self.inner
            .published
            .lock()
            .await
            .iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Returns the total number of publishes across all queues.
    pub async fn published_count(&self) -> usize {
        self.inner.published.lock().await.len()
    }

    // Lock order is senders then receivers, everywhere.
    async fn ensure_queue(&self, queue: &str) {
        let mut senders = self.inner.senders.lock().await;
        if !senders.contains_key(queue) {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(queue.to_string(), tx);
            self.inner.receivers.lock().await.insert(queue.to_string(), rx);
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, queue: &str, message: Message) -> Result<()> {
        self.inner
            .published
            .lock()
            .await
            .push((queue.to_string(), message.clone()));

        self.ensure_queue(queue).await;
        let senders = self.inner.senders.lock().await;
        if let Some(sender) = senders.get(queue) {
            // A failed send means the consumer is gone; the message is
            // dropped, as a brokerless queue has nowhere to hold it.
            let _ = sender.send(message);
        }
        Ok(())
    }

    async fn subscribe(&self, handlers: RoutingTable, settings: SubscribeSettings) -> Result<()> {
        self.ensure_queue(&settings.queue).await;
        let receiver = self.inner.receivers.lock().await.remove(&settings.queue);
        let Some(mut receiver) = receiver else {
            return Err(TransportError::Subscribe(format!(
                "queue '{}' already has a consumer",
                settings.queue
            )));
        };

        while let Some(message) = receiver.recv().await {
            handlers.dispatch(message).await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Dropping the senders ends every open subscription loop.
        self.inner.senders.lock().await.clear();
        self.inner.receivers.lock().await.clear();
        Ok(())
    }
}
