use async_trait::async_trait;

use crate::Result;
use crate::message::Message;
use crate::routing::RoutingTable;

/// Settings for consuming from a queue.
///
/// Consumption is auto-ack: a delivery is considered handled once the
/// handler returns, whatever the outcome. Setting a queue group shares
/// the queue between consumers while keeping each delivery on exactly
/// one of them.
#[derive(Debug, Clone)]
pub struct SubscribeSettings {
    /// Queue to consume from.
    pub queue: String,

    /// Optional consumer group name.
    pub queue_group: Option<String>,
}

impl SubscribeSettings {
    /// Returns default settings for a queue, suitable for most cases.
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            queue_group: None,
        }
    }

    /// Joins a consumer group.
    pub fn with_queue_group(mut self, group: impl Into<String>) -> Self {
        self.queue_group = Some(group.into());
        self
    }
}

/// Carries saga messages between the orchestrator and participants.
///
/// The core depends only on this contract; NATS and the in-memory test
/// transport implement it. All implementations must be thread-safe
/// (Send + Sync), and must serialise publishes if the underlying
/// channel does not permit concurrent use.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one message to a named queue.
    async fn publish(&self, queue: &str, message: Message) -> Result<()>;

    /// Consumes from `settings.queue`, dispatching each delivery through
    /// the routing table. Returns when the subscription closes.
    async fn subscribe(&self, handlers: RoutingTable, settings: SubscribeSettings) -> Result<()>;

    /// Releases the broker connection, ending open subscriptions.
    async fn close(&self) -> Result<()>;
}
