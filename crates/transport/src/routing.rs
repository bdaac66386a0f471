use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::message::{Message, NO_HANDLER};

/// Error returned by a message handler; the dispatcher logs it and
/// moves on to the next delivery.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by a message handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = std::result::Result<(), HandlerError>> + Send>>;

/// A callback bound to one message type.
pub type MessageHandler = Arc<dyn Fn(Message) -> HandlerFuture + Send + Sync>;

/// Returns the default, empty handler.
pub fn noop_handler() -> MessageHandler {
    Arc::new(|_message| Box::pin(async { Ok(()) }))
}

/// Routes inbound deliveries by message type.
///
/// Every table carries a [`NO_HANDLER`] fallback entry, a no-op unless
/// replaced, so a delivery with an unbound type is dropped rather than
/// failing the subscription.
#[derive(Clone)]
pub struct RoutingTable {
    handlers: HashMap<String, MessageHandler>,
}

impl RoutingTable {
    /// Creates a table with only the fallback entry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::from([(NO_HANDLER.to_string(), noop_handler())]),
        }
    }

    /// Binds a handler to a message type, replacing any previous binding.
    pub fn insert(&mut self, message_type: impl Into<String>, handler: MessageHandler) {
        self.handlers.insert(message_type.into(), handler);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_handler(
        mut self,
        message_type: impl Into<String>,
        handler: MessageHandler,
    ) -> Self {
        self.insert(message_type, handler);
        self
    }

    /// Returns whether a type has its own binding (not the fallback).
    pub fn contains(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    /// Resolves the handler for a type, falling back to [`NO_HANDLER`].
    pub fn resolve(&self, message_type: &str) -> MessageHandler {
        self.handlers
            .get(message_type)
            .or_else(|| self.handlers.get(NO_HANDLER))
            .cloned()
            .unwrap_or_else(noop_handler)
    }

    /// Dispatches one delivery. Handler errors are logged, never raised:
    /// the broker's delivery semantics decide whether the message comes
    /// back.
    pub async fn dispatch(&self, message: Message) {
        let handler = self.resolve(&message.message_type);
        let correlation_id = message.correlation_id.clone();
        let message_type = message.message_type.clone();
        if let Err(error) = handler(message).await {
            tracing::warn!(
                %correlation_id,
                %message_type,
                %error,
                "message handler failed"
            );
        }
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}
