use std::collections::HashMap;

use common::CorrelationId;

/// Reserved header key naming the service that produced a message.
pub const HEADER_ORIGIN: &str = "origin";

/// Reserved header key carrying a participant's failure message.
pub const HEADER_ERROR: &str = "error";

/// Reserved message type asking a participant to undo its stage.
pub const TYPE_ROLLBACK: &str = "rollback";

/// Reserved message type reporting a participant failure.
pub const TYPE_ERROR: &str = "error";

/// Sentinel routing key used when a received type has no binding.
pub const NO_HANDLER: &str = "no_handler";

/// One message on the wire.
///
/// The body is raw bytes, JSON when non-empty; headers are flat string
/// pairs. The reserved header keys are [`HEADER_ORIGIN`] and
/// [`HEADER_ERROR`].
#[derive(Debug, Clone)]
pub struct Message {
    /// Correlation id tying this message to its saga.
    pub correlation_id: CorrelationId,

    /// Dispatch key, either a transaction type or a reserved type.
    pub message_type: String,

    /// Raw payload bytes. Empty on ack/error/rollback hops.
    pub body: Vec<u8>,

    /// Flat string headers.
    pub headers: HashMap<String, String>,
}

impl Message {
    /// Creates a message with an empty body and no headers.
    pub fn new(correlation_id: CorrelationId, message_type: impl Into<String>) -> Self {
        Self {
            correlation_id,
            message_type: message_type.into(),
            body: Vec::new(),
            headers: HashMap::new(),
        }
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Looks up a header by key.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Returns the `origin` header, the emitting service's name.
    pub fn origin(&self) -> Option<&str> {
        self.header(HEADER_ORIGIN)
    }

    /// Returns the `error` header, a participant's failure message.
    pub fn error(&self) -> Option<&str> {
        self.header(HEADER_ERROR)
    }
}
