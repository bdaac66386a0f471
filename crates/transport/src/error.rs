use thiserror::Error;

/// Errors that can occur when interacting with the broker.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish or maintain the broker connection.
    #[error("cannot connect to the broker: {0}")]
    Connection(String),

    /// Could not publish a message to the queue.
    #[error("cannot publish a message to the queue: {0}")]
    Publish(String),

    /// Could not register a consumer on the queue.
    #[error("cannot subscribe to the queue: {0}")]
    Subscribe(String),

    /// The transport has been closed.
    #[error("transport is closed")]
    Closed,
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
