use store::StoreError;
use thiserror::Error;
use transport::{HandlerError, TransportError};

/// Errors that can occur inside the participant worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The first forward message's body is not a valid JSON document.
    #[error("cannot decode the message body: {0}")]
    BadBody(#[source] serde_json::Error),

    /// The stored payload could not be re-encoded for the ack.
    #[error("cannot encode the payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// A compensating handler failed; the delivery is surfaced to the
    /// transport for redelivery.
    #[error("rollback handler failed: {0}")]
    Rollback(#[source] HandlerError),

    /// Propagated from the transaction store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Propagated from the broker transport.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;
