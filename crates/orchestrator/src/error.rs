use common::CorrelationId;
use model::ConfigError;
use store::StoreError;
use thiserror::Error;
use transport::TransportError;

/// Errors that can occur while advancing or failing a saga.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The message has no `origin` header.
    #[error("message is missing the origin header")]
    MissingOrigin,

    /// The initiating message body is not a valid JSON document.
    #[error("cannot decode the message body: {0}")]
    BadBody(#[source] serde_json::Error),

    /// An acknowledgement arrived from a service other than the one in
    /// flight.
    #[error("ack origin '{actual}' does not match the stage in flight '{expected}'")]
    WrongOrigin { expected: String, actual: String },

    /// The origin has already acknowledged its stage; a broker replay.
    #[error("stage already acknowledged for transaction {0}")]
    AlreadyAcked(CorrelationId),

    /// An error message referenced a correlation id with no record.
    #[error("no transaction found for correlation id {0}")]
    UnknownTransaction(CorrelationId),

    /// The `error`-typed message carries no `error` header.
    #[error("error message is missing the error header")]
    MissingError,

    /// The latest stage already carries an error; a broker replay.
    #[error("latest stage already carries an error for transaction {0}")]
    AlreadyErrored(CorrelationId),

    /// The stored payload could not be re-encoded for the next hop.
    #[error("cannot encode the payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// Unknown origin service or transaction type.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Propagated from the transaction store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Propagated from the broker transport.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
