use common::CorrelationId;
use thiserror::Error;

/// Errors that can occur when interacting with the transaction store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for this correlation id.
    #[error("transaction not found: {0}")]
    NotFound(CorrelationId),

    /// A record with this correlation id already exists.
    #[error("transaction already exists: {0}")]
    AlreadyExists(CorrelationId),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if this error means the record does not exist,
    /// as opposed to a storage failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
