use async_trait::async_trait;
use common::CorrelationId;
use model::TransactionRecord;

use crate::Result;

/// Contract that has to be implemented to allow persistence of
/// transaction records.
///
/// Records are keyed by correlation id. `find` distinguishes a missing
/// record ([`StoreError::NotFound`](crate::StoreError::NotFound)) from
/// storage failures so callers can branch on first contact with a saga.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Finds a record by correlation id.
    async fn find(&self, id: &CorrelationId) -> Result<TransactionRecord>;

    /// Persists a new record. Fails if the id is already taken.
    async fn create(&self, record: TransactionRecord) -> Result<TransactionRecord>;

    /// Replaces the record stored under `id`, returning the stored state.
    async fn update(
        &self,
        id: &CorrelationId,
        record: TransactionRecord,
    ) -> Result<TransactionRecord>;

    /// Releases the underlying connection.
    async fn close(&self);
}
