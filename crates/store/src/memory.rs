use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::CorrelationId;
use model::TransactionRecord;
use tokio::sync::RwLock;

use crate::{Result, StoreError, store::TransactionStore};

/// In-memory transaction store.
///
/// Backs tests and single-process deployments; provides the same
/// interface as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<HashMap<CorrelationId, TransactionRecord>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn find(&self, id: &CorrelationId) -> Result<TransactionRecord> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn create(&self, record: TransactionRecord) -> Result<TransactionRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id.clone()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: &CorrelationId,
        record: TransactionRecord,
    ) -> Result<TransactionRecord> {
        let mut records = self.records.write().await;
        if !records.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        records.insert(id.clone(), record.clone());
        Ok(record)
    }

    async fn close(&self) {}
}
