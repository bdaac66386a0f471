use async_trait::async_trait;
use common::CorrelationId;
use model::TransactionRecord;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{Result, StoreError, store::TransactionStore};

/// PostgreSQL-backed transaction store.
///
/// Each record is one row; the payload and stage history are JSONB
/// documents whose field names match the wire representation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL transaction store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<TransactionRecord> {
        let id: String = row.try_get("id")?;
        let kind: String = row.try_get("type")?;
        let payload: serde_json::Value = row.try_get("payload")?;
        let stages: serde_json::Value = row.try_get("stages")?;

        Ok(TransactionRecord {
            id: CorrelationId::from(id),
            kind,
            payload: serde_json::from_value(payload)?,
            stages: serde_json::from_value(stages)?,
        })
    }
}

#[async_trait]
impl TransactionStore for PostgresStore {
    async fn find(&self, id: &CorrelationId) -> Result<TransactionRecord> {
        let row = sqlx::query(
            r#"
            SELECT id, type, payload, stages
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_record(row),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn create(&self, record: TransactionRecord) -> Result<TransactionRecord> {
        let payload = serde_json::to_value(&record.payload)?;
        let stages = serde_json::to_value(&record.stages)?;

        sqlx::query(
            r#"
            INSERT INTO transactions (id, type, payload, stages)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.id.as_str())
        .bind(&record.kind)
        .bind(payload)
        .bind(stages)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::AlreadyExists(record.id.clone());
            }
            StoreError::Database(e)
        })?;

        Ok(record)
    }

    async fn update(
        &self,
        id: &CorrelationId,
        record: TransactionRecord,
    ) -> Result<TransactionRecord> {
        let payload = serde_json::to_value(&record.payload)?;
        let stages = serde_json::to_value(&record.stages)?;

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET payload = $2, stages = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(payload)
        .bind(stages)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }

        self.find(id).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
