//! PostgreSQL integration tests
//!
//! These tests run serially with a single shared PostgreSQL container.
//! The container is automatically cleaned up when the test process exits.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use common::CorrelationId;
use model::{Payload, TransactionRecord, TransactionStage};
use serial_test::serial;
use sqlx::PgPool;
use std::sync::{Arc, OnceLock};
use store::{PostgresStore, StoreError, TransactionStore};
use testcontainers::{ContainerAsync, ImageExt, core::IntoContainerPort, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Container and connection string - initialized once, lives for entire test run
struct TestContainer {
    #[allow(dead_code)] // Container must stay alive for connection to work
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global container - OnceCell ensures single async initialization
static TEST_CONTAINER: OnceCell<Arc<TestContainer>> = OnceCell::const_new();

/// Store container ID for cleanup at exit
static CONTAINER_ID: OnceLock<String> = OnceLock::new();

/// Cleanup function that runs when the test process exits
#[ctor::dtor]
fn cleanup_container() {
    if let Some(container_id) = CONTAINER_ID.get() {
        // Use docker CLI to remove the container since we can't use async here
        let _ = std::process::Command::new("docker")
            .args(["rm", "-f", container_id])
            .output();
    }
}

/// Get the shared container (async, initializes on first call)
async fn get_container() -> Arc<TestContainer> {
    TEST_CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default()
                .with_tag("17-alpine")
                .start()
                .await
                .expect("Failed to start PostgreSQL container");

            let container_id = container.id().to_string();
            let _ = CONTAINER_ID.set(container_id);

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432.tcp()).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Run migrations
            let pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_transactions_table.sql"
            ))
            .execute(&pool)
            .await
            .unwrap();
            pool.close().await;

            Arc::new(TestContainer {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with cleared tables
async fn get_test_store() -> PostgresStore {
    let container = get_container().await;
    let pool = PgPool::connect(&container.connection_string).await.unwrap();

    sqlx::query("TRUNCATE TABLE transactions")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn invoice_record(id: &str) -> TransactionRecord {
    let mut payload = Payload::new();
    payload.insert("invoiceNumber".into(), "34555678".into());
    payload.insert("filename".into(), "invoice-34555678.pdf".into());
    TransactionRecord::new(CorrelationId::from(id), "invoice.create", payload)
}

#[tokio::test]
#[serial]
async fn create_and_find_roundtrip() {
    let store = get_test_store().await;

    let mut record = invoice_record("fa621107-5b79-4e8b-9587-df064f1052b4");
    record.add_stage(TransactionStage::acked("backend", "cube-backend"));
    record.add_stage(TransactionStage::open("billing", "cube-billing"));
    store.create(record.clone()).await.unwrap();

    let found = store.find(&record.id).await.unwrap();
    assert_eq!(found.id, record.id);
    assert_eq!(found.kind, "invoice.create");
    assert_eq!(found.payload, record.payload);
    assert_eq!(found.stages.len(), 2);
    assert_eq!(found.stages[0].service, "backend");
    assert!(found.stages[0].ack);
    assert_eq!(found.stages[1].service, "billing");
    assert!(!found.stages[1].ack);
}

#[tokio::test]
#[serial]
async fn find_missing_is_not_found() {
    let store = get_test_store().await;

    let err = store
        .find(&CorrelationId::from("does-not-exist"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
#[serial]
async fn create_rejects_duplicate_id() {
    let store = get_test_store().await;

    store.create(invoice_record("tx-dup")).await.unwrap();
    let err = store.create(invoice_record("tx-dup")).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));
}

#[tokio::test]
#[serial]
async fn update_persists_stage_history() {
    let store = get_test_store().await;

    let mut record = store.create(invoice_record("tx-update")).await.unwrap();
    record.add_stage(TransactionStage::acked("backend", "cube-backend"));
    record.add_stage(TransactionStage::open("billing", "cube-billing"));

    let updated = store.update(&record.id.clone(), record).await.unwrap();
    assert_eq!(updated.stages.len(), 2);

    // Ack and error survive a second round trip.
    let mut updated = updated;
    updated.ack_latest();
    updated.set_error_latest("The invoice with the same number already exists");
    let stored = store.update(&updated.id.clone(), updated).await.unwrap();

    assert!(stored.stages[1].ack);
    assert_eq!(
        stored.stages[1].error.as_deref(),
        Some("The invoice with the same number already exists")
    );
}

#[tokio::test]
#[serial]
async fn update_missing_is_not_found() {
    let store = get_test_store().await;

    let err = store
        .update(&CorrelationId::from("tx-none"), invoice_record("tx-none"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
