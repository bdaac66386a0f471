use std::collections::HashMap;
use std::sync::Arc;

use model::{Payload, TransactionRecord};
use store::TransactionStore;
use transport::{
    HEADER_ERROR, HEADER_ORIGIN, HandlerFuture, Message, MessageHandler, RoutingTable,
    SubscribeSettings, TYPE_ERROR, TYPE_ROLLBACK, Transport,
};

use crate::error::{Result, WorkerError};

/// A callback over the local transaction record, bound to one
/// transaction type.
pub type TransactionHandler = Arc<dyn Fn(TransactionRecord) -> HandlerFuture + Send + Sync>;

/// Transaction type to handler, for forward work and for compensation.
pub type TransactionTable = HashMap<String, TransactionHandler>;

/// Returns the default, empty transaction handler.
pub fn noop_transaction_handler() -> TransactionHandler {
    Arc::new(|_record| Box::pin(async { Ok(()) }))
}

/// Settings to configure a participant worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// This service's logical name; sent as the `origin` header on
    /// every message the worker emits.
    pub service_name: String,

    /// The orchestrator's inbound queue, where acks and errors go.
    pub transaction_queue: String,

    /// How to consume this service's own queue.
    pub subscribe: SubscribeSettings,
}

/// Receives saga messages for one service and wraps its business logic
/// with durable recording and outcome reporting.
pub struct Worker<S, T>
where
    S: TransactionStore,
    T: Transport,
{
    inner: Arc<Inner<S, T>>,
}

struct Inner<S, T> {
    settings: WorkerSettings,
    transport: T,
    store: S,
}

impl<S, T> Worker<S, T>
where
    S: TransactionStore + 'static,
    T: Transport + 'static,
{
    /// Creates a new worker.
    pub fn new(transport: T, store: S, settings: WorkerSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                transport,
                store,
            }),
        }
    }

    /// Consumes the service's queue until the subscription ends.
    ///
    /// Forward handlers are wrapped so the transaction is recorded
    /// before the handler runs and the outcome is reported after; the
    /// reserved `rollback` route dispatches into `rollback_table` by
    /// the stored record's type.
    pub async fn run(
        &self,
        transaction_table: TransactionTable,
        rollback_table: TransactionTable,
    ) -> Result<()> {
        let mut table = RoutingTable::new();

        for (kind, handler) in transaction_table {
            // Each handler is moved into its own closure, bound at
            // registration time.
            let inner = Arc::clone(&self.inner);
            table.insert(
                kind,
                Arc::new(move |message: Message| {
                    let inner = Arc::clone(&inner);
                    let handler = handler.clone();
                    Box::pin(async move {
                        Ok(inner.handle_transaction(message, handler).await?)
                    }) as transport::HandlerFuture
                }) as MessageHandler,
            );
        }

        let inner = Arc::clone(&self.inner);
        let rollback_table = Arc::new(rollback_table);
        table.insert(
            TYPE_ROLLBACK,
            Arc::new(move |message: Message| {
                let inner = Arc::clone(&inner);
                let rollback_table = Arc::clone(&rollback_table);
                Box::pin(async move { Ok(inner.handle_rollback(message, &rollback_table).await?) }) as transport::HandlerFuture
            }) as MessageHandler,
        );

        tracing::debug!(
            service = %self.inner.settings.service_name,
            queue = %self.inner.settings.subscribe.queue,
            "worker consuming"
        );
        let settings = self.inner.settings.subscribe.clone();
        Ok(self.inner.transport.subscribe(table, settings).await?)
    }

    /// Releases transport and store.
    pub async fn close(&self) -> Result<()> {
        self.inner.transport.close().await?;
        self.inner.store.close().await;
        Ok(())
    }
}

impl<S, T> Inner<S, T>
where
    S: TransactionStore,
    T: Transport,
{
    /// Records the transaction on first contact, runs the business
    /// handler, and reports the outcome to the orchestrator.
    #[tracing::instrument(
        skip(self, message, handler),
        fields(
            service = %self.settings.service_name,
            correlation_id = %message.correlation_id,
            kind = %message.message_type
        )
    )]
    async fn handle_transaction(
        &self,
        message: Message,
        handler: TransactionHandler,
    ) -> Result<()> {
        let record = self.find_or_create(&message).await?;

        if let Err(error) = handler(record.clone()).await {
            metrics::counter!("worker_handler_failures_total").increment(1);
            tracing::warn!(%error, "transaction handler failed, reporting");
            return self.publish_error(&record, &error.to_string()).await;
        }

        metrics::counter!("worker_transactions_handled_total").increment(1);
        self.publish_ack(&record).await
    }

    /// Finds the local record, creating it from the message body on
    /// first contact. The worker does not track stages; that history
    /// belongs to the orchestrator.
    async fn find_or_create(&self, message: &Message) -> Result<TransactionRecord> {
        match self.store.find(&message.correlation_id).await {
            Ok(record) => Ok(record),
            Err(e) if e.is_not_found() => {
                let payload: Payload =
                    serde_json::from_slice(&message.body).map_err(WorkerError::BadBody)?;
                let record = TransactionRecord::new(
                    message.correlation_id.clone(),
                    &message.message_type,
                    payload,
                );
                Ok(self.store.create(record).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reports a handler failure to the orchestrator, which will freeze
    /// the saga and broadcast rollbacks.
    async fn publish_error(&self, record: &TransactionRecord, error_message: &str) -> Result<()> {
        let message = Message::new(record.id.clone(), TYPE_ERROR)
            .with_header(HEADER_ORIGIN, &self.settings.service_name)
            .with_header(HEADER_ERROR, error_message);
        Ok(self
            .transport
            .publish(&self.settings.transaction_queue, message)
            .await?)
    }

    /// Acknowledges the stage, carrying the payload back so the
    /// orchestrator can dispatch the next hop.
    async fn publish_ack(&self, record: &TransactionRecord) -> Result<()> {
        let body = serde_json::to_vec(&record.payload).map_err(WorkerError::Encode)?;
        let message = Message::new(record.id.clone(), record.kind.clone())
            .with_body(body)
            .with_header(HEADER_ORIGIN, &self.settings.service_name);
        Ok(self
            .transport
            .publish(&self.settings.transaction_queue, message)
            .await?)
    }

    /// Runs the compensating handler for the rolled-back transaction,
    /// dispatched by the stored record's type.
    #[tracing::instrument(
        skip(self, message, rollback_table),
        fields(
            service = %self.settings.service_name,
            correlation_id = %message.correlation_id
        )
    )]
    async fn handle_rollback(
        &self,
        message: Message,
        rollback_table: &TransactionTable,
    ) -> Result<()> {
        let record = match self.store.find(&message.correlation_id).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                // Nothing was recorded locally, so there is nothing to
                // undo.
                tracing::warn!("rollback for unknown transaction, ignoring");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let Some(handler) = rollback_table.get(&record.kind) else {
            tracing::warn!(kind = %record.kind, "no rollback handler bound for type");
            return Ok(());
        };

        handler(record).await.map_err(WorkerError::Rollback)?;
        metrics::counter!("worker_rollbacks_total").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CorrelationId;
    use store::InMemoryStore;
    use tokio::sync::Mutex;
    use transport::InMemoryTransport;

    const TXN: &str = "82941436-9940-42c9-9f30-9f82a0861457";

    fn payload() -> Payload {
        let mut payload = Payload::new();
        payload.insert("invoiceNumber".into(), "34555678".into());
        payload.insert("filename".into(), "invoice-34555678.pdf".into());
        payload.insert(
            "amount".into(),
            serde_json::Number::from_f64(56.67).unwrap().into(),
        );
        payload
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            service_name: "billing".to_string(),
            transaction_queue: "transactions".to_string(),
            subscribe: SubscribeSettings::new("cube-billing"),
        }
    }

    fn setup() -> (
        Worker<InMemoryStore, InMemoryTransport>,
        InMemoryTransport,
        InMemoryStore,
    ) {
        let transport = InMemoryTransport::new();
        let store = InMemoryStore::new();
        let worker = Worker::new(transport.clone(), store.clone(), settings());
        (worker, transport, store)
    }

    fn forward() -> Message {
        Message::new(CorrelationId::from(TXN), "invoice.create")
            .with_body(serde_json::to_vec(&payload()).unwrap())
    }

    fn recording_handler(seen: Arc<Mutex<Vec<TransactionRecord>>>) -> TransactionHandler {
        Arc::new(move |record| {
            let seen = seen.clone();
            Box::pin(async move {
                seen.lock().await.push(record);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn first_contact_records_and_acks() {
        let (worker, transport, store) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));

        worker
            .inner
            .handle_transaction(forward(), recording_handler(seen.clone()))
            .await
            .unwrap();

        // The local record has the payload and no stage history.
        let record = store.find(&CorrelationId::from(TXN)).await.unwrap();
        assert_eq!(record.kind, "invoice.create");
        assert_eq!(record.payload, payload());
        assert!(record.stages.is_empty());

        // The handler saw that record.
        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id.as_str(), TXN);

        // One ack to the orchestrator's queue, carrying origin and
        // payload.
        let acks = transport.published_to("transactions").await;
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].message_type, "invoice.create");
        assert_eq!(acks[0].origin(), Some("billing"));
        let body: Payload = serde_json::from_slice(&acks[0].body).unwrap();
        assert_eq!(body, payload());
    }

    #[tokio::test]
    async fn redelivery_reuses_the_recorded_transaction() {
        let (worker, transport, store) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));

        worker
            .inner
            .handle_transaction(forward(), recording_handler(seen.clone()))
            .await
            .unwrap();
        worker
            .inner
            .handle_transaction(forward(), recording_handler(seen.clone()))
            .await
            .unwrap();

        assert_eq!(store.record_count().await, 1);
        assert_eq!(seen.lock().await.len(), 2);
        assert_eq!(transport.published_to("transactions").await.len(), 2);
    }

    #[tokio::test]
    async fn handler_failure_reports_an_error_instead_of_an_ack() {
        let (worker, transport, _) = setup();
        let failing: TransactionHandler = Arc::new(|_record| {
            Box::pin(async { Err("The invoice with the same number already exists".into()) })
        });

        worker
            .inner
            .handle_transaction(forward(), failing)
            .await
            .unwrap();

        let published = transport.published_to("transactions").await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].message_type, TYPE_ERROR);
        assert_eq!(published[0].origin(), Some("billing"));
        assert_eq!(
            published[0].error(),
            Some("The invoice with the same number already exists")
        );
        assert!(published[0].body.is_empty());
    }

    #[tokio::test]
    async fn undecodable_body_is_rejected_without_publishing() {
        let (worker, transport, store) = setup();

        let message =
            Message::new(CorrelationId::from(TXN), "invoice.create").with_body(b"not json".to_vec());
        let err = worker
            .inner
            .handle_transaction(message, noop_transaction_handler())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::BadBody(_)));
        assert_eq!(store.record_count().await, 0);
        assert_eq!(transport.published_count().await, 0);
    }

    #[tokio::test]
    async fn rollback_dispatches_the_compensator_for_the_stored_type() {
        let (worker, transport, store) = setup();
        store
            .create(TransactionRecord::new(
                CorrelationId::from(TXN),
                "invoice.create",
                payload(),
            ))
            .await
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let rollback_table: TransactionTable = HashMap::from([(
            "invoice.create".to_string(),
            recording_handler(seen.clone()),
        )]);

        let message = Message::new(CorrelationId::from(TXN), TYPE_ROLLBACK)
            .with_header(HEADER_ERROR, "downstream failure");
        worker
            .inner
            .handle_rollback(message, &rollback_table)
            .await
            .unwrap();

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, "invoice.create");

        // Compensation emits nothing.
        assert_eq!(transport.published_count().await, 0);
    }

    #[tokio::test]
    async fn rollback_for_an_unknown_transaction_is_benign() {
        let (worker, _, _) = setup();

        let message = Message::new(CorrelationId::from(TXN), TYPE_ROLLBACK);
        worker
            .inner
            .handle_rollback(message, &TransactionTable::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rollback_handler_failure_propagates_for_redelivery() {
        let (worker, _, store) = setup();
        store
            .create(TransactionRecord::new(
                CorrelationId::from(TXN),
                "invoice.create",
                payload(),
            ))
            .await
            .unwrap();

        let failing: TransactionHandler =
            Arc::new(|_record| Box::pin(async { Err("compensation failed".into()) }));
        let rollback_table: TransactionTable =
            HashMap::from([("invoice.create".to_string(), failing)]);

        let err = worker
            .inner
            .handle_rollback(
                Message::new(CorrelationId::from(TXN), TYPE_ROLLBACK),
                &rollback_table,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Rollback(_)));
    }

    #[tokio::test]
    async fn run_routes_forward_and_rollback_messages() {
        let (worker, transport, store) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let transaction_table: TransactionTable = HashMap::from([(
            "invoice.create".to_string(),
            recording_handler(seen.clone()),
        )]);
        let rollback_table: TransactionTable = HashMap::from([(
            "invoice.create".to_string(),
            recording_handler(seen.clone()),
        )]);

        let subscription = tokio::spawn(async move {
            worker.run(transaction_table, rollback_table).await
        });

        transport.publish("cube-billing", forward()).await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while seen.lock().await.is_empty() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("forward message not processed in time");

        transport
            .publish(
                "cube-billing",
                Message::new(CorrelationId::from(TXN), TYPE_ROLLBACK),
            )
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while seen.lock().await.len() < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("rollback not processed in time");

        assert_eq!(store.record_count().await, 1);
        transport.close().await.unwrap();
        subscription.await.unwrap().unwrap();
    }
}
