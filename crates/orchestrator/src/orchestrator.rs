use std::collections::HashMap;
use std::sync::Arc;

use model::{Payload, TransactionConfig, TransactionRecord, TransactionStage};
use store::TransactionStore;
use transport::{
    HEADER_ERROR, Message, MessageHandler, RoutingTable, SubscribeSettings, TYPE_ERROR,
    TYPE_ROLLBACK, Transport,
};

use crate::error::{OrchestratorError, Result};

/// Per-type hooks invoked after the orchestrator has advanced a saga.
///
/// A hook is informational: by the time it runs the advance is already
/// persisted and the next stage dispatched, so a hook failure is logged
/// by the transport dispatcher but cannot undo anything.
pub type TransactionHooks = HashMap<String, MessageHandler>;

/// Decides where each transaction message should go next.
///
/// Consumes the transaction queue, keeps the per-saga stage history in
/// the store, and publishes either the next forward hop or the rollback
/// broadcast.
pub struct Orchestrator<S, T>
where
    S: TransactionStore,
    T: Transport,
{
    inner: Arc<Inner<S, T>>,
}

struct Inner<S, T> {
    config: TransactionConfig,
    transport: T,
    store: S,
}

impl<S, T> Orchestrator<S, T>
where
    S: TransactionStore + 'static,
    T: Transport + 'static,
{
    /// Creates a new orchestrator, validating the configured topology.
    pub fn new(config: TransactionConfig, transport: T, store: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                transport,
                store,
            }),
        })
    }

    /// Consumes the transaction queue until the subscription ends.
    ///
    /// Each hook entry is wrapped so the saga is advanced and persisted
    /// first; the reserved `error` route is installed on top of the
    /// caller's hooks.
    pub async fn run(&self, hooks: TransactionHooks, settings: SubscribeSettings) -> Result<()> {
        let mut table = RoutingTable::new();

        for (kind, hook) in hooks {
            // The hook is moved into its own closure here, bound at
            // registration time.
            let inner = Arc::clone(&self.inner);
            table.insert(
                kind,
                Arc::new(move |message: Message| {
                    let inner = Arc::clone(&inner);
                    let hook = hook.clone();
                    Box::pin(async move {
                        inner.advance(&message).await?;
                        hook(message).await
                    }) as transport::HandlerFuture
                }) as MessageHandler,
            );
        }

        let inner = Arc::clone(&self.inner);
        table.insert(
            TYPE_ERROR,
            Arc::new(move |message: Message| {
                let inner = Arc::clone(&inner);
                Box::pin(async move { Ok(inner.fail(&message).await?) }) as transport::HandlerFuture
            }) as MessageHandler,
        );

        tracing::debug!(queue = %settings.queue, "orchestrator consuming");
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
    /// Forward path: record the initiating hop or apply an ack, then
    /// dispatch the next stage in the chain.
    #[tracing::instrument(
        skip(self, message),
        fields(correlation_id = %message.correlation_id, kind = %message.message_type)
    )]
    async fn advance(&self, message: &Message) -> Result<()> {
        let origin = message.origin().ok_or(OrchestratorError::MissingOrigin)?;
        self.config.find_service(origin)?;

        let record = match self.store.find(&message.correlation_id).await {
            Ok(record) => self.apply_ack(record, origin).await?,
            Err(e) if e.is_not_found() => self.start(message, origin).await?,
            Err(e) => return Err(e.into()),
        };

        // Both paths leave the latest stage acknowledged.
        debug_assert!(record.state().is_some_and(|stage| stage.ack));

        self.dispatch_next(record).await
    }

    /// Records the initiating hop. The origin service has already done
    /// its local work, so its stage is born acknowledged.
    async fn start(&self, message: &Message, origin: &str) -> Result<TransactionRecord> {
        let service = self.config.find_service(origin)?;
        let payload: Payload =
            serde_json::from_slice(&message.body).map_err(OrchestratorError::BadBody)?;

        let mut record = TransactionRecord::new(
            message.correlation_id.clone(),
            &message.message_type,
            payload,
        );
        record.add_stage(TransactionStage::acked(&service.name, &service.queue));
        let record = self.store.create(record).await?;

        metrics::counter!("saga_transactions_started_total").increment(1);
        tracing::info!(service = %origin, "transaction started");
        Ok(record)
    }

    /// Applies an acknowledgement from the stage in flight.
    ///
    /// A service that already acknowledged a stage of this saga can only
    /// be replaying; the record is left untouched.
    async fn apply_ack(&self, mut record: TransactionRecord, origin: &str) -> Result<TransactionRecord> {
        if record
            .stages
            .iter()
            .any(|stage| stage.service == origin && stage.ack)
        {
            return Err(OrchestratorError::AlreadyAcked(record.id.clone()));
        }

        let expected = record
            .state()
            .map(|stage| stage.service.clone())
            .unwrap_or_default();
        if expected != origin {
            return Err(OrchestratorError::WrongOrigin {
                expected,
                actual: origin.to_string(),
            });
        }

        record.ack_latest();
        let id = record.id.clone();
        Ok(self.store.update(&id, record).await?)
    }

    /// Opens the next stage and hands the payload to its service, or
    /// finishes the saga when the chain is exhausted.
    async fn dispatch_next(&self, mut record: TransactionRecord) -> Result<()> {
        let chain = self.config.chain(&record.kind)?;
        let current = record.state().map_or(0, |stage| stage.order);
        let Some(next) = chain.get(current + 1).copied().cloned() else {
            metrics::counter!("saga_transactions_completed_total").increment(1);
            tracing::info!(id = %record.id, kind = %record.kind, "transaction completed");
            return Ok(());
        };

        record.add_stage(TransactionStage::open(&next.name, &next.queue));
        let id = record.id.clone();
        let record = self.store.update(&id, record).await?;

        let body = serde_json::to_vec(&record.payload).map_err(OrchestratorError::Encode)?;
        // No origin header on the outbound hop; the next service's
        // worker sets it when it reports back.
        let message = Message::new(record.id.clone(), record.kind.clone()).with_body(body);
        self.transport.publish(&next.queue, message).await?;

        metrics::counter!("saga_stages_advanced_total").increment(1);
        tracing::debug!(id = %record.id, service = %next.name, queue = %next.queue, "stage dispatched");
        Ok(())
    }

    /// Error path: freeze the failing stage and broadcast rollbacks to
    /// every stage that already ran.
    #[tracing::instrument(
        skip(self, message),
        fields(correlation_id = %message.correlation_id)
    )]
    async fn fail(&self, message: &Message) -> Result<()> {
        let origin = message.origin().ok_or(OrchestratorError::MissingOrigin)?;
        self.config.find_service(origin)?;

        let mut record = match self.store.find(&message.correlation_id).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                return Err(OrchestratorError::UnknownTransaction(
                    message.correlation_id.clone(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if record.state().is_some_and(TransactionStage::has_error) {
            return Err(OrchestratorError::AlreadyErrored(record.id.clone()));
        }
        let error = message
            .error()
            .ok_or(OrchestratorError::MissingError)?
            .to_string();

        // The failing service did respond; its stage is acknowledged
        // and frozen with the error.
        record.ack_latest();
        record.set_error_latest(&error);
        let id = record.id.clone();
        let record = self.store.update(&id, record).await?;

        metrics::counter!("saga_transactions_failed_total").increment(1);
        tracing::warn!(id = %record.id, kind = %record.kind, origin, %error, "transaction failed, rolling back");

        // Compensate the earlier stages, oldest first. The failing
        // stage reported the error and is not notified.
        let Some(last) = record.stages.len().checked_sub(1) else {
            return Ok(());
        };
        for stage in &record.stages[..last] {
            let rollback = Message::new(record.id.clone(), TYPE_ROLLBACK)
                .with_header(HEADER_ERROR, &error);
            self.transport.publish(&stage.queue, rollback).await?;
            metrics::counter!("saga_rollbacks_published_total").increment(1);
        }
        Ok(())
    }
}
