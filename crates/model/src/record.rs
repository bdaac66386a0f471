use chrono::{DateTime, Utc};
use common::CorrelationId;
use serde::{Deserialize, Serialize};

/// The opaque payload carried by a transaction.
///
/// Set once when the saga is created and re-sent unchanged on every
/// forward hop; the core never looks inside it.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// One step of a saga, executed by one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStage {
    /// 0-based position in the record's stage history.
    pub order: usize,

    /// Logical name of the service that owns this stage.
    pub service: String,

    /// Broker queue this stage's message was dispatched to.
    pub queue: String,

    /// True once the owning service has confirmed completion.
    pub ack: bool,

    /// When the stage was recorded.
    pub date: DateTime<Utc>,

    /// Failure reported by the owning service, if any.
    pub error: Option<String>,
}

impl TransactionStage {
    /// A stage that is already acknowledged, used for the initiating hop:
    /// the origin service has done its work before the orchestrator ever
    /// hears about the saga.
    pub fn acked(service: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            order: 0,
            service: service.into(),
            queue: queue.into(),
            ack: true,
            date: Utc::now(),
            error: None,
        }
    }

    /// A stage that has been dispatched and is awaiting its ack.
    pub fn open(service: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            ack: false,
            ..Self::acked(service, queue)
        }
    }

    /// Returns true if an error was reported during this stage.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A single transaction, tracking the saga's payload and stage history.
///
/// The orchestrator owns the stage history; participant workers keep a
/// local copy of the record with an empty `stages` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Correlation id, immutable after creation.
    pub id: CorrelationId,

    /// Transaction type, e.g. `invoice.create`. Immutable.
    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque payload, set at creation and carried unchanged.
    pub payload: Payload,

    /// Ordered stage history, appended monotonically.
    pub stages: Vec<TransactionStage>,
}

impl TransactionRecord {
    /// Creates a record with no stage history.
    pub fn new(id: CorrelationId, kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            id,
            kind: kind.into(),
            payload,
            stages: Vec::new(),
        }
    }

    /// Returns the latest stage, if any.
    pub fn state(&self) -> Option<&TransactionStage> {
        self.stages.last()
    }

    /// Returns whether the latest stage belongs to `service` and is acked.
    pub fn state_completed(&self, service: &str) -> bool {
        self.state()
            .is_some_and(|stage| stage.service == service && stage.ack)
    }

    /// Appends a stage, assigning the next order number.
    pub fn add_stage(&mut self, mut stage: TransactionStage) {
        stage.order = self.state().map_or(0, |last| last.order + 1);
        self.stages.push(stage);
    }

    /// Marks the latest stage as acknowledged.
    pub fn ack_latest(&mut self) {
        if let Some(stage) = self.stages.last_mut() {
            stage.ack = true;
        }
    }

    /// Records a failure on the latest stage. The record is terminal after
    /// this; no further stages may be appended.
    pub fn set_error_latest(&mut self, message: impl Into<String>) {
        if let Some(stage) = self.stages.last_mut() {
            stage.error = Some(message.into());
        }
    }

    /// Returns whether any stage reported a failure.
    pub fn has_error(&self) -> bool {
        self.stages.iter().any(TransactionStage::has_error)
    }
}
