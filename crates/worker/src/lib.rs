//! The participant-side worker.
//!
//! Runs inside each service taking part in a saga: it records inbound
//! transactions locally, wraps the service's business handler, reports
//! the outcome back to the orchestrator's queue, and dispatches
//! compensating handlers when a rollback arrives.

pub mod error;
pub mod worker;

pub use error::{Result, WorkerError};
pub use worker::{
    TransactionHandler, TransactionTable, Worker, WorkerSettings, noop_transaction_handler,
};
