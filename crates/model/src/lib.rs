//! Data model for multi-stage broker-carried transactions.
//!
//! A [`TransactionRecord`] tracks one saga: its opaque payload and the
//! ordered history of [`TransactionStage`]s it has visited. The static
//! [`TransactionConfig`] names the participating services and the stage
//! list of every transaction type.

pub mod config;
pub mod error;
pub mod record;

pub use config::{ServiceConfig, TransactionConfig, TransactionDefinition};
pub use error::ConfigError;
pub use record::{Payload, TransactionRecord, TransactionStage};
