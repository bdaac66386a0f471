//! Persistence for transaction records.
//!
//! The [`TransactionStore`] trait is the contract the orchestrator and the
//! participant worker depend on; [`InMemoryStore`] backs tests and small
//! deployments, [`PostgresStore`] is the durable adapter.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::CorrelationId;
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::TransactionStore;
