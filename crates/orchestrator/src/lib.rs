//! The saga orchestrator.
//!
//! Owns the transaction topology and drives every saga forward stage by
//! stage: it records the initiating hop, applies acknowledgements,
//! dispatches the next service in the chain, and on a participant
//! failure broadcasts compensating rollback messages to every stage
//! that already ran. Progress is persisted after each step so a crash
//! loses nothing.

pub mod error;
pub mod orchestrator;

pub use error::{OrchestratorError, Result};
pub use orchestrator::{Orchestrator, TransactionHooks};
