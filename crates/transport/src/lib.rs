//! Broker transport for saga messages.
//!
//! The [`Transport`] trait is the contract both the orchestrator and the
//! participant worker consume: publish one [`Message`] to a named queue,
//! or subscribe to a queue with a type-keyed [`RoutingTable`].
//! [`NatsTransport`] carries messages over NATS; [`InMemoryTransport`]
//! wires components together in-process for tests.

pub mod error;
pub mod memory;
pub mod message;
pub mod nats;
pub mod routing;
pub mod transport;

pub use error::{Result, TransportError};
pub use memory::InMemoryTransport;
pub use message::{HEADER_ERROR, HEADER_ORIGIN, Message, NO_HANDLER, TYPE_ERROR, TYPE_ROLLBACK};
pub use nats::{NatsConfig, NatsTransport};
pub use routing::{HandlerError, HandlerFuture, MessageHandler, RoutingTable, noop_handler};
pub use transport::{SubscribeSettings, Transport};
