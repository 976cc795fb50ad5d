//! Event store for the event-sourcing runtime.
//!
//! - [`EventEnvelope`] is the persisted form of an event, with its version
//!   and causal metadata
//! - [`EventStream`] is the ordered, contiguous log of one aggregate
//! - [`ConcurrencyMonitor`] decides whether unseen committed events block a save
//! - [`EventStore`] is the save/load contract, implemented by
//!   [`InMemoryEventStore`] and [`PostgresEventStore`]

pub mod chain;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod stream;

pub use chain::EventChain;
pub use common::{AggregateId, CommandEnvelope, Message, MessageHeader, MessageId};
pub use concurrency::{
    ConcurrencyConflict, ConcurrencyMonitor, PermissiveConcurrencyMonitor, StrictConcurrencyMonitor,
};
pub use config::PostgresConfig;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventStreamVersion, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{EventStore, EventStoreExt};
pub use stream::EventStream;
