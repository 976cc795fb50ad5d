//! Shared types for the event-sourcing runtime.
//!
//! - [`AggregateId`] identifies one aggregate and its event stream
//! - [`Message`] and [`MessageHeader`] carry the causal metadata shared by
//!   commands, events and the envelopes the bus synthesizes
//! - [`telemetry`] installs the tracing subscriber

pub mod message;
pub mod telemetry;
pub mod types;

pub use message::{CommandEnvelope, Message, MessageHeader, MessageId};
pub use types::{AggregateId, ParseAggregateIdError};
