//! Domain layer for the event-sourcing runtime.
//!
//! This crate provides the core domain abstractions including:
//! - [`Aggregate`] trait for event-sourced entities
//! - [`DomainEvent`] trait for domain events
//! - [`AggregateRoot`] tracking an aggregate's committed and recorded events
//! - [`EventSourcingRepository`] for loading, saving and publishing aggregates

pub mod aggregate;
pub mod error;
pub mod repository;

pub use aggregate::{Aggregate, AggregateRoot, DomainEvent};
pub use error::{RepositoryError, Result};
pub use repository::{CommandResult, EventSourcingRepository};
