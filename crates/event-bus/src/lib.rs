//! In-process event bus.
//!
//! - [`Publishable`] messages declare their type hierarchy as a [`TypeKey`] chain
//! - [`EventHandler`]s are found per [`Capability`] by a [`HandlerLocator`]
//! - [`EventBus`] dispatches over the whole hierarchy and follows up with a
//!   [`HandlingSucceeded`] or [`HandlingFailed`] notice
//! - a [`RetryFilter`] picks the handler failures that reach the publisher

pub mod bus;
pub mod capability;
pub mod config;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod hierarchy;

pub use bus::{EventBus, PublishReport};
pub use capability::Capability;
pub use config::BusConfig;
pub use envelope::{HandlingFailed, HandlingSucceeded};
pub use error::{BusError, Result};
pub use handler::{
    AlwaysRetry, BoxError, Delivery, EventHandler, HandlerLocator, HandlerRegistry, NeverRetry,
    RetryFilter,
};
pub use hierarchy::{Publishable, TypeChain, TypeKey};
