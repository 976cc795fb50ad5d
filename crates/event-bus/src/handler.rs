//! Handler, locator and retry filter contracts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Capability, HandlingFailed, HandlingSucceeded, Publishable};

/// Failure raised by a handler.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler receives for the capability it was located for.
#[derive(Debug, Clone, Copy)]
pub enum Delivery<'a> {
    Event(&'a dyn Publishable),
    Succeeded(&'a HandlingSucceeded),
    Failed(&'a HandlingFailed),
}

impl<'a> Delivery<'a> {
    /// The originally published message, unwrapped from any notice.
    pub fn event(&self) -> &'a dyn Publishable {
        match *self {
            Self::Event(event) => event,
            Self::Succeeded(notice) => notice.event(),
            Self::Failed(notice) => notice.event(),
        }
    }
}

/// Processes messages for the capabilities it is registered under.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the name of this handler, used in logs and failure notices.
    fn name(&self) -> &'static str;

    /// Handles one delivery.
    ///
    /// `capability` is the level of the message hierarchy this call was
    /// located for; a handler registered under several levels is called
    /// once per level.
    async fn handle(&self, capability: &Capability, delivery: Delivery<'_>) -> Result<(), BoxError>;
}

/// Finds the handlers for a capability, in invocation order.
pub trait HandlerLocator: Send + Sync {
    fn locate(&self, capability: &Capability) -> Vec<Arc<dyn EventHandler>>;
}

impl<F> HandlerLocator for F
where
    F: Fn(&Capability) -> Vec<Arc<dyn EventHandler>> + Send + Sync,
{
    fn locate(&self, capability: &Capability) -> Vec<Arc<dyn EventHandler>> {
        self(capability)
    }
}

/// Locator backed by explicit registrations.
///
/// Handlers come back in registration order.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Capability, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: Capability, handler: Arc<dyn EventHandler>) -> &mut Self {
        self.handlers.entry(capability).or_default().push(handler);
        self
    }

    /// Builder-style [`HandlerRegistry::register`].
    pub fn with(mut self, capability: Capability, handler: Arc<dyn EventHandler>) -> Self {
        self.register(capability, handler);
        self
    }

    /// Returns the number of registrations across all capabilities.
    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }
}

impl HandlerLocator for HandlerRegistry {
    fn locate(&self, capability: &Capability) -> Vec<Arc<dyn EventHandler>> {
        self.handlers.get(capability).cloned().unwrap_or_default()
    }
}

/// Decides whether a handler failure should reach the publisher so the
/// whole publish can be retried.
pub trait RetryFilter: Send + Sync {
    fn is_retryable(
        &self,
        handler: &dyn EventHandler,
        failure: &(dyn std::error::Error + Send + Sync + 'static),
    ) -> bool;
}

impl<F> RetryFilter for F
where
    F: Fn(&dyn EventHandler, &(dyn std::error::Error + Send + Sync + 'static)) -> bool + Send + Sync,
{
    fn is_retryable(
        &self,
        handler: &dyn EventHandler,
        failure: &(dyn std::error::Error + Send + Sync + 'static),
    ) -> bool {
        self(handler, failure)
    }
}

/// Every failure is final and gets a failure notice.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryFilter for NeverRetry {
    fn is_retryable(
        &self,
        _handler: &dyn EventHandler,
        _failure: &(dyn std::error::Error + Send + Sync + 'static),
    ) -> bool {
        false
    }
}

/// Every failure propagates to the publisher.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl RetryFilter for AlwaysRetry {
    fn is_retryable(
        &self,
        _handler: &dyn EventHandler,
        _failure: &(dyn std::error::Error + Send + Sync + 'static),
    ) -> bool {
        true
    }
}
