//! Bus wiring.

use std::sync::Arc;

use crate::{Capability, EventHandler, HandlerLocator, NeverRetry, RetryFilter};

/// Everything an [`EventBus`](crate::EventBus) needs to dispatch.
///
/// - locator: finds handlers per capability (required)
/// - retry filter: decides which handler failures reach the publisher
///   (default: [`NeverRetry`])
/// - `filter_envelope_failures`: whether failures while handling success or
///   failure notices are also run through the retry filter (default: `false`,
///   such failures are logged and dropped)
#[derive(Clone)]
pub struct BusConfig {
    locator: Arc<dyn HandlerLocator>,
    retry_filter: Arc<dyn RetryFilter>,
    filter_envelope_failures: bool,
}

impl BusConfig {
    pub fn new(locator: impl HandlerLocator + 'static) -> Self {
        Self {
            locator: Arc::new(locator),
            retry_filter: Arc::new(NeverRetry),
            filter_envelope_failures: false,
        }
    }

    /// Uses a closure as the locator.
    pub fn from_fn<F>(locator: F) -> Self
    where
        F: Fn(&Capability) -> Vec<Arc<dyn EventHandler>> + Send + Sync + 'static,
    {
        Self::new(locator)
    }

    pub fn with_retry_filter(mut self, filter: impl RetryFilter + 'static) -> Self {
        self.retry_filter = Arc::new(filter);
        self
    }

    /// Uses a closure as the retry filter.
    pub fn retry_when<F>(self, filter: F) -> Self
    where
        F: Fn(&dyn EventHandler, &(dyn std::error::Error + Send + Sync + 'static)) -> bool
            + Send
            + Sync
            + 'static,
    {
        self.with_retry_filter(filter)
    }

    pub fn filter_envelope_failures(mut self, enabled: bool) -> Self {
        self.filter_envelope_failures = enabled;
        self
    }

    pub fn locator(&self) -> &dyn HandlerLocator {
        self.locator.as_ref()
    }

    pub fn retry_filter(&self) -> &dyn RetryFilter {
        self.retry_filter.as_ref()
    }

    pub fn filters_envelope_failures(&self) -> bool {
        self.filter_envelope_failures
    }
}
