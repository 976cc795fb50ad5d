//! Event bus error types.

use thiserror::Error;

use crate::{BoxError, Capability};

/// Errors that escape a publish.
///
/// Non-retryable handler failures never show up here; they become
/// failure notices instead.
#[derive(Debug, Error)]
pub enum BusError {
    /// A handler failed and the retry filter asked for the failure to
    /// reach the publisher.
    #[error("Handler {handler} failed on {capability} with a retryable error: {source}")]
    Retryable {
        handler: String,
        capability: Capability,
        source: BoxError,
    },
}

impl BusError {
    /// Returns the name of the handler that raised the failure.
    pub fn handler(&self) -> &str {
        match self {
            Self::Retryable { handler, .. } => handler,
        }
    }
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
