//! Repository error types.

use event_bus::BusError;
use event_store::EventStoreError;
use thiserror::Error;

/// Errors that can occur while loading, changing or saving an aggregate.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    Store(#[from] EventStoreError),

    /// Publishing committed events failed. The events stay committed.
    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    /// A stored payload could not be turned back into a domain event.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The aggregate refused a command.
    #[error("Command rejected: {0}")]
    Rejected(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RepositoryError {
    /// Returns true if reloading and retrying the change may succeed.
    pub fn is_concurrency(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_concurrency())
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::AggregateId;
    use event_store::EventStreamVersion;

    #[test]
    fn store_concurrency_is_detected_through_wrapper() {
        let err = RepositoryError::from(EventStoreError::Concurrency {
            aggregate_id: AggregateId::new(),
            expected: EventStreamVersion::NoStream,
        });
        assert!(err.is_concurrency());

        let err = RepositoryError::from(EventStoreError::Validation("bad".to_string()));
        assert!(!err.is_concurrency());
    }

    #[test]
    fn rejected_command_keeps_its_reason() {
        let err = RepositoryError::Rejected("insufficient funds".into());
        assert_eq!(err.to_string(), "Command rejected: insufficient funds");
    }
}
