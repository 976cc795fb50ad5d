use common::ParseAggregateIdError;
use thiserror::Error;

use crate::{AggregateId, ConcurrencyConflict, EventStreamVersion, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The input was rejected before touching storage.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An aggregate ID could not be parsed.
    #[error("Validation error: {0}")]
    InvalidAggregateId(#[from] ParseAggregateIdError),

    /// The stored version no longer matched the expected version at write time.
    #[error("Aggregate root {aggregate_id} was not found at version {expected}")]
    Concurrency {
        aggregate_id: AggregateId,
        expected: EventStreamVersion,
    },

    /// A concurrency monitor found uncommitted changes that overlap committed ones.
    #[error("Changes to aggregate {aggregate_id} conflict with {} committed event(s)", unseen_count(.conflicts))]
    ConflictingChanges {
        aggregate_id: AggregateId,
        conflicts: Vec<ConcurrencyConflict>,
    },

    /// A load asked for a version the stream does not contain.
    #[error("Event for version {version} could not be found for stream {aggregate_id}")]
    Range {
        aggregate_id: AggregateId,
        version: Version,
    },

    /// Events were not contiguous with the stream they were appended to.
    #[error("Out of sequence event for aggregate {aggregate_id}: expected version {expected}, got {actual}")]
    Sequence {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Whether the caller should reload, reapply and retry.
    pub fn is_concurrency(&self) -> bool {
        matches!(
            self,
            Self::Concurrency { .. } | Self::ConflictingChanges { .. }
        )
    }
}

fn unseen_count(conflicts: &[ConcurrencyConflict]) -> usize {
    conflicts.iter().map(|c| c.unseen_events().len()).sum()
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_message_names_aggregate_and_version() {
        let aggregate_id = AggregateId::new();
        let err = EventStoreError::Concurrency {
            aggregate_id,
            expected: EventStreamVersion::At(Version::new(3)),
        };

        assert_eq!(
            err.to_string(),
            format!("Aggregate root {aggregate_id} was not found at version 3")
        );
        assert!(err.is_concurrency());
    }

    #[test]
    fn range_message_names_aggregate_and_version() {
        let aggregate_id = AggregateId::new();
        let err = EventStoreError::Range {
            aggregate_id,
            version: Version::new(9),
        };

        assert_eq!(
            err.to_string(),
            format!("Event for version 9 could not be found for stream {aggregate_id}")
        );
        assert!(!err.is_concurrency());
    }
}
