use async_trait::async_trait;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, EventStream, EventStreamVersion, Result, Version,
};

/// Core trait for event store implementations.
///
/// An event store is responsible for persisting and retrieving events.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to an aggregate's stream.
    ///
    /// Events are appended atomically - either all succeed or none do.
    /// `expected_version` is `NoStream` for the first write of an aggregate
    /// and the version the caller loaded otherwise; any mismatch with the
    /// stored version fails with `Concurrency`.
    ///
    /// Returns the new version of the aggregate after appending.
    async fn save(
        &self,
        aggregate_id: AggregateId,
        expected_version: EventStreamVersion,
        events: Vec<EventEnvelope>,
    ) -> Result<Version>;

    /// Loads an aggregate's events up to and including `version`.
    ///
    /// Returns an empty stream if the aggregate has no events. Fails with
    /// `Range` if a concrete version is requested that no event carries.
    async fn load(&self, aggregate_id: AggregateId, version: EventStreamVersion)
    -> Result<EventStream>;

    /// Gets the current committed version of an aggregate.
    ///
    /// Returns `NoStream` if the aggregate has no events.
    async fn version(&self, aggregate_id: AggregateId) -> Result<EventStreamVersion>;

    /// Loads the events committed after `seen`, in version order.
    ///
    /// Returns nothing without reading the stream when the stored version
    /// is still `seen`.
    async fn load_after(
        &self,
        aggregate_id: AggregateId,
        seen: EventStreamVersion,
    ) -> Result<Vec<EventEnvelope>> {
        if self.version(aggregate_id).await? == seen {
            return Ok(Vec::new());
        }
        let stream = self.load(aggregate_id, EventStreamVersion::Max).await?;
        Ok(stream
            .into_iter()
            .filter(|e| !seen.includes(e.version))
            .collect())
    }
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Loads every event of an aggregate.
    async fn load_latest(&self, aggregate_id: AggregateId) -> Result<EventStream> {
        self.load(aggregate_id, EventStreamVersion::Max).await
    }

    /// Loads a stream addressed by the textual form of its id.
    ///
    /// Fails with `InvalidAggregateId` before touching storage if `key` is
    /// not a UUID.
    async fn load_by_key(&self, key: &str, version: EventStreamVersion) -> Result<EventStream> {
        let aggregate_id = AggregateId::parse(key)?;
        self.load(aggregate_id, version).await
    }

    /// Checks if an aggregate exists (has any events).
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.version(aggregate_id).await? != EventStreamVersion::NoStream)
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Validates events before saving.
///
/// The batch must be non-empty, target `aggregate_id`, and continue the
/// stream exactly where `expected_version` leaves it.
pub fn validate_events_for_save(
    aggregate_id: AggregateId,
    expected_version: EventStreamVersion,
    events: &[EventEnvelope],
) -> Result<()> {
    if events.is_empty() {
        return Err(EventStoreError::Validation(
            "Cannot save an empty event list".to_string(),
        ));
    }

    let mut expected = match expected_version {
        EventStreamVersion::Max => {
            return Err(EventStoreError::Validation(
                "Max is not a valid expected version for a save".to_string(),
            ));
        }
        EventStreamVersion::NoStream => Some(Version::first()),
        EventStreamVersion::At(version) => version.next(),
    };

    for event in events {
        if event.aggregate_id != aggregate_id {
            return Err(EventStoreError::Validation(format!(
                "All events must be for aggregate {aggregate_id}, found {}",
                event.aggregate_id
            )));
        }
        let Some(next) = expected else {
            return Err(EventStoreError::Validation(format!(
                "Aggregate {aggregate_id} cannot grow past version {}",
                i64::MAX
            )));
        };
        if event.version != next {
            return Err(EventStoreError::Sequence {
                aggregate_id,
                expected: next,
                actual: event.version,
            });
        }
        expected = next.next();
    }

    Ok(())
}

/// Rejects versions a load cannot be asked for.
pub fn validate_version_for_load(version: EventStreamVersion) -> Result<()> {
    if version == EventStreamVersion::NoStream {
        return Err(EventStoreError::Validation(
            "A stream cannot be loaded at NoStream".to_string(),
        ));
    }
    Ok(())
}

/// Builds the stream a load returns from rows already filtered by version.
///
/// An aggregate without events yields an empty stream whatever was
/// requested; otherwise a concrete request must land on an existing event.
pub fn loaded_stream(
    aggregate_id: AggregateId,
    requested: EventStreamVersion,
    events: Vec<EventEnvelope>,
) -> Result<EventStream> {
    let mut stream = EventStream::new(aggregate_id);
    if events.is_empty() {
        return Ok(stream);
    }

    stream.append(events)?;

    if let EventStreamVersion::At(version) = requested
        && stream.version() != requested
    {
        return Err(EventStoreError::Range {
            aggregate_id,
            version,
        });
    }

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .event_type("TestEvent")
            .aggregate_id(aggregate_id)
            .aggregate_type("TestAggregate")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[test]
    fn validation_accepts_first_write() {
        let id = AggregateId::new();
        let events = vec![event(id, 1), event(id, 2)];
        assert!(validate_events_for_save(id, EventStreamVersion::NoStream, &events).is_ok());
    }

    #[test]
    fn validation_rejects_empty_batch() {
        let result = validate_events_for_save(AggregateId::new(), EventStreamVersion::NoStream, &[]);
        assert!(matches!(result, Err(EventStoreError::Validation(_))));
    }

    #[test]
    fn validation_rejects_max() {
        let id = AggregateId::new();
        let result = validate_events_for_save(id, EventStreamVersion::Max, &[event(id, 1)]);
        assert!(matches!(result, Err(EventStoreError::Validation(_))));
    }

    #[test]
    fn validation_rejects_mixed_aggregates() {
        let id = AggregateId::new();
        let events = vec![event(id, 1), event(AggregateId::new(), 2)];
        let result = validate_events_for_save(id, EventStreamVersion::NoStream, &events);
        assert!(matches!(result, Err(EventStoreError::Validation(_))));
    }

    #[test]
    fn validation_requires_events_to_continue_expected_version() {
        let id = AggregateId::new();
        let result = validate_events_for_save(
            id,
            EventStreamVersion::At(Version::new(2)),
            &[event(id, 2)],
        );
        assert!(matches!(
            result,
            Err(EventStoreError::Sequence { expected, .. }) if expected == Version::new(3)
        ));
    }

    #[test]
    fn validation_rejects_expected_version_without_successor() {
        let id = AggregateId::new();
        let result = validate_events_for_save(
            id,
            EventStreamVersion::At(Version::new(i64::MAX)),
            &[event(id, 1)],
        );
        assert!(matches!(result, Err(EventStoreError::Validation(_))));
    }

    #[test]
    fn validation_rejects_batch_running_past_last_version() {
        let id = AggregateId::new();
        let result = validate_events_for_save(
            id,
            EventStreamVersion::At(Version::new(i64::MAX - 1)),
            &[event(id, i64::MAX), event(id, 1)],
        );
        assert!(matches!(result, Err(EventStoreError::Validation(_))));
    }

    #[tokio::test]
    async fn save_after_last_version_is_a_validation_error() {
        let store = crate::InMemoryEventStore::new();
        let id = AggregateId::new();

        let result = store
            .save(id, EventStreamVersion::At(Version::new(i64::MAX)), vec![event(id, 1)])
            .await;

        assert!(matches!(result, Err(EventStoreError::Validation(_))));
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn load_by_key_rejects_unparseable_id() {
        let store = crate::InMemoryEventStore::new();

        let result = store.load_by_key("not-a-uuid", EventStreamVersion::Max).await;

        assert!(matches!(
            result,
            Err(EventStoreError::InvalidAggregateId(ref err)) if err.value == "not-a-uuid"
        ));
    }

    #[tokio::test]
    async fn load_by_key_loads_the_parsed_aggregate() {
        let store = crate::InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .save(id, EventStreamVersion::NoStream, vec![event(id, 1)])
            .await
            .unwrap();

        let stream = store
            .load_by_key(&id.to_string(), EventStreamVersion::Max)
            .await
            .unwrap();

        assert_eq!(stream.aggregate_id(), id);
        assert_eq!(stream.len(), 1);
    }

    /// Delegates to the in-memory store, counting full loads.
    struct CountingStore {
        inner: crate::InMemoryEventStore,
        loads: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EventStore for CountingStore {
        async fn save(
            &self,
            aggregate_id: AggregateId,
            expected_version: EventStreamVersion,
            events: Vec<EventEnvelope>,
        ) -> Result<Version> {
            self.inner.save(aggregate_id, expected_version, events).await
        }

        async fn load(
            &self,
            aggregate_id: AggregateId,
            version: EventStreamVersion,
        ) -> Result<EventStream> {
            self.loads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.load(aggregate_id, version).await
        }

        async fn version(&self, aggregate_id: AggregateId) -> Result<EventStreamVersion> {
            self.inner.version(aggregate_id).await
        }
    }

    #[tokio::test]
    async fn load_after_skips_the_stream_when_nothing_is_unseen() {
        let store = CountingStore {
            inner: crate::InMemoryEventStore::new(),
            loads: Default::default(),
        };
        let id = AggregateId::new();
        store
            .save(id, EventStreamVersion::NoStream, vec![event(id, 1), event(id, 2)])
            .await
            .unwrap();

        let unseen = store
            .load_after(id, EventStreamVersion::At(Version::new(2)))
            .await
            .unwrap();
        assert!(unseen.is_empty());
        assert_eq!(store.loads.load(std::sync::atomic::Ordering::SeqCst), 0);

        let unseen = store
            .load_after(id, EventStreamVersion::At(Version::new(1)))
            .await
            .unwrap();
        let versions: Vec<_> = unseen.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![Version::new(2)]);
        assert_eq!(store.loads.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn load_validation_rejects_no_stream() {
        assert!(validate_version_for_load(EventStreamVersion::NoStream).is_err());
        assert!(validate_version_for_load(EventStreamVersion::Max).is_ok());
    }

    #[test]
    fn loaded_stream_reports_missing_version() {
        let id = AggregateId::new();
        let result = loaded_stream(
            id,
            EventStreamVersion::At(Version::new(5)),
            vec![event(id, 1), event(id, 2)],
        );
        assert!(matches!(
            result,
            Err(EventStoreError::Range { version, .. }) if version == Version::new(5)
        ));
    }

    #[test]
    fn loaded_stream_is_empty_without_events() {
        let id = AggregateId::new();
        let stream = loaded_stream(id, EventStreamVersion::At(Version::new(1)), vec![]).unwrap();
        assert!(stream.is_empty());
    }
}
