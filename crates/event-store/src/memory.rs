use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, EventStream, EventStreamVersion, Result, Version,
    store::{EventStore, loaded_stream, validate_events_for_save, validate_version_for_load},
};

/// In-memory event store implementation for testing.
///
/// All aggregates share one append-only log. This implementation provides
/// the same save/load contract as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<EventEnvelope>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Returns the whole log in the order events were saved.
    pub async fn events(&self) -> Vec<EventEnvelope> {
        self.events.read().await.clone()
    }

    fn current_version(log: &[EventEnvelope], aggregate_id: AggregateId) -> EventStreamVersion {
        log.iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max()
            .map_or(EventStreamVersion::NoStream, EventStreamVersion::At)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    async fn save(
        &self,
        aggregate_id: AggregateId,
        expected_version: EventStreamVersion,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        validate_events_for_save(aggregate_id, expected_version, &events)?;

        let mut log = self.events.write().await;

        let current_version = Self::current_version(&log, aggregate_id);
        if current_version != expected_version {
            metrics::counter!("event_store_concurrency_conflicts_total").increment(1);
            tracing::warn!(%current_version, "expected version is stale");
            return Err(EventStoreError::Concurrency {
                aggregate_id,
                expected: expected_version,
            });
        }

        let saved = events.len();
        let last_version = events
            .last()
            .map(|e| e.version)
            .unwrap_or_else(Version::first);
        log.extend(events);

        metrics::counter!("event_store_events_saved_total").increment(saved as u64);
        tracing::debug!(%last_version, "events saved");

        Ok(last_version)
    }

    #[tracing::instrument(skip(self))]
    async fn load(
        &self,
        aggregate_id: AggregateId,
        version: EventStreamVersion,
    ) -> Result<EventStream> {
        validate_version_for_load(version)?;

        let log = self.events.read().await;
        let mut events: Vec<_> = log
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && version.includes(e.version))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);

        loaded_stream(aggregate_id, version, events)
    }

    async fn version(&self, aggregate_id: AggregateId) -> Result<EventStreamVersion> {
        let log = self.events.read().await;
        Ok(Self::current_version(&log, aggregate_id))
    }

    async fn load_after(
        &self,
        aggregate_id: AggregateId,
        seen: EventStreamVersion,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.events.read().await;
        let mut events: Vec<_> = log
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && !seen.includes(e.version))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }
}
