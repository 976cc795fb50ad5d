//! Loading and saving aggregates through an event store.

use std::marker::PhantomData;

use common::{AggregateId, CommandEnvelope};
use event_bus::EventBus;
use event_store::{
    ConcurrencyMonitor, EventEnvelope, EventStore, EventStoreError, EventStoreExt,
    EventStreamVersion, StrictConcurrencyMonitor, Version,
};

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::error::{RepositoryError, Result};

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after the command's events were saved.
    pub root: AggregateRoot<A>,

    /// The events that were generated and persisted.
    pub events: Vec<EventEnvelope>,

    /// The version of the aggregate after the command.
    pub new_version: EventStreamVersion,
}

/// Event-sourced repository for one aggregate type.
///
/// The repository is responsible for:
/// 1. Rebuilding aggregates by replaying their stream
/// 2. Checking uncommitted events against events committed meanwhile
/// 3. Saving the uncommitted events with optimistic concurrency
/// 4. Publishing the committed events, when a bus is attached
pub struct EventSourcingRepository<S, A, M = StrictConcurrencyMonitor>
where
    S: EventStore,
    A: Aggregate,
    M: ConcurrencyMonitor,
{
    store: S,
    monitor: M,
    bus: Option<EventBus>,
    _phantom: PhantomData<fn() -> A>,
}

impl<S, A> EventSourcingRepository<S, A, StrictConcurrencyMonitor>
where
    S: EventStore,
    A: Aggregate,
{
    /// Creates a repository that rejects saves made on a stale version.
    pub fn strict(store: S) -> Self {
        Self::new(store, StrictConcurrencyMonitor)
    }
}

impl<S, A, M> EventSourcingRepository<S, A, M>
where
    S: EventStore,
    A: Aggregate,
    M: ConcurrencyMonitor,
{
    pub fn new(store: S, monitor: M) -> Self {
        Self {
            store,
            monitor,
            bus: None,
            _phantom: PhantomData,
        }
    }

    /// Publishes every committed event on `bus` after a successful save.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate at its latest version.
    ///
    /// Returns `None` if the aggregate has no events.
    #[tracing::instrument(skip(self), fields(aggregate_type = A::aggregate_type()))]
    pub async fn get(&self, aggregate_id: AggregateId) -> Result<Option<AggregateRoot<A>>> {
        let stream = self.store.load_latest(aggregate_id).await?;
        if stream.is_empty() {
            return Ok(None);
        }
        AggregateRoot::from_stream(stream).map(Some)
    }

    /// Loads an aggregate as it was at `version`.
    #[tracing::instrument(skip(self), fields(aggregate_type = A::aggregate_type()))]
    pub async fn get_at(
        &self,
        aggregate_id: AggregateId,
        version: Version,
    ) -> Result<Option<AggregateRoot<A>>> {
        let stream = self
            .store
            .load(aggregate_id, EventStreamVersion::At(version))
            .await?;
        if stream.is_empty() {
            return Ok(None);
        }
        AggregateRoot::from_stream(stream).map(Some)
    }

    /// Loads an aggregate, or starts a new one if it has no events.
    pub async fn get_or_new(&self, aggregate_id: AggregateId) -> Result<AggregateRoot<A>> {
        Ok(self
            .get(aggregate_id)
            .await?
            .unwrap_or_else(|| AggregateRoot::new(aggregate_id)))
    }

    /// Saves the root's uncommitted events and returns them as committed.
    ///
    /// Events committed since the root was loaded go through the
    /// concurrency monitor first. If it lets them through, the uncommitted
    /// events are renumbered to follow the latest stored event and the root
    /// is reloaded so its state includes everything that was committed.
    #[tracing::instrument(
        skip(self, root),
        fields(
            aggregate_type = A::aggregate_type(),
            aggregate_id = %root.id(),
            event_count = root.uncommitted_events().len(),
        )
    )]
    pub async fn save(&self, root: &mut AggregateRoot<A>) -> Result<Vec<EventEnvelope>> {
        if !root.has_changes() {
            return Ok(Vec::new());
        }

        let aggregate_id = root.id();
        let unseen = self
            .store
            .load_after(aggregate_id, root.base_version())
            .await?;

        let conflicts = self
            .monitor
            .check_for_conflicts(&unseen, root.uncommitted_events());
        if !conflicts.is_empty() {
            metrics::counter!("event_store_concurrency_conflicts_total").increment(1);
            tracing::warn!(unseen = unseen.len(), "uncommitted changes conflict");
            return Err(EventStoreError::ConflictingChanges {
                aggregate_id,
                conflicts,
            }
            .into());
        }

        let committed = match unseen.last() {
            None => {
                self.store
                    .save(
                        aggregate_id,
                        root.base_version(),
                        root.uncommitted_events().to_vec(),
                    )
                    .await?;
                root.mark_committed()
            }
            Some(latest) => {
                let rebased = rebase(latest, root.uncommitted_events())?;
                tracing::debug!(onto = %latest.version, "rebasing uncommitted events");
                let version = self
                    .store
                    .save(
                        aggregate_id,
                        EventStreamVersion::At(latest.version),
                        rebased.clone(),
                    )
                    .await?;
                *root = self.get_at(aggregate_id, version).await?.ok_or(
                    EventStoreError::Range {
                        aggregate_id,
                        version,
                    },
                )?;
                rebased
            }
        };

        if let Some(bus) = &self.bus {
            bus.publish_all(committed.iter().cloned()).await?;
        }

        Ok(committed)
    }

    /// Loads an aggregate, runs a command against it and saves the result.
    ///
    /// The command function receives the current aggregate state and returns
    /// either a list of events to record, or an error. Recorded events are
    /// caused by `command`.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command: &CommandEnvelope,
        command_fn: F,
    ) -> Result<CommandResult<A>>
    where
        F: FnOnce(&A) -> std::result::Result<Vec<A::Event>, A::Error>,
    {
        let mut root = self.get_or_new(aggregate_id).await?;

        let events =
            command_fn(root.state()).map_err(|e| RepositoryError::Rejected(Box::new(e)))?;

        for event in events {
            root.record_caused_by(event, command)?;
        }

        let events = self.save(&mut root).await?;
        let new_version = root.version();

        Ok(CommandResult {
            root,
            events,
            new_version,
        })
    }
}

/// Renumbers `uncommitted` to continue after `latest`.
fn rebase(latest: &EventEnvelope, uncommitted: &[EventEnvelope]) -> Result<Vec<EventEnvelope>> {
    let mut rebased: Vec<EventEnvelope> = Vec::with_capacity(uncommitted.len());
    for event in uncommitted {
        let previous = rebased.last().unwrap_or(latest);
        let next = event.clone().follows(previous)?;
        rebased.push(next);
    }
    Ok(rebased)
}
