//! Aggregates and the root that tracks their history.

use common::{AggregateId, Message};
use event_store::{EventEnvelope, EventStream, EventStreamVersion, Version};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::Result;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense. The serialized
/// form must carry its own type tag so a stored payload can be turned back
/// into the right variant.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates in an event-sourced system.
///
/// An aggregate's state derives solely from its events:
/// - it starts from `Default`
/// - `apply` folds one event into it and must be pure and deterministic
/// - it must not fail (events represent facts that have happened)
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors a rejected command produces.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Applies an event to the aggregate, updating its state.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// An aggregate together with its identity, the version it was loaded at and
/// the events recorded since.
#[derive(Debug, Clone)]
pub struct AggregateRoot<A: Aggregate> {
    id: AggregateId,
    state: A,
    base_version: EventStreamVersion,
    last_event: Option<EventEnvelope>,
    uncommitted: Vec<EventEnvelope>,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// Starts a root for an aggregate that has no events yet.
    pub fn new(id: AggregateId) -> Self {
        Self {
            id,
            state: A::default(),
            base_version: EventStreamVersion::NoStream,
            last_event: None,
            uncommitted: Vec::new(),
        }
    }

    /// Rebuilds a root by replaying a stream onto a fresh aggregate.
    pub fn from_stream(stream: EventStream) -> Result<Self> {
        let mut root = Self::new(stream.aggregate_id());
        root.base_version = stream.version();

        for envelope in stream {
            let event: A::Event = serde_json::from_value(envelope.payload.clone())?;
            root.state.apply(event);
            root.last_event = Some(envelope);
        }

        Ok(root)
    }

    pub fn id(&self) -> AggregateId {
        self.id
    }

    pub fn state(&self) -> &A {
        &self.state
    }

    /// The committed version this root was loaded at.
    pub fn base_version(&self) -> EventStreamVersion {
        self.base_version
    }

    /// The version including uncommitted events.
    pub fn version(&self) -> EventStreamVersion {
        self.last_event
            .as_ref()
            .map_or(EventStreamVersion::NoStream, |e| EventStreamVersion::At(e.version))
    }

    pub fn uncommitted_events(&self) -> &[EventEnvelope] {
        &self.uncommitted
    }

    pub fn has_changes(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// Applies `event` and queues it for saving.
    pub fn record(&mut self, event: A::Event) -> Result<&EventEnvelope> {
        self.record_envelope(event, None::<&EventEnvelope>)
    }

    /// Like [`AggregateRoot::record`], linking the event to the message
    /// that caused it.
    pub fn record_caused_by(
        &mut self,
        event: A::Event,
        cause: &(impl Message + ?Sized),
    ) -> Result<&EventEnvelope> {
        self.record_envelope(event, Some(cause))
    }

    fn record_envelope<M: Message + ?Sized>(
        &mut self,
        event: A::Event,
        cause: Option<&M>,
    ) -> Result<&EventEnvelope> {
        let mut builder = EventEnvelope::builder()
            .aggregate_id(self.id)
            .aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .payload(&event)?;
        builder = match &self.last_event {
            Some(previous) => builder.follows(previous)?,
            None => builder.version(Version::first()),
        };
        if let Some(cause) = cause {
            builder = builder.caused_by(cause);
        }
        let envelope = builder.build()?;

        self.state.apply(event);
        self.uncommitted.push(envelope.clone());

        Ok(self.last_event.insert(envelope))
    }

    /// Accepts the uncommitted events as saved.
    pub(crate) fn mark_committed(&mut self) -> Vec<EventEnvelope> {
        if let Some(last) = &self.last_event {
            self.base_version = EventStreamVersion::At(last.version);
        }
        std::mem::take(&mut self.uncommitted)
    }
}
