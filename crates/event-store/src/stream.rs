//! Ordered, versioned event log for a single aggregate.

use crate::{AggregateId, EventEnvelope, EventStoreError, EventStreamVersion, Result, Version};

/// The events of one aggregate, in version order.
///
/// A stream is a transient view: stores build a fresh one on every load.
/// Versions are contiguous from 1, which [`EventStream::append`] enforces.
#[derive(Debug, Clone, PartialEq)]
pub struct EventStream {
    aggregate_id: AggregateId,
    events: Vec<EventEnvelope>,
}

impl EventStream {
    /// Creates an empty stream for an aggregate.
    pub fn new(aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_id,
            events: Vec::new(),
        }
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// Appends events to the tail of the stream.
    ///
    /// Each event must belong to this aggregate and carry the version right
    /// after the current tail. Nothing is appended if any event is rejected.
    pub fn append(&mut self, events: impl IntoIterator<Item = EventEnvelope>) -> Result<()> {
        let mut expected = match self.events.last() {
            Some(last) => last.version.next(),
            None => Some(Version::first()),
        };
        let mut staged = Vec::new();

        for event in events {
            if event.aggregate_id != self.aggregate_id {
                return Err(EventStoreError::Validation(format!(
                    "Event {} belongs to aggregate {}, not {}",
                    event.header.id, event.aggregate_id, self.aggregate_id
                )));
            }

            let Some(next) = expected else {
                return Err(EventStoreError::Validation(format!(
                    "Stream of {} cannot grow past version {}",
                    self.aggregate_id,
                    i64::MAX
                )));
            };
            if event.version != next {
                return Err(EventStoreError::Sequence {
                    aggregate_id: self.aggregate_id,
                    expected: next,
                    actual: event.version,
                });
            }

            expected = next.next();
            staged.push(event);
        }

        self.events.extend(staged);
        Ok(())
    }

    /// The version of the last event, or `NoStream` when empty.
    pub fn version(&self) -> EventStreamVersion {
        self.events
            .last()
            .map_or(EventStreamVersion::NoStream, |e| EventStreamVersion::At(e.version))
    }

    pub fn events(&self) -> &[EventEnvelope] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventEnvelope> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<EventEnvelope> {
        self.events
    }
}

impl IntoIterator for EventStream {
    type Item = EventEnvelope;
    type IntoIter = std::vec::IntoIter<EventEnvelope>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a EventStream {
    type Item = &'a EventEnvelope;
    type IntoIter = std::slice::Iter<'a, EventEnvelope>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
