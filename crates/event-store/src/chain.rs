//! Test helper for building contiguous event sequences.

use std::ops::Deref;

use crate::{EventEnvelope, Result, Version};

/// An append-only list of events that numbers them as they are added.
///
/// An event that still carries the default version (1) is renumbered to
/// follow the previous one, so fixtures only need to build payloads:
///
/// ```ignore
/// let chain = EventChain::new()
///     .add(registered)?
///     .add(password_changed)?
///     .add(password_changed_again)?;
/// assert_eq!(chain[2].version, Version::new(3));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventChain {
    events: Vec<EventEnvelope>,
}

impl EventChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an event, numbering it after the last one if unset.
    ///
    /// Fails only when the previous event is already at the last version.
    pub fn add(mut self, event: EventEnvelope) -> Result<Self> {
        self.push(event)?;
        Ok(self)
    }

    /// In-place form of [`EventChain::add`].
    pub fn push(&mut self, event: EventEnvelope) -> Result<()> {
        let event = match self.events.last() {
            Some(previous) if event.version == Version::first() => event.follows(previous)?,
            _ => event,
        };
        self.events.push(event);
        Ok(())
    }

    pub fn into_vec(self) -> Vec<EventEnvelope> {
        self.events
    }
}

impl Deref for EventChain {
    type Target = [EventEnvelope];

    fn deref(&self) -> &Self::Target {
        &self.events
    }
}

impl IntoIterator for EventChain {
    type Item = EventEnvelope;
    type IntoIter = std::vec::IntoIter<EventEnvelope>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl From<EventChain> for Vec<EventEnvelope> {
    fn from(chain: EventChain) -> Self {
        chain.events
    }
}
