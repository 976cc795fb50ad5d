//! Policies deciding whether uncommitted changes may be saved on top of
//! events the caller has not seen.

use crate::EventEnvelope;

/// Committed events the caller had not seen, bundled with the changes it
/// tried to save.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyConflict {
    description: String,
    unseen_events: Vec<EventEnvelope>,
    uncommitted_events: Vec<EventEnvelope>,
}

impl ConcurrencyConflict {
    pub fn new(
        description: impl Into<String>,
        unseen_events: Vec<EventEnvelope>,
        uncommitted_events: Vec<EventEnvelope>,
    ) -> Self {
        Self {
            description: description.into(),
            unseen_events,
            uncommitted_events,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn unseen_events(&self) -> &[EventEnvelope] {
        &self.unseen_events
    }

    pub fn uncommitted_events(&self) -> &[EventEnvelope] {
        &self.uncommitted_events
    }
}

impl std::fmt::Display for ConcurrencyConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} unseen, {} uncommitted)",
            self.description,
            self.unseen_events.len(),
            self.uncommitted_events.len()
        )
    }
}

/// Compares unseen committed events with uncommitted local ones.
///
/// Implementations must be pure: they only read their inputs.
pub trait ConcurrencyMonitor: Send + Sync {
    fn check_for_conflicts(
        &self,
        unseen_events: &[EventEnvelope],
        uncommitted_events: &[EventEnvelope],
    ) -> Vec<ConcurrencyConflict>;
}

/// Rejects any save made without having seen every committed event.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictConcurrencyMonitor;

impl ConcurrencyMonitor for StrictConcurrencyMonitor {
    fn check_for_conflicts(
        &self,
        unseen_events: &[EventEnvelope],
        uncommitted_events: &[EventEnvelope],
    ) -> Vec<ConcurrencyConflict> {
        if unseen_events.is_empty() || uncommitted_events.is_empty() {
            return Vec::new();
        }

        vec![ConcurrencyConflict::new(
            "Changes conflict with one or more committed events.",
            unseen_events.to_vec(),
            uncommitted_events.to_vec(),
        )]
    }
}

/// Never reports a conflict; uncommitted events are saved after whatever
/// has been committed meanwhile.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveConcurrencyMonitor;

impl ConcurrencyMonitor for PermissiveConcurrencyMonitor {
    fn check_for_conflicts(
        &self,
        _unseen_events: &[EventEnvelope],
        _uncommitted_events: &[EventEnvelope],
    ) -> Vec<ConcurrencyConflict> {
        Vec::new()
    }
}
