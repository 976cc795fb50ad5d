use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, EventStoreError, Message, MessageHeader, MessageId, Result};

/// Version number of an event within its aggregate's stream.
///
/// Versions start at 1 for the first event and increment by 1 for each
/// subsequent event on an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the first version (1) for the first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version, or `None` if it would overflow.
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Like [`Version::next`], failing with a validation error on overflow.
    pub fn try_next(&self) -> Result<Self> {
        self.next().ok_or_else(|| {
            EventStoreError::Validation(format!("Version {} has no successor", self.0))
        })
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::first()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A position in an event stream, including the two sentinels.
///
/// `NoStream` means nothing has been persisted for the aggregate yet and is
/// what a first save expects. `Max` asks a load for everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStreamVersion {
    NoStream,
    Max,
    At(Version),
}

impl EventStreamVersion {
    /// Returns the concrete version, if any.
    pub fn as_version(&self) -> Option<Version> {
        match self {
            Self::At(version) => Some(*version),
            Self::NoStream | Self::Max => None,
        }
    }

    /// Returns the version the next appended event must carry.
    ///
    /// `None` for `Max`, which does not name a position, and for a version
    /// with no successor.
    pub fn next_version(&self) -> Option<Version> {
        match self {
            Self::NoStream => Some(Version::first()),
            Self::At(version) => version.next(),
            Self::Max => None,
        }
    }

    /// Whether an event at `version` falls inside this bound.
    pub fn includes(&self, version: Version) -> bool {
        match self {
            Self::Max => true,
            Self::At(bound) => version <= *bound,
            Self::NoStream => false,
        }
    }
}

impl std::fmt::Display for EventStreamVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoStream => write!(f, "NoStream"),
            Self::Max => write!(f, "Max"),
            Self::At(version) => write!(f, "{version}"),
        }
    }
}

impl From<Version> for EventStreamVersion {
    fn from(version: Version) -> Self {
        Self::At(version)
    }
}

/// An event together with its metadata, in the form the store persists.
///
/// The whole envelope is serialized into the durable store, so `event_type`
/// travels with the payload and tells readers which variant to rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Identity and causal chain of this event.
    pub header: MessageHeader,

    /// The type of the event (e.g., "UserRegistered", "PasswordChanged").
    pub event_type: String,

    /// The aggregate this event belongs to.
    pub aggregate_id: AggregateId,

    /// The type of aggregate (e.g., "User").
    pub aggregate_type: String,

    /// The version of the aggregate after this event.
    pub version: Version,

    /// When the event was created.
    pub timestamp: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Additional metadata about the event.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Creates a new event envelope builder.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Links this event to the command or event that caused it.
    pub fn caused_by(mut self, originator: &(impl Message + ?Sized)) -> Self {
        self.header = self.header.caused_by(originator);
        self
    }

    /// Places this event directly after `previous` in its stream.
    pub fn follows(mut self, previous: &EventEnvelope) -> Result<Self> {
        self.version = previous.version.try_next()?;
        Ok(self)
    }
}

impl Message for EventEnvelope {
    fn header(&self) -> &MessageHeader {
        &self.header
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    header: Option<MessageHeader>,
    event_type: Option<String>,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    version: Option<Version>,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelopeBuilder {
    /// Sets the message ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: MessageId) -> Self {
        let mut header = self.header.unwrap_or_default();
        header.id = id;
        self.header = Some(header);
        self
    }

    /// Sets the whole header.
    pub fn header(mut self, header: MessageHeader) -> Self {
        self.header = Some(header);
        self
    }

    /// Links the event to the message that caused it.
    pub fn caused_by(mut self, originator: &(impl Message + ?Sized)) -> Self {
        self.header = Some(self.header.unwrap_or_default().caused_by(originator));
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the aggregate ID.
    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    /// Sets the aggregate type.
    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    /// Sets the version. If not set, the event is version 1.
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the version to the one after `previous`.
    pub fn follows(mut self, previous: &EventEnvelope) -> Result<Self> {
        self.version = Some(previous.version.try_next()?);
        Ok(self)
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds the event envelope.
    ///
    /// Fails with a validation error naming the first missing required field
    /// (event_type, aggregate_id, aggregate_type, payload).
    pub fn build(self) -> Result<EventEnvelope> {
        Ok(EventEnvelope {
            header: self.header.unwrap_or_default(),
            event_type: self.event_type.ok_or_else(|| missing("event_type"))?,
            aggregate_id: self.aggregate_id.ok_or_else(|| missing("aggregate_id"))?,
            aggregate_type: self
                .aggregate_type
                .ok_or_else(|| missing("aggregate_type"))?,
            version: self.version.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            payload: self.payload.ok_or_else(|| missing("payload"))?,
            metadata: self.metadata,
        })
    }
}

fn missing(field: &str) -> EventStoreError {
    EventStoreError::Validation(format!("{field} is required"))
}
