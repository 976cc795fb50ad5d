//! Causal metadata shared by every command, event and envelope.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a message ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identity and causal chain of a message.
///
/// A new header starts its own chain: the correlation ID equals the message
/// ID and there is no causation ID. [`MessageHeader::caused_by`] links it to
/// the message that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub id: MessageId,
    pub causation_id: Option<MessageId>,
    pub correlation_id: MessageId,
}

impl MessageHeader {
    pub fn new() -> Self {
        let id = MessageId::new();
        Self {
            id,
            causation_id: None,
            correlation_id: id,
        }
    }

    /// Records `originator` as the cause and joins its correlation chain.
    pub fn caused_by(mut self, originator: &(impl Message + ?Sized)) -> Self {
        self.causation_id = Some(originator.id());
        self.correlation_id = originator.correlation_id();
        self
    }
}

impl Default for MessageHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything carrying a [`MessageHeader`].
pub trait Message {
    fn header(&self) -> &MessageHeader;

    fn id(&self) -> MessageId {
        self.header().id
    }

    fn causation_id(&self) -> Option<MessageId> {
        self.header().causation_id
    }

    fn correlation_id(&self) -> MessageId {
        self.header().correlation_id
    }
}

impl Message for MessageHeader {
    fn header(&self) -> &MessageHeader {
        self
    }
}

/// A command: a request to change an aggregate. Commands carry no version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub header: MessageHeader,

    /// The type of the command (e.g., "RegisterUser").
    pub command_type: String,

    /// The command payload as JSON.
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    pub fn new(command_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            header: MessageHeader::new(),
            command_type: command_type.into(),
            payload,
        }
    }

    /// Links this command to the message that triggered it.
    pub fn caused_by(mut self, originator: &(impl Message + ?Sized)) -> Self {
        self.header = self.header.caused_by(originator);
        self
    }
}

impl Message for CommandEnvelope {
    fn header(&self) -> &MessageHeader {
        &self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_header_starts_its_own_chain() {
        let header = MessageHeader::new();
        assert_eq!(header.correlation_id, header.id);
        assert!(header.causation_id.is_none());
    }

    #[test]
    fn caused_by_copies_id_and_correlation() {
        let command = CommandEnvelope::new("RegisterUser", serde_json::json!({}));
        let header = MessageHeader::new().caused_by(&command);

        assert_eq!(header.causation_id, Some(command.id()));
        assert_eq!(header.correlation_id, command.correlation_id());
        assert_ne!(header.id, command.id());
    }

    #[test]
    fn correlation_survives_a_chain_of_causes() {
        let root = CommandEnvelope::new("RegisterUser", serde_json::json!({}));
        let first = MessageHeader::new().caused_by(&root);
        let second = MessageHeader::new().caused_by(&first);

        assert_eq!(second.causation_id, Some(first.id));
        assert_eq!(second.correlation_id, root.id());
    }

    #[test]
    fn command_serialization_roundtrip() {
        let command = CommandEnvelope::new("ChangePassword", serde_json::json!({"pwd": "x"}));
        let json = serde_json::to_string(&command).unwrap();
        let restored: CommandEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, command);
    }
}
