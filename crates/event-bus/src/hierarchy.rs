//! Type hierarchies of publishable messages.
//!
//! A message declares its ancestor set explicitly through
//! [`Publishable::type_chain`], most generic first and its own type last.
//! The bus walks that chain instead of reflecting over types at runtime.

use std::borrow::Cow;

use common::{CommandEnvelope, Message};
use event_store::EventEnvelope;

/// Name of one type in a message hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(Cow<'static, str>);

impl TypeKey {
    /// Universal base of every message.
    pub const ANY: TypeKey = TypeKey::from_static("Any");
    pub const MESSAGE: TypeKey = TypeKey::from_static("Message");
    pub const EVENT: TypeKey = TypeKey::from_static("Event");
    pub const COMMAND: TypeKey = TypeKey::from_static("Command");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for TypeKey {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for TypeKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Ordered ancestor set under construction.
///
/// Each key appears once; re-adding an ancestor keeps its first position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeChain(Vec<TypeKey>);

impl TypeChain {
    /// `[Any, Message]`
    pub fn message() -> Self {
        Self(vec![TypeKey::ANY, TypeKey::MESSAGE])
    }

    /// `[Any, Message, Event]`
    pub fn event() -> Self {
        Self::message().then(TypeKey::EVENT)
    }

    /// `[Any, Message, Command]`
    pub fn command() -> Self {
        Self::message().then(TypeKey::COMMAND)
    }

    pub fn then(mut self, key: impl Into<TypeKey>) -> Self {
        let key = key.into();
        if !self.0.contains(&key) {
            self.0.push(key);
        }
        self
    }

    pub fn keys(&self) -> &[TypeKey] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<TypeKey> {
        self.0
    }
}

impl From<TypeChain> for Vec<TypeKey> {
    fn from(chain: TypeChain) -> Self {
        chain.into_vec()
    }
}

/// Anything the bus can publish.
pub trait Publishable: Message + Send + Sync + 'static {
    /// Every type this message is an instance of, most generic first.
    fn type_chain(&self) -> Vec<TypeKey>;

    fn as_any(&self) -> &dyn std::any::Any;
}

impl dyn Publishable {
    /// Recovers the concrete message, if it is a `T`.
    pub fn downcast_ref<T: Publishable>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl std::fmt::Debug for dyn Publishable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publishable")
            .field("id", &self.id())
            .field("type_chain", &self.type_chain())
            .finish()
    }
}

impl Publishable for EventEnvelope {
    /// `[Any, Message, Event, <aggregate type>, <event type>]`
    fn type_chain(&self) -> Vec<TypeKey> {
        TypeChain::event()
            .then(self.aggregate_type.clone())
            .then(self.event_type.clone())
            .into_vec()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl Publishable for CommandEnvelope {
    fn type_chain(&self) -> Vec<TypeKey> {
        TypeChain::command().then(self.command_type.clone()).into_vec()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AggregateId;

    fn envelope(aggregate_type: &str, event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type(aggregate_type)
            .event_type(event_type)
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[test]
    fn static_and_owned_keys_compare_equal() {
        assert_eq!(TypeKey::from_static("Event"), TypeKey::new("Event"));
        assert_eq!(TypeKey::EVENT.to_string(), "Event");
    }

    #[test]
    fn chain_starts_generic_and_ignores_repeats() {
        let chain = TypeChain::event()
            .then("UserEvent")
            .then(TypeKey::MESSAGE)
            .then("UserRegistered")
            .then("UserEvent");

        assert_eq!(
            chain.keys(),
            &[
                TypeKey::ANY,
                TypeKey::MESSAGE,
                TypeKey::EVENT,
                TypeKey::from_static("UserEvent"),
                TypeKey::from_static("UserRegistered"),
            ]
        );
    }

    #[test]
    fn envelope_chain_ends_with_event_type() {
        let chain = envelope("User", "UserRegistered").type_chain();

        assert_eq!(
            chain,
            vec![
                TypeKey::ANY,
                TypeKey::MESSAGE,
                TypeKey::EVENT,
                TypeKey::new("User"),
                TypeKey::new("UserRegistered"),
            ]
        );
    }

    #[test]
    fn command_chain_uses_command_base() {
        let command = CommandEnvelope::new("RegisterUser", serde_json::json!({}));

        assert_eq!(
            command.type_chain(),
            vec![
                TypeKey::ANY,
                TypeKey::MESSAGE,
                TypeKey::COMMAND,
                TypeKey::new("RegisterUser"),
            ]
        );
    }

    #[test]
    fn downcast_recovers_concrete_message() {
        let event = envelope("User", "UserRegistered");
        let published: &dyn Publishable = &event;

        assert_eq!(
            published.downcast_ref::<EventEnvelope>().map(|e| &e.event_type),
            Some(&"UserRegistered".to_string())
        );
        assert!(published.downcast_ref::<CommandEnvelope>().is_none());
    }
}
