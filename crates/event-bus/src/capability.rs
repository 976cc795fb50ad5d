use crate::TypeKey;

/// What a handler declares it can handle.
///
/// Handlers of an ancestor type receive every descendant; the bus asks
/// for one capability per level of a message's [`TypeKey`] chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Handles the message itself.
    Handles(TypeKey),
    /// Handles the notice that a message of this type was handled.
    Succeeded(TypeKey),
    /// Handles the notice that handling a message of this type failed.
    Failed(TypeKey),
}

impl Capability {
    /// The message type this capability is about.
    pub fn target(&self) -> &TypeKey {
        match self {
            Self::Handles(key) | Self::Succeeded(key) | Self::Failed(key) => key,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handles(key) => write!(f, "Handles<{key}>"),
            Self::Succeeded(key) => write!(f, "Handles<HandlingSucceeded<{key}>>"),
            Self::Failed(key) => write!(f, "Handles<HandlingFailed<{key}>>"),
        }
    }
}
