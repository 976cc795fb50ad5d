//! Outcome notices the bus publishes after handling a message.

use std::sync::Arc;

use common::{Message, MessageHeader};

use crate::{BoxError, Publishable};

/// Every handler of a message ran without failing.
pub struct HandlingSucceeded {
    header: MessageHeader,
    event: Arc<dyn Publishable>,
}

impl HandlingSucceeded {
    pub fn new(event: Arc<dyn Publishable>) -> Self {
        Self {
            header: MessageHeader::new().caused_by(event.as_ref()),
            event,
        }
    }

    /// The message that was handled.
    pub fn event(&self) -> &dyn Publishable {
        self.event.as_ref()
    }
}

impl Message for HandlingSucceeded {
    fn header(&self) -> &MessageHeader {
        &self.header
    }
}

impl std::fmt::Debug for HandlingSucceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlingSucceeded")
            .field("header", &self.header)
            .field("event_id", &self.event.id())
            .finish()
    }
}

/// A handler failed and the failure was not worth retrying.
pub struct HandlingFailed {
    header: MessageHeader,
    event: Arc<dyn Publishable>,
    handler: String,
    failure: BoxError,
}

impl HandlingFailed {
    pub fn new(event: Arc<dyn Publishable>, handler: impl Into<String>, failure: BoxError) -> Self {
        Self {
            header: MessageHeader::new().caused_by(event.as_ref()),
            event,
            handler: handler.into(),
            failure,
        }
    }

    /// The message whose handling failed.
    pub fn event(&self) -> &dyn Publishable {
        self.event.as_ref()
    }

    /// Name of the handler that failed.
    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn failure(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.failure.as_ref()
    }
}

impl Message for HandlingFailed {
    fn header(&self) -> &MessageHeader {
        &self.header
    }
}

impl std::fmt::Debug for HandlingFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlingFailed")
            .field("header", &self.header)
            .field("event_id", &self.event.id())
            .field("handler", &self.handler)
            .field("failure", &self.failure.to_string())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CommandEnvelope;

    fn published() -> Arc<dyn Publishable> {
        Arc::new(CommandEnvelope::new("RegisterUser", serde_json::json!({})))
    }

    #[test]
    fn success_notice_is_caused_by_the_original() {
        let original = published();
        let notice = HandlingSucceeded::new(Arc::clone(&original));

        assert_ne!(notice.id(), original.id());
        assert_eq!(notice.causation_id(), Some(original.id()));
        assert_eq!(notice.correlation_id(), original.correlation_id());
        assert_eq!(notice.event().id(), original.id());
    }

    #[test]
    fn failure_notice_carries_handler_and_error() {
        let original = published();
        let notice = HandlingFailed::new(Arc::clone(&original), "Mailer", "smtp down".into());

        assert_eq!(notice.causation_id(), Some(original.id()));
        assert_eq!(notice.handler(), "Mailer");
        assert_eq!(notice.failure().to_string(), "smtp down");
    }
}
