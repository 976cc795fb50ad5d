//! The dispatch loop.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::{
    BoxError, BusConfig, BusError, Capability, Delivery, EventHandler, HandlingFailed,
    HandlingSucceeded, Publishable, Result, TypeKey,
};

/// Counts of what one publish did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Handler calls made, successful or not.
    pub invocations: usize,
    /// Failures turned into notices or dropped instead of propagated.
    pub swallowed_failures: usize,
    /// Success and failure notices published.
    pub envelopes: usize,
}

impl PublishReport {
    fn merge(&mut self, other: PublishReport) {
        self.invocations += other.invocations;
        self.swallowed_failures += other.swallowed_failures;
        self.envelopes += other.envelopes;
    }
}

/// A message waiting in the dispatch queue.
enum Pending {
    Original(Arc<dyn Publishable>),
    Succeeded(HandlingSucceeded),
    Failed(HandlingFailed),
}

impl Pending {
    fn capability(&self, key: &TypeKey) -> Capability {
        match self {
            Self::Original(_) => Capability::Handles(key.clone()),
            Self::Succeeded(_) => Capability::Succeeded(key.clone()),
            Self::Failed(_) => Capability::Failed(key.clone()),
        }
    }

    fn delivery(&self) -> Delivery<'_> {
        match self {
            Self::Original(event) => Delivery::Event(event.as_ref()),
            Self::Succeeded(notice) => Delivery::Succeeded(notice),
            Self::Failed(notice) => Delivery::Failed(notice),
        }
    }

    fn is_envelope(&self) -> bool {
        !matches!(self, Self::Original(_))
    }
}

/// A failure that stopped dispatch without reaching the publisher.
struct Swallowed {
    handler: &'static str,
    failure: BoxError,
}

/// Publishes messages to every handler of every type in their hierarchy.
///
/// For each message the bus asks the locator once per level of the
/// message's type chain, most generic level first, and calls the located
/// handlers in order. It then publishes a [`HandlingSucceeded`] or
/// [`HandlingFailed`] notice over the same levels. Notices are queued and
/// dispatched after the message itself; notices about notices are never
/// produced.
#[derive(Clone)]
pub struct EventBus {
    config: BusConfig,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Publishes one message.
    pub async fn publish<P: Publishable>(&self, event: P) -> Result<PublishReport> {
        self.publish_shared(Arc::new(event)).await
    }

    /// Publishes a message the caller keeps a handle to.
    #[tracing::instrument(skip_all, fields(message_id = %event.id()))]
    pub async fn publish_shared(&self, event: Arc<dyn Publishable>) -> Result<PublishReport> {
        let chain = event.type_chain();
        let mut report = PublishReport::default();
        let mut queue = VecDeque::new();
        queue.push_back(Pending::Original(event));

        while let Some(pending) = queue.pop_front() {
            let swallowed = self.dispatch(&pending, &chain, &mut report).await?;

            // Only the original message gets a notice
            if let Pending::Original(event) = pending {
                let notice = match swallowed {
                    None => Pending::Succeeded(HandlingSucceeded::new(event)),
                    Some(Swallowed { handler, failure }) => {
                        Pending::Failed(HandlingFailed::new(event, handler, failure))
                    }
                };
                report.envelopes += 1;
                metrics::counter!("event_bus_envelopes_published_total").increment(1);
                queue.push_back(notice);
            }
        }

        tracing::debug!(
            invocations = report.invocations,
            swallowed_failures = report.swallowed_failures,
            "message published"
        );

        Ok(report)
    }

    /// Publishes messages in order, stopping at the first failure that
    /// reaches the publisher.
    pub async fn publish_all<I, P>(&self, events: I) -> Result<PublishReport>
    where
        I: IntoIterator<Item = P>,
        P: Publishable,
    {
        let mut total = PublishReport::default();
        for event in events {
            total.merge(self.publish(event).await?);
        }
        Ok(total)
    }

    /// Runs one queued message through every level of `chain`.
    ///
    /// Returns the failure that cut dispatch short, if it was swallowed.
    async fn dispatch(
        &self,
        pending: &Pending,
        chain: &[TypeKey],
        report: &mut PublishReport,
    ) -> Result<Option<Swallowed>> {
        for key in chain {
            let capability = pending.capability(key);
            let handlers = self.config.locator().locate(&capability);

            for handler in handlers {
                report.invocations += 1;
                metrics::counter!("event_bus_handler_invocations_total").increment(1);

                if let Err(failure) = handler.handle(&capability, pending.delivery()).await {
                    metrics::counter!("event_bus_handler_failures_total").increment(1);
                    let swallowed =
                        self.on_failure(pending, handler.as_ref(), capability, failure, report)?;
                    return Ok(Some(swallowed));
                }
            }
        }

        Ok(None)
    }

    fn on_failure(
        &self,
        pending: &Pending,
        handler: &dyn EventHandler,
        capability: Capability,
        failure: BoxError,
        report: &mut PublishReport,
    ) -> Result<Swallowed> {
        let filtered = !pending.is_envelope() || self.config.filters_envelope_failures();

        if filtered && self.config.retry_filter().is_retryable(handler, failure.as_ref()) {
            tracing::warn!(
                handler = handler.name(),
                %capability,
                error = %failure,
                "retryable handler failure"
            );
            return Err(BusError::Retryable {
                handler: handler.name().to_string(),
                capability,
                source: failure,
            });
        }

        report.swallowed_failures += 1;
        tracing::warn!(
            handler = handler.name(),
            %capability,
            error = %failure,
            "handler failed"
        );

        Ok(Swallowed {
            handler: handler.name(),
            failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HandlerRegistry;
    use async_trait::async_trait;
    use common::{AggregateId, CommandEnvelope};
    use event_store::EventEnvelope;
    use std::sync::Mutex;

    /// Records the capability of every call it receives.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Recorder {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &'static str {
            "Recorder"
        }

        async fn handle(
            &self,
            capability: &Capability,
            _: Delivery<'_>,
        ) -> std::result::Result<(), BoxError> {
            self.calls.lock().unwrap().push(capability.to_string());
            if self.fail && matches!(capability, Capability::Handles(_)) {
                return Err("handler failed".into());
            }
            Ok(())
        }
    }

    fn user_registered() -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("User")
            .event_type("UserRegistered")
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    fn bus_with(capabilities: &[Capability], handler: Arc<Recorder>) -> EventBus {
        let registry = capabilities.iter().fold(HandlerRegistry::new(), |registry, capability| {
            registry.with(capability.clone(), handler.clone())
        });
        EventBus::new(BusConfig::new(registry))
    }

    #[tokio::test]
    async fn publish_without_handlers_still_produces_success_notice() {
        let bus = EventBus::new(BusConfig::new(HandlerRegistry::new()));

        let report = bus.publish(user_registered()).await.unwrap();

        assert_eq!(
            report,
            PublishReport {
                invocations: 0,
                swallowed_failures: 0,
                envelopes: 1,
            }
        );
    }

    #[tokio::test]
    async fn success_notice_follows_every_level() {
        let recorder = Arc::new(Recorder::default());
        let bus = bus_with(
            &[
                Capability::Handles(TypeKey::EVENT),
                Capability::Handles(TypeKey::new("UserRegistered")),
                Capability::Succeeded(TypeKey::ANY),
            ],
            recorder.clone(),
        );

        let report = bus.publish(user_registered()).await.unwrap();

        assert_eq!(
            recorder.calls(),
            vec![
                "Handles<Event>",
                "Handles<UserRegistered>",
                "Handles<HandlingSucceeded<Any>>",
            ]
        );
        assert_eq!(report.invocations, 3);
    }

    #[tokio::test]
    async fn swallowed_failure_skips_remaining_levels() {
        let recorder = Arc::new(Recorder::failing());
        let bus = bus_with(
            &[
                Capability::Handles(TypeKey::MESSAGE),
                Capability::Handles(TypeKey::new("UserRegistered")),
                Capability::Failed(TypeKey::new("UserRegistered")),
            ],
            recorder.clone(),
        );

        let report = bus.publish(user_registered()).await.unwrap();

        assert_eq!(
            recorder.calls(),
            vec!["Handles<Message>", "Handles<HandlingFailed<UserRegistered>>"]
        );
        assert_eq!(report.swallowed_failures, 1);
        assert_eq!(report.envelopes, 1);
    }

    #[tokio::test]
    async fn retryable_failure_propagates_without_notice() {
        let recorder = Arc::new(Recorder::failing());
        let registry = HandlerRegistry::new()
            .with(Capability::Handles(TypeKey::EVENT), recorder.clone())
            .with(Capability::Failed(TypeKey::EVENT), recorder.clone());
        let bus = EventBus::new(BusConfig::new(registry).with_retry_filter(crate::AlwaysRetry));

        let err = bus.publish(user_registered()).await.unwrap_err();

        assert!(matches!(
            err,
            BusError::Retryable { ref capability, .. }
                if *capability == Capability::Handles(TypeKey::EVENT)
        ));
        assert_eq!(recorder.calls(), vec!["Handles<Event>"]);
    }

    #[tokio::test]
    async fn commands_dispatch_over_command_chain() {
        let recorder = Arc::new(Recorder::default());
        let bus = bus_with(&[Capability::Handles(TypeKey::COMMAND)], recorder.clone());

        bus.publish(CommandEnvelope::new("RegisterUser", serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(recorder.calls(), vec!["Handles<Command>"]);
    }

    #[tokio::test]
    async fn publish_all_sums_reports() {
        let recorder = Arc::new(Recorder::default());
        let bus = bus_with(&[Capability::Handles(TypeKey::EVENT)], recorder.clone());

        let report = bus
            .publish_all(vec![user_registered(), user_registered()])
            .await
            .unwrap();

        assert_eq!(report.invocations, 2);
        assert_eq!(report.envelopes, 2);
    }
}
