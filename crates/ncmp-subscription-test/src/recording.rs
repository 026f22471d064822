//! Publisher that records instead of sending.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;

use ncmp_subscription_common::{EventEnvelope, EventPublisher, SubscriptionError, SubscriptionResult};

/// One recorded publish call
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub topic: String,
    pub key: String,
    pub envelope: EventEnvelope,
}

/// [`EventPublisher`] that keeps every successful publish in memory
///
/// Topics or destination plugins can be marked as failing; publishes to
/// them return a transport error and are not recorded.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<PublishedEvent>>,
    failing_topics: Mutex<HashSet<String>>,
    failing_destinations: Mutex<HashSet<String>>,
}

impl RecordingPublisher {
    /// Create a publisher with no failures configured
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to `topic` fail
    pub fn fail_topic(&self, topic: impl Into<String>) {
        self.failing_topics.lock().insert(topic.into());
    }

    /// Make every publish addressed to `plugin` fail
    pub fn fail_destination(&self, plugin: impl Into<String>) {
        self.failing_destinations.lock().insert(plugin.into());
    }

    /// Stop failing anything
    pub fn heal(&self) {
        self.failing_topics.lock().clear();
        self.failing_destinations.lock().clear();
    }

    /// All recorded events, oldest first
    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().clone()
    }

    /// Recorded events on `topic`
    pub fn events_on(&self, topic: &str) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.topic == topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        envelope: EventEnvelope,
    ) -> SubscriptionResult<()> {
        if self.failing_topics.lock().contains(topic) {
            return Err(SubscriptionError::transport(topic, "injected failure"));
        }
        if let Some(plugin) = &envelope.destination {
            if self.failing_destinations.lock().contains(plugin) {
                return Err(SubscriptionError::transport(
                    topic,
                    format!("injected failure for {}", plugin),
                ));
            }
        }

        self.events.lock().push(PublishedEvent {
            topic: topic.to_string(),
            key: key.to_string(),
            envelope,
        });
        Ok(())
    }
}
