//! In-process message bus.
//!
//! Each topic has at most one bounded channel. Publishing waits for room
//! when the channel is full and fails when nobody is subscribed.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use ncmp_subscription_common::{EventEnvelope, EventPublisher, SubscriptionError, SubscriptionResult};

/// A keyed envelope delivered on a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub key: String,
    pub envelope: EventEnvelope,
}

/// Topic → bounded channel bus implementing [`EventPublisher`].
#[derive(Debug)]
pub struct InMemoryBus {
    capacity: usize,
    topics: DashMap<String, mpsc::Sender<BusMessage>>,
}

impl InMemoryBus {
    /// Creates a bus whose topic channels hold `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: DashMap::new(),
        }
    }

    /// Subscribes to `topic`, replacing any previous subscriber.
    pub fn subscribe(&self, topic: impl Into<String>) -> mpsc::Receiver<BusMessage> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let topic = topic.into();
        if self.topics.insert(topic.clone(), tx).is_some() {
            debug!("Replaced subscriber on topic {}", topic);
        }
        rx
    }

    /// Returns true if `topic` has a live subscriber.
    pub fn has_subscriber(&self, topic: &str) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|sender| !sender.is_closed())
    }
}

#[async_trait]
impl EventPublisher for InMemoryBus {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        envelope: EventEnvelope,
    ) -> SubscriptionResult<()> {
        let sender = self
            .topics
            .get(topic)
            .map(|sender| sender.clone())
            .ok_or_else(|| SubscriptionError::transport(topic, "no subscriber"))?;

        let message = BusMessage {
            key: key.to_string(),
            envelope,
        };
        if sender.send(message).await.is_err() {
            self.topics.remove_if(topic, |_, sender| sender.is_closed());
            return Err(SubscriptionError::transport(topic, "subscriber dropped"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn envelope() -> EventEnvelope {
        EventEnvelope::new(
            "subscriptionCreateRequest",
            "schema",
            "sub-1",
            &serde_json::json!({}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_publish_delivers_to_subscriber() {
        let bus = InMemoryBus::new(4);
        let mut rx = bus.subscribe("subscription");
        let sent = envelope();

        bus.publish("subscription", "sub-1", sent.clone()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.key, "sub-1");
        assert_eq!(received.envelope, sent);
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_fails() {
        let bus = InMemoryBus::new(4);
        let err = bus.publish("nowhere", "k", envelope()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("nowhere"));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_forgotten() {
        let bus = InMemoryBus::new(4);
        drop(bus.subscribe("subscription"));
        assert!(!bus.has_subscriber("subscription"));

        assert!(bus.publish("subscription", "k", envelope()).await.is_err());
        assert!(bus.topics.is_empty());
    }
}
