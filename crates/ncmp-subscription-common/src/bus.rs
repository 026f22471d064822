//! Message bus publisher port.

use async_trait::async_trait;

use crate::error::SubscriptionResult;
use crate::events::EventEnvelope;

/// Publishes envelopes to a topic, keyed for partitioning.
///
/// Any message-bus client can satisfy this; the orchestrator never depends
/// on which one is behind it.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes `envelope` on `topic` with partition key `key`.
    async fn publish(&self, topic: &str, key: &str, envelope: EventEnvelope)
        -> SubscriptionResult<()>;
}
