//! Deferred publication of aggregated responses.
//!
//! At most one timer is live per [`ScheduledTaskKey`]. The registry entry is
//! the claim: whichever path removes it first (the firing timer or an
//! on-demand publish) aggregates, publishes and evicts; the other path finds
//! nothing to remove and returns without side effects.
//!
//! ```text
//! absent --request_deferred_publish--> armed --timer fires--> absent
//!                                        |
//!                                        +----publish_now---> absent
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use ncmp_subscription_common::events::client_response_envelope;
use ncmp_subscription_common::{
    AggregatedSubscriptionResponse, EventPublisher, ResponseKind, ScheduledTaskKey,
};

use crate::aggregator::ResponseAggregator;
use crate::cache::SubscriptionCache;

#[derive(Debug)]
struct ArmedTask {
    generation: u64,
    abort: AbortHandle,
}

struct Inner {
    timeout: Duration,
    registry: DashMap<ScheduledTaskKey, ArmedTask>,
    next_generation: AtomicU64,
    cache: Arc<SubscriptionCache>,
    publisher: Arc<dyn EventPublisher>,
    response_topic: String,
}

/// Owns the per-key response timers.
#[derive(Clone)]
pub struct ResponseScheduler {
    inner: Arc<Inner>,
}

impl ResponseScheduler {
    /// Creates a scheduler publishing client responses on `response_topic`.
    pub fn new(
        timeout: Duration,
        cache: Arc<SubscriptionCache>,
        publisher: Arc<dyn EventPublisher>,
        response_topic: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                timeout,
                registry: DashMap::new(),
                next_generation: AtomicU64::new(0),
                cache,
                publisher,
                response_topic: response_topic.into(),
            }),
        }
    }

    /// Returns the configured response timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Arms the timer for `key` unless one is already armed.
    ///
    /// Returns true if a new timer was armed. Must be called from within a
    /// tokio runtime.
    pub fn request_deferred_publish(&self, key: ScheduledTaskKey) -> bool {
        match self.inner.registry.entry(key) {
            Entry::Occupied(occupied) => {
                debug!("Response timer for {} already armed", occupied.key());
                false
            }
            Entry::Vacant(vacant) => {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let inner = Arc::clone(&self.inner);
                let key = vacant.key().clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(inner.timeout).await;
                    inner.on_timeout(key, generation).await;
                });
                debug!(
                    "Armed response timer for {} ({:?})",
                    vacant.key(),
                    self.inner.timeout
                );
                vacant.insert(ArmedTask {
                    generation,
                    abort: task.abort_handle(),
                });
                true
            }
        }
    }

    /// Claims `key`, cancelling its timer, and publishes `response` if given.
    ///
    /// Returns false if nothing was armed for `key`: the timer already fired
    /// or another caller claimed it first. In that case nothing is published
    /// and the cache is left alone. With `response` set to `None` the timer
    /// is only cancelled.
    pub async fn publish_now(
        &self,
        key: &ScheduledTaskKey,
        response: Option<AggregatedSubscriptionResponse>,
    ) -> bool {
        let Some((_, task)) = self.inner.registry.remove(key) else {
            debug!("Response for {} already handled", key);
            return false;
        };
        task.abort.abort();

        if let Some(response) = response {
            self.inner.publish_response(key.kind, &response).await;
            self.inner.cache.remove(key);
            info!("Published {} before timeout", key);
        } else {
            debug!("Cancelled response timer for {}", key);
        }
        true
    }

    /// Publishes a response without involving the timer registry or cache.
    pub async fn publish_immediately(
        &self,
        kind: ResponseKind,
        response: &AggregatedSubscriptionResponse,
    ) {
        self.inner.publish_response(kind, response).await;
    }

    /// Returns true if a timer is armed for `key`.
    pub fn is_armed(&self, key: &ScheduledTaskKey) -> bool {
        self.inner.registry.contains_key(key)
    }

    /// Returns the number of armed timers.
    pub fn armed_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Cancels every armed timer without publishing.
    pub fn cancel_all(&self) {
        let count = self.inner.registry.len();
        self.inner.registry.retain(|_, task| {
            task.abort.abort();
            false
        });
        if count > 0 {
            warn!("Cancelled {} armed response timers", count);
        }
    }
}

impl Inner {
    async fn on_timeout(&self, key: ScheduledTaskKey, generation: u64) {
        let claimed = self
            .registry
            .remove_if(&key, |_, task| task.generation == generation)
            .is_some();
        if !claimed {
            debug!("Response timer for {} lost the claim", key);
            return;
        }

        let entry = match self.cache.get(&key) {
            Some(entry) => entry,
            None => {
                warn!("No cache entry for {} at timeout", key);
                Default::default()
            }
        };
        let response = ResponseAggregator::aggregate(&key.subscription_id, &entry);
        if !response.pending_targets.is_empty() {
            warn!(
                "Publishing {} with {} targets still pending",
                key,
                response.pending_targets.len()
            );
        }
        self.publish_response(key.kind, &response).await;
        self.cache.remove(&key);
        info!("Published {} on timeout", key);
    }

    async fn publish_response(&self, kind: ResponseKind, response: &AggregatedSubscriptionResponse) {
        let envelope = match client_response_envelope(kind, response) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(
                    "Failed to build {} for {}: {}",
                    kind.response_event_type(),
                    response.subscription_id,
                    e
                );
                return;
            }
        };

        if let Err(e) = self
            .publisher
            .publish(&self.response_topic, &response.subscription_id, envelope)
            .await
        {
            error!(
                "Failed to publish {} for {}: {}",
                kind.response_event_type(),
                response.subscription_id,
                e
            );
        }
    }
}
