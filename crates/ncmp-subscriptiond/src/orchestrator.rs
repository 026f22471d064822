//! Create/delete entry points and plugin reply handling.
//!
//! The orchestrator never waits for plugins. A request is checked against
//! the store, split per owning plugin, committed to the cache, given a
//! response timer and fanned out; the outcome reaches the client later as
//! a single aggregated response, either when the last plugin decides or
//! when the timer fires.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use ncmp_subscription_common::events::plugin_request_envelope;
use ncmp_subscription_common::{
    CreateSubscriptionRequest, DeleteSubscriptionRequest, EventPublisher, PluginName, PluginReply,
    PluginResolver, PluginSubscriptionDetails, PluginSubscriptionRequest, Predicate, ResponseKind,
    ScheduledTaskKey, SubscriptionCacheEntry, SubscriptionResult, SubscriptionStatus,
    SubscriptionStore,
};

use crate::aggregator::ResponseAggregator;
use crate::cache::SubscriptionCache;
use crate::dedup::Deduplicator;
use crate::scheduler::ResponseScheduler;

/// Collaborators the orchestrator is built from.
pub struct OrchestratorDeps {
    pub store: Arc<dyn SubscriptionStore>,
    pub resolver: Arc<dyn PluginResolver>,
    pub publisher: Arc<dyn EventPublisher>,
    pub cache: Arc<SubscriptionCache>,
    pub scheduler: ResponseScheduler,
}

/// Top-level CM subscription orchestrator.
pub struct SubscriptionOrchestrator {
    store: Arc<dyn SubscriptionStore>,
    resolver: Arc<dyn PluginResolver>,
    publisher: Arc<dyn EventPublisher>,
    cache: Arc<SubscriptionCache>,
    scheduler: ResponseScheduler,
    deduplicator: Deduplicator,
    plugin_topic: String,
}

impl SubscriptionOrchestrator {
    /// Creates an orchestrator that sends plugin requests on `plugin_topic`.
    pub fn new(deps: OrchestratorDeps, plugin_topic: impl Into<String>) -> Self {
        Self {
            deduplicator: Deduplicator::new(Arc::clone(&deps.store)),
            store: deps.store,
            resolver: deps.resolver,
            publisher: deps.publisher,
            cache: deps.cache,
            scheduler: deps.scheduler,
            plugin_topic: plugin_topic.into(),
        }
    }

    /// Returns the response scheduler.
    pub fn scheduler(&self) -> &ResponseScheduler {
        &self.scheduler
    }

    /// Returns the working-state cache.
    pub fn cache(&self) -> &Arc<SubscriptionCache> {
        &self.cache
    }

    /// Handles a client create request.
    ///
    /// Store failures are returned before the cache, the timer or any plugin
    /// is touched. A duplicate subscription id is not an error: it is
    /// answered with a REJECTED response listing the requested xpaths.
    #[instrument(skip(self, request), fields(subscription_id = %request.subscription_id))]
    pub async fn process_create_request(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> SubscriptionResult<()> {
        let subscription_id = request.subscription_id.as_str();

        if !self.store.is_unique_subscription_id(subscription_id).await? {
            warn!("Subscription id {} is already in use, rejecting", subscription_id);
            let response =
                ResponseAggregator::rejected_response_for(subscription_id, &request.predicates);
            self.scheduler
                .publish_immediately(ResponseKind::Create, &response)
                .await;
            return Ok(());
        }

        let mut entry =
            SubscriptionCache::partition_by_plugin(&request.predicates, self.resolver.as_ref());

        let mut new_work: Vec<(PluginName, Vec<Predicate>)> = Vec::new();
        let mut covered: Vec<PluginName> = Vec::new();
        for (plugin, details) in &entry {
            let reduced = self.deduplicator.reduce(&details.predicates).await?;
            if reduced.is_empty() {
                covered.push(plugin.clone());
            } else {
                new_work.push((plugin.clone(), reduced));
            }
        }

        for plugin in covered {
            if let Some(details) = entry.get_mut(&plugin) {
                let status = self
                    .persist_accepted(ResponseKind::Create, subscription_id, &plugin, details)
                    .await;
                details.status = status;
                info!("{} already covered by existing subscriptions", plugin);
            }
        }

        self.commit_and_fan_out(ResponseKind::Create, subscription_id, entry, new_work)
            .await;
        Ok(())
    }

    /// Handles a client delete request.
    ///
    /// Deletes are forwarded to every owning plugin without consulting the
    /// store.
    #[instrument(skip(self, request), fields(subscription_id = %request.subscription_id))]
    pub async fn process_delete_request(
        &self,
        request: &DeleteSubscriptionRequest,
    ) -> SubscriptionResult<()> {
        let subscription_id = request.subscription_id.as_str();
        let entry =
            SubscriptionCache::partition_by_plugin(&request.predicates, self.resolver.as_ref());
        let work = entry
            .iter()
            .map(|(plugin, details)| (plugin.clone(), details.predicates.clone()))
            .collect();

        self.commit_and_fan_out(ResponseKind::Delete, subscription_id, entry, work)
            .await;
        Ok(())
    }

    /// Applies one plugin's decision.
    ///
    /// The reply's kind selects the create or delete entry it answers.
    /// Replies for entries or plugins that are no longer cached are ignored,
    /// as are repeated replies from a plugin that has already decided. The
    /// reply that leaves no plugin PENDING publishes the aggregated response,
    /// unless the timer got there first.
    #[instrument(
        skip(self, reply),
        fields(subscription_id = %reply.subscription_id, plugin = %reply.plugin_name)
    )]
    pub async fn process_plugin_reply(&self, reply: &PluginReply) -> SubscriptionResult<()> {
        let subscription_id = reply.subscription_id.as_str();
        let plugin = reply.plugin_name.as_str();
        let key = ScheduledTaskKey::new(subscription_id, reply.kind);

        let Some(details) = self.cache.plugin_details(&key, plugin) else {
            warn!(
                "Ignoring {:?} from {} for {}: not awaiting a reply",
                reply.decision, plugin, key
            );
            return Ok(());
        };
        if details.status.is_decided() {
            warn!(
                "Ignoring {:?} from {} for {}: already {:?}",
                reply.decision, plugin, key, details.status
            );
            return Ok(());
        }

        let status = match SubscriptionStatus::from(reply.decision) {
            SubscriptionStatus::Accepted => {
                self.persist_accepted(reply.kind, subscription_id, plugin, &details)
                    .await
            }
            other => other,
        };

        let Some(snapshot) = self.cache.update_status(&key, plugin, status) else {
            debug!("{} evicted or decided while applying reply from {}", key, plugin);
            return Ok(());
        };

        if all_decided(&snapshot) {
            let response = ResponseAggregator::aggregate(subscription_id, &snapshot);
            self.scheduler.publish_now(&key, Some(response)).await;
        } else {
            debug!("{} still waiting on other plugins", subscription_id);
        }
        Ok(())
    }

    /// Commits the entry, arms the timer and sends one request per plugin.
    async fn commit_and_fan_out(
        &self,
        kind: ResponseKind,
        subscription_id: &str,
        entry: SubscriptionCacheEntry,
        work: Vec<(PluginName, Vec<Predicate>)>,
    ) {
        let decided_up_front = all_decided(&entry);
        let key = ScheduledTaskKey::new(subscription_id, kind);
        self.cache.insert(key.clone(), entry);
        self.scheduler.request_deferred_publish(key.clone());

        for (plugin, predicates) in work {
            self.send_plugin_request(kind, subscription_id, &plugin, predicates)
                .await;
        }

        if decided_up_front {
            if let Some(snapshot) = self.cache.get(&key) {
                let response = ResponseAggregator::aggregate(subscription_id, &snapshot);
                self.scheduler.publish_now(&key, Some(response)).await;
            }
        }
    }

    async fn send_plugin_request(
        &self,
        kind: ResponseKind,
        subscription_id: &str,
        plugin: &str,
        predicates: Vec<Predicate>,
    ) {
        let request = PluginSubscriptionRequest {
            subscription_id: subscription_id.to_string(),
            kind,
            predicates,
        };

        let result = match plugin_request_envelope(plugin, &request) {
            Ok(envelope) => {
                self.publisher
                    .publish(&self.plugin_topic, subscription_id, envelope)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => debug!("Sent {} to {}", kind.request_event_type(), plugin),
            Err(e) => error!(
                "Failed to send {} to {}, leaving it pending: {}",
                kind.request_event_type(),
                plugin,
                e
            ),
        }
    }

    /// Records (create) or removes (delete) a plugin's triples in the store.
    ///
    /// Returns ACCEPTED on success and REJECTED if the store failed.
    async fn persist_accepted(
        &self,
        kind: ResponseKind,
        subscription_id: &str,
        plugin: &str,
        details: &PluginSubscriptionDetails,
    ) -> SubscriptionStatus {
        match self.apply_to_store(kind, subscription_id, details).await {
            Ok(()) => SubscriptionStatus::Accepted,
            Err(e) => {
                error!(
                    "Failed to persist {} for {} ({}), marking rejected: {}",
                    kind.discriminator(),
                    subscription_id,
                    plugin,
                    e
                );
                SubscriptionStatus::Rejected
            }
        }
    }

    async fn apply_to_store(
        &self,
        kind: ResponseKind,
        subscription_id: &str,
        details: &PluginSubscriptionDetails,
    ) -> SubscriptionResult<()> {
        for predicate in &details.predicates {
            for (handle, xpath) in predicate.pairs() {
                match kind {
                    ResponseKind::Create => {
                        self.store
                            .record_accepted(predicate.datastore_type, handle, xpath, subscription_id)
                            .await?
                    }
                    ResponseKind::Delete => {
                        self.store
                            .remove_subscription(
                                predicate.datastore_type,
                                handle,
                                xpath,
                                subscription_id,
                            )
                            .await?
                    }
                }
            }
        }
        Ok(())
    }
}

fn all_decided(entry: &SubscriptionCacheEntry) -> bool {
    entry.values().all(|details| details.status.is_decided())
}
