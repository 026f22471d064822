//! Per-subscription working state for the scatter-gather window.
//!
//! Entries are created when a request is accepted for processing, mutated
//! by plugin replies and evicted once the aggregated response is published.
//! All mutations of one request's entry go through the map's per-key
//! lock, so the request path and the reply path never interleave on it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ncmp_subscription_common::{
    PluginName, PluginResolver, PluginSubscriptionDetails, Predicate, ScheduledTaskKey,
    SubscriptionCacheEntry, SubscriptionStatus,
};

#[derive(Debug, Clone)]
struct CachedEntry {
    plugins: SubscriptionCacheEntry,
    inserted_at: Instant,
}

/// TTL-bounded map of (subscription id, kind) → per-plugin details.
///
/// A create and a delete for the same subscription id are separate
/// entries, each answered and evicted on its own.
#[derive(Debug)]
pub struct SubscriptionCache {
    entries: DashMap<ScheduledTaskKey, CachedEntry>,
    ttl: Duration,
}

impl SubscriptionCache {
    /// Creates an empty cache whose entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Splits predicates by owning plugin into PENDING details.
    ///
    /// Each predicate contributes one predicate per plugin, restricted to
    /// the handles that plugin owns. Handles the resolver does not know are
    /// skipped, and predicates without handles contribute nothing.
    pub fn partition_by_plugin(
        predicates: &[Predicate],
        resolver: &dyn PluginResolver,
    ) -> SubscriptionCacheEntry {
        let mut entry = SubscriptionCacheEntry::new();

        for predicate in predicates.iter().filter(|p| p.is_actionable()) {
            let mut handles_by_plugin: BTreeMap<PluginName, Vec<&String>> = BTreeMap::new();
            for handle in &predicate.target_cm_handle_ids {
                match resolver.resolve_plugin(handle) {
                    Some(plugin) => handles_by_plugin.entry(plugin).or_default().push(handle),
                    None => warn!("No DMI plugin owns CM handle {}, skipping", handle),
                }
            }

            for (plugin, handles) in handles_by_plugin {
                entry
                    .entry(plugin)
                    .or_insert_with(|| PluginSubscriptionDetails::pending(Vec::new()))
                    .predicates
                    .push(Predicate::new(
                        predicate.datastore_type,
                        handles.into_iter().cloned(),
                        predicate.xpaths.iter().cloned(),
                    ));
            }
        }

        entry
    }

    /// Stores (or replaces) the entry for a request.
    pub fn insert(&self, key: ScheduledTaskKey, plugins: SubscriptionCacheEntry) {
        let replaced = self
            .entries
            .insert(
                key.clone(),
                CachedEntry {
                    plugins,
                    inserted_at: Instant::now(),
                },
            )
            .is_some();
        if replaced {
            warn!("Replaced in-flight cache entry for {}", key);
        }
    }

    /// Returns a snapshot of a request's entry.
    pub fn get(&self, key: &ScheduledTaskKey) -> Option<SubscriptionCacheEntry> {
        self.entries.get(key).map(|cached| cached.plugins.clone())
    }

    /// Returns a snapshot of one plugin's details.
    pub fn plugin_details(
        &self,
        key: &ScheduledTaskKey,
        plugin: &str,
    ) -> Option<PluginSubscriptionDetails> {
        self.entries
            .get(key)
            .and_then(|cached| cached.plugins.get(plugin).cloned())
    }

    /// Moves one plugin out of PENDING and returns the updated entry.
    ///
    /// Returns `None` if the request or plugin is not cached, or if the
    /// plugin has already decided. A decided plugin keeps its status.
    pub fn update_status(
        &self,
        key: &ScheduledTaskKey,
        plugin: &str,
        status: SubscriptionStatus,
    ) -> Option<SubscriptionCacheEntry> {
        let mut cached = self.entries.get_mut(key)?;
        let details = cached.plugins.get_mut(plugin)?;
        if details.status.is_decided() {
            warn!(
                "{} for {} already {:?}, ignoring {:?}",
                plugin, key, details.status, status
            );
            return None;
        }
        debug!("{} status for {}: {:?} -> {:?}", key, plugin, details.status, status);
        details.status = status;
        Some(cached.plugins.clone())
    }

    /// Returns true if the request has an entry.
    pub fn contains(&self, key: &ScheduledTaskKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Evicts a request's entry.
    pub fn remove(&self, key: &ScheduledTaskKey) -> Option<SubscriptionCacheEntry> {
        self.entries.remove(key).map(|(_, cached)| cached.plugins)
    }

    /// Returns the number of cached requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts entries older than the TTL and returns how many were evicted.
    pub fn sweep_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|key, cached| {
            let keep = cached.inserted_at.elapsed() < ttl;
            if !keep {
                warn!("Evicting expired cache entry for {}", key);
            }
            keep
        });
        before.saturating_sub(self.entries.len())
    }

    /// Runs [`Self::sweep_expired`] every `interval` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = self.sweep_expired();
                        if evicted > 0 {
                            info!("Cache sweep evicted {} entries", evicted);
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ncmp_subscription_common::{DatastoreType, ResponseKind, StaticPluginResolver};
    use pretty_assertions::assert_eq;

    const RUNNING: DatastoreType = DatastoreType::PassthroughRunning;

    fn resolver() -> StaticPluginResolver {
        StaticPluginResolver::new()
            .with_handle("h1", "dmi-a")
            .with_handle("h2", "dmi-b")
            .with_handle("h3", "dmi-a")
    }

    fn entry(statuses: &[(&str, SubscriptionStatus)]) -> SubscriptionCacheEntry {
        statuses
            .iter()
            .map(|(plugin, status)| {
                (
                    plugin.to_string(),
                    PluginSubscriptionDetails {
                        predicates: vec![Predicate::new(RUNNING, ["h1"], ["/a"])],
                        status: *status,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_partition_by_plugin() {
        let predicates = vec![
            Predicate::new(RUNNING, ["h1", "h2", "h3"], ["/a"]),
            Predicate::new(DatastoreType::PassthroughOperational, ["h2"], ["/b"]),
        ];

        let entry = SubscriptionCache::partition_by_plugin(&predicates, &resolver());

        assert_eq!(entry.len(), 2);
        assert_eq!(
            entry["dmi-a"],
            PluginSubscriptionDetails::pending(vec![Predicate::new(RUNNING, ["h1", "h3"], ["/a"])])
        );
        assert_eq!(
            entry["dmi-b"].predicates,
            vec![
                Predicate::new(RUNNING, ["h2"], ["/a"]),
                Predicate::new(DatastoreType::PassthroughOperational, ["h2"], ["/b"]),
            ]
        );
    }

    #[test]
    fn test_partition_skips_unknown_handles_and_empty_predicates() {
        let predicates = vec![
            Predicate::new(RUNNING, ["unknown"], ["/a"]),
            Predicate::new(RUNNING, Vec::<String>::new(), ["/a"]),
        ];

        assert!(SubscriptionCache::partition_by_plugin(&predicates, &resolver()).is_empty());
    }

    fn create(subscription_id: &str) -> ScheduledTaskKey {
        ScheduledTaskKey::new(subscription_id, ResponseKind::Create)
    }

    #[tokio::test]
    async fn test_update_status_returns_snapshot() {
        let cache = SubscriptionCache::new(Duration::from_secs(60));
        cache.insert(
            create("sub-1"),
            entry(&[
                ("dmi-a", SubscriptionStatus::Pending),
                ("dmi-b", SubscriptionStatus::Pending),
            ]),
        );

        let snapshot = cache
            .update_status(&create("sub-1"), "dmi-a", SubscriptionStatus::Accepted)
            .unwrap();
        assert_eq!(snapshot["dmi-a"].status, SubscriptionStatus::Accepted);
        assert_eq!(snapshot["dmi-b"].status, SubscriptionStatus::Pending);

        let snapshot = cache
            .update_status(&create("sub-1"), "dmi-b", SubscriptionStatus::Rejected)
            .unwrap();
        assert!(snapshot.values().all(|details| details.status.is_decided()));
    }

    #[tokio::test]
    async fn test_update_status_keeps_first_decision() {
        let cache = SubscriptionCache::new(Duration::from_secs(60));
        cache.insert(create("sub-1"), entry(&[("dmi-a", SubscriptionStatus::Pending)]));
        cache.update_status(&create("sub-1"), "dmi-a", SubscriptionStatus::Accepted);

        assert!(cache
            .update_status(&create("sub-1"), "dmi-a", SubscriptionStatus::Rejected)
            .is_none());
        assert_eq!(
            cache.plugin_details(&create("sub-1"), "dmi-a").unwrap().status,
            SubscriptionStatus::Accepted
        );
    }

    #[tokio::test]
    async fn test_update_status_never_creates_entries() {
        let cache = SubscriptionCache::new(Duration::from_secs(60));
        assert!(cache
            .update_status(&create("missing"), "dmi-a", SubscriptionStatus::Accepted)
            .is_none());
        assert!(cache.is_empty());

        cache.insert(create("sub-1"), entry(&[("dmi-a", SubscriptionStatus::Pending)]));
        assert!(cache
            .update_status(&create("sub-1"), "dmi-z", SubscriptionStatus::Accepted)
            .is_none());
        assert_eq!(cache.get(&create("sub-1")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_and_delete_entries_are_separate() {
        let cache = SubscriptionCache::new(Duration::from_secs(60));
        let delete = ScheduledTaskKey::new("sub-1", ResponseKind::Delete);
        cache.insert(create("sub-1"), entry(&[("dmi-a", SubscriptionStatus::Pending)]));
        cache.insert(delete.clone(), entry(&[("dmi-a", SubscriptionStatus::Pending)]));
        assert_eq!(cache.len(), 2);

        cache.update_status(&delete, "dmi-a", SubscriptionStatus::Accepted);
        assert_eq!(
            cache.plugin_details(&create("sub-1"), "dmi-a").unwrap().status,
            SubscriptionStatus::Pending
        );

        cache.remove(&delete);
        assert!(cache.contains(&create("sub-1")));
    }

    #[tokio::test]
    async fn test_remove() {
        let cache = SubscriptionCache::new(Duration::from_secs(60));
        cache.insert(create("sub-1"), entry(&[("dmi-a", SubscriptionStatus::Pending)]));

        assert!(cache.remove(&create("sub-1")).is_some());
        assert!(!cache.contains(&create("sub-1")));
        assert!(cache.remove(&create("sub-1")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expired() {
        let cache = SubscriptionCache::new(Duration::from_secs(10));
        cache.insert(create("old"), entry(&[("dmi-a", SubscriptionStatus::Pending)]));
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.insert(create("new"), entry(&[("dmi-a", SubscriptionStatus::Pending)]));
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.sweep_expired(), 1);
        assert!(!cache.contains(&create("old")));
        assert!(cache.contains(&create("new")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_until_cancelled() {
        let cache = Arc::new(SubscriptionCache::new(Duration::from_secs(1)));
        cache.insert(create("sub-1"), entry(&[("dmi-a", SubscriptionStatus::Pending)]));
        let shutdown = CancellationToken::new();
        let handle = Arc::clone(&cache).spawn_sweeper(Duration::from_millis(500), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(cache.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
