//! Removes work already covered by existing subscriptions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use ncmp_subscription_common::{Predicate, SubscriptionResult, SubscriptionStore};

/// Strips (handle, xpath) pairs the store reports as already subscribed.
///
/// The store is the only oracle; nothing is written.
#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn SubscriptionStore>,
}

impl Deduplicator {
    /// Creates a deduplicator over `store`.
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Returns the predicates describing only the pairs that are not ongoing.
    ///
    /// Surviving pairs are regrouped per input predicate: handles that kept
    /// the same set of xpaths share one output predicate, so the output
    /// covers exactly the input pairs minus the ongoing ones. Predicates
    /// left with no handles are dropped. Input order is preserved.
    pub async fn reduce(&self, predicates: &[Predicate]) -> SubscriptionResult<Vec<Predicate>> {
        let mut reduced = Vec::with_capacity(predicates.len());

        for predicate in predicates {
            let mut surviving: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
            for (handle, xpath) in predicate.pairs() {
                if self
                    .store
                    .is_ongoing(predicate.datastore_type, handle, xpath)
                    .await?
                {
                    debug!(
                        "Dropping ongoing {}/{}/{}",
                        predicate.datastore_type, handle, xpath
                    );
                    continue;
                }
                surviving
                    .entry(handle)
                    .or_default()
                    .insert(xpath.to_string());
            }

            let mut handles_by_xpaths: BTreeMap<BTreeSet<String>, BTreeSet<String>> =
                BTreeMap::new();
            for (handle, xpaths) in surviving {
                handles_by_xpaths
                    .entry(xpaths)
                    .or_default()
                    .insert(handle.to_string());
            }

            reduced.extend(
                handles_by_xpaths
                    .into_iter()
                    .map(|(xpaths, handles)| Predicate {
                        datastore_type: predicate.datastore_type,
                        target_cm_handle_ids: handles,
                        xpaths,
                    })
                    .filter(Predicate::is_actionable),
            );
        }

        Ok(reduced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ncmp_subscription_common::{DatastoreType, InMemorySubscriptionStore};
    use pretty_assertions::assert_eq;

    const RUNNING: DatastoreType = DatastoreType::PassthroughRunning;
    const OPERATIONAL: DatastoreType = DatastoreType::PassthroughOperational;

    async fn store_with(ongoing: &[(DatastoreType, &str, &str)]) -> Arc<InMemorySubscriptionStore> {
        let store = Arc::new(InMemorySubscriptionStore::new());
        for (datastore, handle, xpath) in ongoing {
            store
                .record_accepted(*datastore, handle, xpath, "existing")
                .await
                .unwrap();
        }
        store
    }

    fn pairs(predicates: &[Predicate]) -> BTreeSet<(DatastoreType, String, String)> {
        predicates
            .iter()
            .flat_map(|p| {
                p.pairs()
                    .map(move |(h, x)| (p.datastore_type, h.to_string(), x.to_string()))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_nothing_ongoing_keeps_predicates() {
        let dedup = Deduplicator::new(store_with(&[]).await);
        let input = vec![Predicate::new(RUNNING, ["h1", "h2"], ["/a", "/b"])];

        assert_eq!(dedup.reduce(&input).await.unwrap(), input);
    }

    #[tokio::test]
    async fn test_fully_ongoing_predicate_is_dropped() {
        let dedup = Deduplicator::new(store_with(&[(RUNNING, "h1", "/a")]).await);
        let input = vec![Predicate::new(RUNNING, ["h1"], ["/a"])];

        assert!(dedup.reduce(&input).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ongoing_handle_is_removed() {
        let dedup = Deduplicator::new(store_with(&[(RUNNING, "h1", "/a")]).await);
        let input = vec![Predicate::new(RUNNING, ["h1", "h2"], ["/a"])];

        assert_eq!(
            dedup.reduce(&input).await.unwrap(),
            vec![Predicate::new(RUNNING, ["h2"], ["/a"])]
        );
    }

    #[tokio::test]
    async fn test_datastore_is_part_of_the_match() {
        let dedup = Deduplicator::new(store_with(&[(OPERATIONAL, "h1", "/a")]).await);
        let input = vec![Predicate::new(RUNNING, ["h1"], ["/a"])];

        assert_eq!(dedup.reduce(&input).await.unwrap(), input);
    }

    #[tokio::test]
    async fn test_result_is_exact_pair_difference() {
        let ongoing = [(RUNNING, "h1", "/a"), (RUNNING, "h2", "/b")];
        let dedup = Deduplicator::new(store_with(&ongoing).await);
        let input = vec![Predicate::new(RUNNING, ["h1", "h2", "h3"], ["/a", "/b"])];

        let reduced = dedup.reduce(&input).await.unwrap();

        let mut expected = pairs(&input);
        for (datastore, handle, xpath) in ongoing {
            expected.remove(&(datastore, handle.to_string(), xpath.to_string()));
        }
        assert_eq!(pairs(&reduced), expected);
        assert!(reduced.iter().all(Predicate::is_actionable));
    }

    #[tokio::test]
    async fn test_input_order_is_preserved() {
        let dedup = Deduplicator::new(store_with(&[(RUNNING, "h9", "/z")]).await);
        let input = vec![
            Predicate::new(OPERATIONAL, ["h5"], ["/x"]),
            Predicate::new(RUNNING, ["h1"], ["/a"]),
            Predicate::new(RUNNING, ["h9"], ["/z"]),
            Predicate::new(OPERATIONAL, ["h2"], ["/b"]),
        ];

        let reduced = dedup.reduce(&input).await.unwrap();
        assert_eq!(
            reduced,
            vec![input[0].clone(), input[1].clone(), input[3].clone()]
        );
    }
}
