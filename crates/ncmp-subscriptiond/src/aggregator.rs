//! Builds the client-facing outcome of a create or delete request.

use ncmp_subscription_common::{
    AggregatedSubscriptionResponse, Predicate, SubscriptionCacheEntry, SubscriptionStatus,
};

/// Partitions cached targets into accepted, pending and rejected sets.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseAggregator;

impl ResponseAggregator {
    /// Aggregates a cache entry.
    ///
    /// Plugins that never replied are still PENDING here and are reported as
    /// pending, never dropped.
    pub fn aggregate(
        subscription_id: &str,
        entry: &SubscriptionCacheEntry,
    ) -> AggregatedSubscriptionResponse {
        let mut response = AggregatedSubscriptionResponse {
            subscription_id: subscription_id.to_string(),
            ..Default::default()
        };

        for details in entry.values() {
            let targets = match details.status {
                SubscriptionStatus::Accepted => &mut response.accepted_targets,
                SubscriptionStatus::Pending => &mut response.pending_targets,
                SubscriptionStatus::Rejected => &mut response.rejected_targets,
            };
            targets.extend(details.target_cm_handle_ids().cloned());
        }

        response
    }

    /// Builds a rejection listing every xpath the request asked for.
    ///
    /// Only used when a request is refused up front; the cache is not read.
    pub fn rejected_response_for(
        subscription_id: &str,
        predicates: &[Predicate],
    ) -> AggregatedSubscriptionResponse {
        AggregatedSubscriptionResponse {
            subscription_id: subscription_id.to_string(),
            rejected_targets: predicates
                .iter()
                .flat_map(|predicate| predicate.xpaths.iter().cloned())
                .collect(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ncmp_subscription_common::{DatastoreType, PluginSubscriptionDetails};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn details(handles: &[&str], status: SubscriptionStatus) -> PluginSubscriptionDetails {
        PluginSubscriptionDetails {
            predicates: vec![Predicate::new(
                DatastoreType::PassthroughRunning,
                handles.iter().copied(),
                ["/a"],
            )],
            status,
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_aggregate_accepted_and_pending() {
        let entry: SubscriptionCacheEntry = [
            ("pluginA".to_string(), details(&["h1", "h2"], SubscriptionStatus::Accepted)),
            ("pluginB".to_string(), details(&["h3"], SubscriptionStatus::Pending)),
        ]
        .into();

        let response = ResponseAggregator::aggregate("sub-1", &entry);

        assert_eq!(response.subscription_id, "sub-1");
        assert_eq!(response.accepted_targets, set(&["h1", "h2"]));
        assert_eq!(response.pending_targets, set(&["h3"]));
        assert!(response.rejected_targets.is_empty());
    }

    #[test]
    fn test_aggregate_rejected() {
        let entry: SubscriptionCacheEntry = [
            ("pluginA".to_string(), details(&["h1"], SubscriptionStatus::Rejected)),
            ("pluginB".to_string(), details(&["h2"], SubscriptionStatus::Accepted)),
        ]
        .into();

        let response = ResponseAggregator::aggregate("sub-1", &entry);

        assert_eq!(response.rejected_targets, set(&["h1"]));
        assert_eq!(response.accepted_targets, set(&["h2"]));
        assert!(response.pending_targets.is_empty());
    }

    #[test]
    fn test_aggregate_empty_entry() {
        let response = ResponseAggregator::aggregate("sub-1", &SubscriptionCacheEntry::new());
        assert_eq!(
            response,
            AggregatedSubscriptionResponse {
                subscription_id: "sub-1".to_string(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_rejected_response_lists_xpaths() {
        let predicates = vec![
            Predicate::new(DatastoreType::PassthroughRunning, ["h1"], ["/a", "/b"]),
            Predicate::new(DatastoreType::PassthroughOperational, ["h2"], ["/b", "/c"]),
        ];

        let response = ResponseAggregator::rejected_response_for("sub-1", &predicates);

        assert_eq!(response.rejected_targets, set(&["/a", "/b", "/c"]));
        assert!(response.accepted_targets.is_empty());
        assert!(response.pending_targets.is_empty());
    }
}
