//! Core data model for CM subscriptions.
//!
//! These types describe what a client asked to be notified about
//! ([`Predicate`]), how that work is split across the DMI plugins that own
//! the targeted CM handles ([`PluginSubscriptionDetails`]), and how the
//! pending response for a request is identified ([`ScheduledTaskKey`]).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Client-supplied subscription identifier.
pub type SubscriptionId = String;

/// Name of the DMI plugin instance that owns a CM handle.
pub type PluginName = String;

/// Working state for one subscription: the details tracked per owning plugin.
///
/// A `BTreeMap` keeps plugin iteration order stable, which keeps outbound
/// fan-out and aggregated responses deterministic.
pub type SubscriptionCacheEntry = BTreeMap<PluginName, PluginSubscriptionDetails>;

/// Configuration view a predicate applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatastoreType {
    /// Running configuration, read through the DMI plugin.
    #[serde(rename = "ncmp-datastore:passthrough-running")]
    PassthroughRunning,
    /// Operational state, read through the DMI plugin.
    #[serde(rename = "ncmp-datastore:passthrough-operational")]
    PassthroughOperational,
}

impl DatastoreType {
    /// Returns the datastore name as used on the wire and in the store.
    pub fn name(&self) -> &'static str {
        match self {
            DatastoreType::PassthroughRunning => "ncmp-datastore:passthrough-running",
            DatastoreType::PassthroughOperational => "ncmp-datastore:passthrough-operational",
        }
    }

    /// Parses a datastore name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ncmp-datastore:passthrough-running" => Some(DatastoreType::PassthroughRunning),
            "ncmp-datastore:passthrough-operational" => {
                Some(DatastoreType::PassthroughOperational)
            }
            _ => None,
        }
    }
}

impl fmt::Display for DatastoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A (datastore, handles, xpaths) tuple describing requested notifications.
///
/// A predicate with no target CM handles carries no work and is never
/// forwarded to a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    /// Datastore the xpaths are evaluated against.
    pub datastore_type: DatastoreType,
    /// CM handles the subscription targets.
    pub target_cm_handle_ids: BTreeSet<String>,
    /// Xpath filters within each CM handle.
    pub xpaths: BTreeSet<String>,
}

impl Predicate {
    /// Creates a predicate from any iterables of handle ids and xpaths.
    pub fn new<H, X>(datastore_type: DatastoreType, handles: H, xpaths: X) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        X: IntoIterator,
        X::Item: Into<String>,
    {
        Self {
            datastore_type,
            target_cm_handle_ids: handles.into_iter().map(Into::into).collect(),
            xpaths: xpaths.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if the predicate targets at least one CM handle.
    pub fn is_actionable(&self) -> bool {
        !self.target_cm_handle_ids.is_empty()
    }

    /// Iterates every (handle, xpath) pair the predicate covers.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.target_cm_handle_ids.iter().flat_map(move |handle| {
            self.xpaths
                .iter()
                .map(move |xpath| (handle.as_str(), xpath.as_str()))
        })
    }
}

/// Per-plugin decision state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    /// Sent (or about to be sent) to the plugin, no decision yet.
    #[default]
    Pending,
    /// The plugin applied the subscription.
    Accepted,
    /// The plugin refused the subscription.
    Rejected,
}

impl SubscriptionStatus {
    /// Returns true once the plugin has made a decision.
    pub fn is_decided(&self) -> bool {
        !matches!(self, SubscriptionStatus::Pending)
    }
}

/// Unit of work tracked for one plugin during the scatter-gather window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSubscriptionDetails {
    /// Predicates restricted to the handles this plugin owns.
    pub predicates: Vec<Predicate>,
    /// Current decision.
    pub status: SubscriptionStatus,
}

impl PluginSubscriptionDetails {
    /// Creates PENDING details for the given predicates.
    pub fn pending(predicates: Vec<Predicate>) -> Self {
        Self {
            predicates,
            status: SubscriptionStatus::Pending,
        }
    }

    /// Returns every target CM handle id across this plugin's predicates.
    pub fn target_cm_handle_ids(&self) -> impl Iterator<Item = &String> + '_ {
        self.predicates
            .iter()
            .flat_map(|predicate| predicate.target_cm_handle_ids.iter())
    }
}

/// Kind of request being orchestrated; selects event types and timer keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Subscription create.
    Create,
    /// Subscription delete.
    Delete,
}

impl ResponseKind {
    /// Event type of the request sent to plugins (and received from clients).
    pub fn request_event_type(&self) -> &'static str {
        match self {
            ResponseKind::Create => "subscriptionCreateRequest",
            ResponseKind::Delete => "subscriptionDeleteRequest",
        }
    }

    /// Event type of responses (plugin replies and the client response).
    pub fn response_event_type(&self) -> &'static str {
        match self {
            ResponseKind::Create => "subscriptionCreateResponse",
            ResponseKind::Delete => "subscriptionDeleteResponse",
        }
    }

    /// Discriminator appended to the subscription id in timer keys.
    pub fn discriminator(&self) -> &'static str {
        match self {
            ResponseKind::Create => "create-response",
            ResponseKind::Delete => "delete-response",
        }
    }

    /// Resolves a request event type.
    pub fn from_request_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "subscriptionCreateRequest" => Some(ResponseKind::Create),
            "subscriptionDeleteRequest" => Some(ResponseKind::Delete),
            _ => None,
        }
    }

    /// Resolves a response event type.
    pub fn from_response_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "subscriptionCreateResponse" => Some(ResponseKind::Create),
            "subscriptionDeleteResponse" => Some(ResponseKind::Delete),
            _ => None,
        }
    }
}

/// Identity of the single deferred publish allowed per subscription and kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduledTaskKey {
    /// Subscription the response belongs to.
    pub subscription_id: SubscriptionId,
    /// Response kind.
    pub kind: ResponseKind,
}

impl ScheduledTaskKey {
    /// Creates a key.
    pub fn new(subscription_id: impl Into<SubscriptionId>, kind: ResponseKind) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            kind,
        }
    }
}

impl fmt::Display for ScheduledTaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.subscription_id, self.kind.discriminator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_datastore_names() {
        assert_eq!(
            DatastoreType::PassthroughRunning.name(),
            "ncmp-datastore:passthrough-running"
        );
        assert_eq!(
            DatastoreType::from_name("ncmp-datastore:passthrough-operational"),
            Some(DatastoreType::PassthroughOperational)
        );
        assert_eq!(DatastoreType::from_name("running"), None);
    }

    #[test]
    fn test_datastore_serde_uses_wire_name() {
        let json = serde_json::to_string(&DatastoreType::PassthroughRunning).unwrap();
        assert_eq!(json, "\"ncmp-datastore:passthrough-running\"");
    }

    #[test]
    fn test_predicate_pairs() {
        let predicate = Predicate::new(
            DatastoreType::PassthroughRunning,
            ["h1", "h2"],
            ["/a", "/b"],
        );
        let pairs: Vec<_> = predicate.pairs().collect();
        assert_eq!(
            pairs,
            vec![("h1", "/a"), ("h1", "/b"), ("h2", "/a"), ("h2", "/b")]
        );
        assert!(predicate.is_actionable());

        let empty = Predicate::new(
            DatastoreType::PassthroughRunning,
            Vec::<String>::new(),
            ["/a"],
        );
        assert!(!empty.is_actionable());
        assert_eq!(empty.pairs().count(), 0);
    }

    #[test]
    fn test_status_default_is_pending() {
        assert_eq!(SubscriptionStatus::default(), SubscriptionStatus::Pending);
        assert!(!SubscriptionStatus::Pending.is_decided());
        assert!(SubscriptionStatus::Rejected.is_decided());
    }

    #[test]
    fn test_response_kind_event_types() {
        for kind in [ResponseKind::Create, ResponseKind::Delete] {
            assert_eq!(
                ResponseKind::from_request_event_type(kind.request_event_type()),
                Some(kind)
            );
            assert_eq!(
                ResponseKind::from_response_event_type(kind.response_event_type()),
                Some(kind)
            );
        }
        assert_eq!(ResponseKind::from_request_event_type("other"), None);
    }

    #[test]
    fn test_scheduled_task_key_display() {
        let key = ScheduledTaskKey::new("sub-1", ResponseKind::Create);
        assert_eq!(key.to_string(), "sub-1-create-response");
        assert_ne!(key, ScheduledTaskKey::new("sub-1", ResponseKind::Delete));
    }
}
