//! Durable subscription store port.
//!
//! The store records which subscriptions cover each
//! (datastore, CM handle, xpath) triple. The orchestrator only ever
//! talks to it through [`SubscriptionStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::SubscriptionResult;
use crate::types::DatastoreType;

/// Durable check/record of active subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Returns true if no active subscription uses `subscription_id`.
    async fn is_unique_subscription_id(&self, subscription_id: &str) -> SubscriptionResult<bool>;

    /// Returns true if any subscription already covers the triple.
    async fn is_ongoing(
        &self,
        datastore: DatastoreType,
        cm_handle_id: &str,
        xpath: &str,
    ) -> SubscriptionResult<bool>;

    /// Records `subscription_id` as a subscriber of the triple.
    async fn record_accepted(
        &self,
        datastore: DatastoreType,
        cm_handle_id: &str,
        xpath: &str,
        subscription_id: &str,
    ) -> SubscriptionResult<()>;

    /// Removes `subscription_id` from the triple's subscribers.
    async fn remove_subscription(
        &self,
        datastore: DatastoreType,
        cm_handle_id: &str,
        xpath: &str,
        subscription_id: &str,
    ) -> SubscriptionResult<()>;
}

type TripleKey = (DatastoreType, String, String);

/// In-process store keeping an ordered subscriber list per triple.
///
/// A triple is dropped as soon as its last subscriber is removed, so
/// `is_ongoing` is simply "the triple exists".
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    subscribers: RwLock<HashMap<TripleKey, Vec<String>>>,
}

impl InMemorySubscriptionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the subscribers of a triple, oldest first.
    pub fn subscribers(
        &self,
        datastore: DatastoreType,
        cm_handle_id: &str,
        xpath: &str,
    ) -> Vec<String> {
        self.subscribers
            .read()
            .get(&(datastore, cm_handle_id.to_string(), xpath.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of triples with at least one subscriber.
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns true if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn is_unique_subscription_id(&self, subscription_id: &str) -> SubscriptionResult<bool> {
        Ok(!self
            .subscribers
            .read()
            .values()
            .any(|ids| ids.iter().any(|id| id == subscription_id)))
    }

    async fn is_ongoing(
        &self,
        datastore: DatastoreType,
        cm_handle_id: &str,
        xpath: &str,
    ) -> SubscriptionResult<bool> {
        Ok(self.subscribers.read().contains_key(&(
            datastore,
            cm_handle_id.to_string(),
            xpath.to_string(),
        )))
    }

    async fn record_accepted(
        &self,
        datastore: DatastoreType,
        cm_handle_id: &str,
        xpath: &str,
        subscription_id: &str,
    ) -> SubscriptionResult<()> {
        let mut subscribers = self.subscribers.write();
        let ids = subscribers
            .entry((datastore, cm_handle_id.to_string(), xpath.to_string()))
            .or_default();
        if !ids.iter().any(|id| id == subscription_id) {
            ids.push(subscription_id.to_string());
            debug!(
                "Recorded {} for {}/{}/{}",
                subscription_id, datastore, cm_handle_id, xpath
            );
        }
        Ok(())
    }

    async fn remove_subscription(
        &self,
        datastore: DatastoreType,
        cm_handle_id: &str,
        xpath: &str,
        subscription_id: &str,
    ) -> SubscriptionResult<()> {
        let key = (datastore, cm_handle_id.to_string(), xpath.to_string());
        let mut subscribers = self.subscribers.write();
        if let Some(ids) = subscribers.get_mut(&key) {
            ids.retain(|id| id != subscription_id);
            if ids.is_empty() {
                subscribers.remove(&key);
                info!(
                    "No subscribers left for {}/{}/{}",
                    datastore, cm_handle_id, xpath
                );
            }
        }
        Ok(())
    }
}
