//! Test fixtures for common subscription scenarios
//!
//! Builders for predicates, client requests and plugin reply envelopes in
//! the shape the daemon receives them.

use std::collections::BTreeSet;

use serde::Serialize;

use ncmp_subscription_common::events::plugin_correlation_id;
use ncmp_subscription_common::{
    CreateSubscriptionRequest, DatastoreType, DeleteSubscriptionRequest, EventEnvelope,
    PluginDecision, PluginReplyData, Predicate, ResponseKind, StaticPluginResolver,
};

/// Client request schema used by fixtures
pub const CLIENT_REQUEST_SCHEMA: &str = "org.onap.ncmp.cm.subscription:1.0.0";

/// Plugin reply schema used by fixtures
pub const PLUGIN_REPLY_SCHEMA: &str = "org.onap.ncmp.dmi.cm.subscription:1.0.0";

/// Predicate on the running datastore
pub fn running(handles: &[&str], xpaths: &[&str]) -> Predicate {
    Predicate::new(
        DatastoreType::PassthroughRunning,
        handles.iter().copied(),
        xpaths.iter().copied(),
    )
}

/// Predicate on the operational datastore
pub fn operational(handles: &[&str], xpaths: &[&str]) -> Predicate {
    Predicate::new(
        DatastoreType::PassthroughOperational,
        handles.iter().copied(),
        xpaths.iter().copied(),
    )
}

/// Target set as it appears in aggregated responses
pub fn targets(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|item| item.to_string()).collect()
}

/// Create request
pub fn create_request(subscription_id: &str, predicates: Vec<Predicate>) -> CreateSubscriptionRequest {
    CreateSubscriptionRequest {
        subscription_id: subscription_id.to_string(),
        predicates,
    }
}

/// Delete request
pub fn delete_request(subscription_id: &str, predicates: Vec<Predicate>) -> DeleteSubscriptionRequest {
    DeleteSubscriptionRequest {
        subscription_id: subscription_id.to_string(),
        predicates,
    }
}

/// Resolver from (handle, plugin) pairs
pub fn resolver(owners: &[(&str, &str)]) -> StaticPluginResolver {
    owners.iter().copied().collect()
}

/// Envelope carrying a client create request
pub fn create_request_envelope(request: &CreateSubscriptionRequest) -> EventEnvelope {
    client_envelope(ResponseKind::Create, &request.subscription_id, request)
}

/// Envelope carrying a client delete request
pub fn delete_request_envelope(request: &DeleteSubscriptionRequest) -> EventEnvelope {
    client_envelope(ResponseKind::Delete, &request.subscription_id, request)
}

fn client_envelope<T: Serialize>(
    kind: ResponseKind,
    subscription_id: &str,
    request: &T,
) -> EventEnvelope {
    EventEnvelope::new(
        kind.request_event_type(),
        CLIENT_REQUEST_SCHEMA,
        subscription_id,
        request,
    )
    .expect("fixture request serializes")
}

/// Envelope carrying a plugin reply, correlated the way plugins do it
pub fn plugin_reply_envelope(
    kind: ResponseKind,
    subscription_id: &str,
    plugin: &str,
    decision: PluginDecision,
) -> EventEnvelope {
    EventEnvelope::new(
        kind.response_event_type(),
        PLUGIN_REPLY_SCHEMA,
        plugin_correlation_id(subscription_id, plugin),
        &PluginReplyData {
            decision,
            status_message: format!("{:?} by {}", decision, plugin),
        },
    )
    .expect("fixture reply serializes")
}
