//! Messages exchanged with clients and DMI plugins.
//!
//! Payloads travel inside an [`EventEnvelope`], which carries the event
//! type, routing information and the correlation id used to match plugin
//! replies back to the subscription and plugin they answer.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SubscriptionError, SubscriptionResult};
use crate::types::{PluginName, Predicate, ResponseKind, SubscriptionId, SubscriptionStatus};

/// Source attribute stamped on every outbound envelope.
pub const EVENT_SOURCE: &str = "NCMP";

/// Schema of the client-facing response payload.
pub const CLIENT_RESPONSE_SCHEMA: &str = "org.onap.ncmp.cm.subscription:1.0.0";

/// Schema of the request payload sent to DMI plugins.
pub const PLUGIN_REQUEST_SCHEMA: &str = "org.onap.ncmp.dmi.cm.subscription:1.0.0";

/// Separator between subscription id and plugin name in correlation ids.
pub const CORRELATION_ID_SEPARATOR: char = '#';

/// Client request to create a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    pub subscription_id: SubscriptionId,
    pub predicates: Vec<Predicate>,
}

/// Client request to delete a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSubscriptionRequest {
    pub subscription_id: SubscriptionId,
    pub predicates: Vec<Predicate>,
}

/// Request fanned out to one owning plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSubscriptionRequest {
    pub subscription_id: SubscriptionId,
    pub kind: ResponseKind,
    pub predicates: Vec<Predicate>,
}

/// A plugin's explicit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginDecision {
    Accepted,
    Rejected,
}

impl From<PluginDecision> for SubscriptionStatus {
    fn from(decision: PluginDecision) -> Self {
        match decision {
            PluginDecision::Accepted => SubscriptionStatus::Accepted,
            PluginDecision::Rejected => SubscriptionStatus::Rejected,
        }
    }
}

/// Payload of a plugin reply as it appears on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginReplyData {
    pub decision: PluginDecision,
    #[serde(default)]
    pub status_message: String,
}

/// A decoded plugin reply, routed by its correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginReply {
    pub subscription_id: SubscriptionId,
    pub plugin_name: PluginName,
    pub kind: ResponseKind,
    pub decision: PluginDecision,
}

/// The single client-facing outcome of a create or delete request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedSubscriptionResponse {
    pub subscription_id: SubscriptionId,
    pub accepted_targets: BTreeSet<String>,
    pub pending_targets: BTreeSet<String>,
    pub rejected_targets: BTreeSet<String>,
}

/// Transport-neutral event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub id: Uuid,
    pub event_type: String,
    pub source: String,
    pub data_schema: String,
    pub correlation_id: String,
    /// Plugin the event is addressed to, for plugin-bound requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PluginName>,
    pub time: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    /// Wraps a payload in a fresh envelope.
    pub fn new<T: Serialize>(
        event_type: impl Into<String>,
        data_schema: impl Into<String>,
        correlation_id: impl Into<String>,
        data: &T,
    ) -> SubscriptionResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            source: EVENT_SOURCE.to_string(),
            data_schema: data_schema.into(),
            correlation_id: correlation_id.into(),
            destination: None,
            time: Utc::now(),
            data: serde_json::to_value(data)?,
        })
    }

    /// Sets the destination plugin.
    pub fn with_destination(mut self, plugin: impl Into<PluginName>) -> Self {
        self.destination = Some(plugin.into());
        self
    }

    /// Decodes the payload.
    pub fn decode<T: DeserializeOwned>(&self) -> SubscriptionResult<T> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| SubscriptionError::invalid_event(&self.event_type, e.to_string()))
    }
}

/// Builds the envelope carrying a plugin-bound request.
pub fn plugin_request_envelope(
    plugin: &str,
    request: &PluginSubscriptionRequest,
) -> SubscriptionResult<EventEnvelope> {
    Ok(EventEnvelope::new(
        request.kind.request_event_type(),
        PLUGIN_REQUEST_SCHEMA,
        plugin_correlation_id(&request.subscription_id, plugin),
        request,
    )?
    .with_destination(plugin))
}

/// Builds the envelope carrying the client-facing response.
pub fn client_response_envelope(
    kind: ResponseKind,
    response: &AggregatedSubscriptionResponse,
) -> SubscriptionResult<EventEnvelope> {
    EventEnvelope::new(
        kind.response_event_type(),
        CLIENT_RESPONSE_SCHEMA,
        response.subscription_id.clone(),
        response,
    )
}

/// Joins a subscription id and plugin name into a correlation id.
pub fn plugin_correlation_id(subscription_id: &str, plugin: &str) -> String {
    format!("{}{}{}", subscription_id, CORRELATION_ID_SEPARATOR, plugin)
}

/// Splits a `subscription#plugin` correlation id.
///
/// Splits at the last separator: plugin names never contain one, while
/// subscription ids are opaque and may.
pub fn split_plugin_correlation_id(value: &str) -> SubscriptionResult<(String, String)> {
    match value.rsplit_once(CORRELATION_ID_SEPARATOR) {
        Some((subscription_id, plugin)) if !subscription_id.is_empty() && !plugin.is_empty() => {
            Ok((subscription_id.to_string(), plugin.to_string()))
        }
        _ => Err(SubscriptionError::invalid_correlation_id(value)),
    }
}
