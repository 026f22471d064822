//! Verification helpers for recorded traffic
//!
//! Decodes what a [`RecordingPublisher`] captured back into client responses
//! and plugin requests.

use thiserror::Error;

use ncmp_subscription_common::events::{CLIENT_RESPONSE_SCHEMA, PLUGIN_REQUEST_SCHEMA};
use ncmp_subscription_common::{
    AggregatedSubscriptionResponse, PluginName, PluginSubscriptionRequest, ResponseKind,
};

use crate::recording::RecordingPublisher;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected {expected} client responses for '{subscription_id}', found {actual}")]
    ResponseCountMismatch {
        subscription_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("No request was sent to plugin '{plugin}'")]
    NoPluginRequest { plugin: String },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Every client response published so far, in order
pub fn client_responses(
    publisher: &RecordingPublisher,
) -> Vec<(ResponseKind, AggregatedSubscriptionResponse)> {
    publisher
        .events()
        .into_iter()
        .filter(|event| event.envelope.data_schema == CLIENT_RESPONSE_SCHEMA)
        .filter_map(|event| {
            let kind = ResponseKind::from_response_event_type(&event.envelope.event_type)?;
            let response: AggregatedSubscriptionResponse = event.envelope.decode().ok()?;
            Some((kind, response))
        })
        .collect()
}

/// Client responses published for one subscription
pub fn responses_for(
    publisher: &RecordingPublisher,
    subscription_id: &str,
) -> Vec<(ResponseKind, AggregatedSubscriptionResponse)> {
    client_responses(publisher)
        .into_iter()
        .filter(|(_, response)| response.subscription_id == subscription_id)
        .collect()
}

/// The only client response for a subscription
pub fn single_response_for(
    publisher: &RecordingPublisher,
    subscription_id: &str,
) -> VerifyResult<(ResponseKind, AggregatedSubscriptionResponse)> {
    let mut responses = responses_for(publisher, subscription_id);
    if responses.len() != 1 {
        return Err(VerificationError::ResponseCountMismatch {
            subscription_id: subscription_id.to_string(),
            expected: 1,
            actual: responses.len(),
        });
    }
    Ok(responses.remove(0))
}

/// Every plugin request published so far, with its destination plugin
pub fn plugin_requests(publisher: &RecordingPublisher) -> Vec<(PluginName, PluginSubscriptionRequest)> {
    publisher
        .events()
        .into_iter()
        .filter(|event| event.envelope.data_schema == PLUGIN_REQUEST_SCHEMA)
        .filter_map(|event| {
            let plugin = event.envelope.destination.clone()?;
            let request: PluginSubscriptionRequest = event.envelope.decode().ok()?;
            Some((plugin, request))
        })
        .collect()
}

/// The request sent to `plugin`
pub fn plugin_request_for(
    publisher: &RecordingPublisher,
    plugin: &str,
) -> VerifyResult<PluginSubscriptionRequest> {
    plugin_requests(publisher)
        .into_iter()
        .find(|(destination, _)| destination == plugin)
        .map(|(_, request)| request)
        .ok_or_else(|| VerificationError::NoPluginRequest {
            plugin: plugin.to_string(),
        })
}
