//! Error types for CM subscription operations.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use thiserror::Error;

/// Result type alias for subscription operations.
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

/// Errors that can occur while orchestrating CM subscriptions.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The durable subscription store could not serve a request.
    #[error("Subscription store operation failed: {operation}: {message}")]
    Store {
        /// The store operation (e.g., "is_ongoing", "record_accepted").
        operation: String,
        /// Error message.
        message: String,
    },

    /// Publishing to the message bus failed.
    #[error("Failed to publish to topic '{topic}': {message}")]
    Transport {
        /// Destination topic.
        topic: String,
        /// Error message.
        message: String,
    },

    /// An inbound event could not be decoded.
    #[error("Invalid '{event_type}' event: {message}")]
    InvalidEvent {
        /// The event type carried by the envelope.
        event_type: String,
        /// Error message.
        message: String,
    },

    /// A plugin reply carried a correlation id not of the form `subscription#plugin`.
    #[error("Invalid correlation id '{value}'")]
    InvalidCorrelationId {
        /// The offending correlation id.
        value: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// JSON encode/decode failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SubscriptionError {
    /// Creates a store error.
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid event error.
    pub fn invalid_event(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEvent {
            event_type: event_type.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid correlation id error.
    pub fn invalid_correlation_id(value: impl Into<String>) -> Self {
        Self::InvalidCorrelationId {
            value: value.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubscriptionError::Store { .. } | SubscriptionError::Transport { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = SubscriptionError::store("is_ongoing", "connection refused");
        assert_eq!(
            err.to_string(),
            "Subscription store operation failed: is_ongoing: connection refused"
        );
    }

    #[test]
    fn test_transport_error_display() {
        let err = SubscriptionError::transport("subscription-response", "closed");
        assert_eq!(
            err.to_string(),
            "Failed to publish to topic 'subscription-response': closed"
        );
    }

    #[test]
    fn test_invalid_correlation_id() {
        let err = SubscriptionError::invalid_correlation_id("sub-1");
        assert!(err.to_string().contains("sub-1"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(SubscriptionError::store("get", "timeout").is_retryable());
        assert!(SubscriptionError::transport("t", "closed").is_retryable());
        assert!(!SubscriptionError::invalid_correlation_id("sub-1").is_retryable());
        assert!(!SubscriptionError::invalid_config("topics.ncmp_in", "empty").is_retryable());
    }
}
