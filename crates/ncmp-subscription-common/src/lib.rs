//! Common CM subscription abstractions for NCMP.
//!
//! This crate provides the data model and collaborator ports shared by the
//! subscription daemon and its test infrastructure:
//!
//! - [`types`]: Predicates, per-plugin details, statuses and timer keys
//! - [`events`]: Client/plugin messages and the [`EventEnvelope`]
//! - [`SubscriptionStore`]: Durable record of active subscriptions
//! - [`PluginResolver`]: CM handle → owning DMI plugin lookup
//! - [`EventPublisher`]: Outbound message bus
//!
//! # Architecture
//!
//! A subscription request flows through these ports:
//!
//! 1. The client publishes a create/delete request on the inbound topic
//! 2. Predicates are split per owning DMI plugin via the [`PluginResolver`]
//! 3. Work already covered in the [`SubscriptionStore`] is dropped
//! 4. One request per plugin goes out through the [`EventPublisher`]
//! 5. Plugin replies are aggregated into a single client response

pub mod bus;
pub mod error;
pub mod events;
pub mod inventory;
pub mod store;
pub mod types;

pub use bus::EventPublisher;
pub use error::{SubscriptionError, SubscriptionResult};
pub use events::{
    AggregatedSubscriptionResponse, CreateSubscriptionRequest, DeleteSubscriptionRequest,
    EventEnvelope, PluginDecision, PluginReply, PluginReplyData, PluginSubscriptionRequest,
};
pub use inventory::{PluginResolver, StaticPluginResolver};
pub use store::{InMemorySubscriptionStore, SubscriptionStore};
pub use types::{
    DatastoreType, PluginName, PluginSubscriptionDetails, Predicate, ResponseKind,
    ScheduledTaskKey, SubscriptionCacheEntry, SubscriptionId, SubscriptionStatus,
};
