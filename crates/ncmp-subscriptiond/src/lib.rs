//! NCMP CM-change subscription orchestrator.
//!
//! Accepts create/delete subscription requests, drops work already covered
//! by existing subscriptions, fans the rest out to the owning DMI plugins and
//! answers every request with exactly one aggregated response within the
//! configured response timeout.
//!
//! # Architecture
//!
//! - [`dedup`]: Strips (handle, xpath) pairs the store already covers
//! - [`cache`]: Per-subscription, per-plugin working state with a TTL sweeper
//! - [`aggregator`]: Accepted/pending/rejected partition of cached targets
//! - [`scheduler`]: One response timer per subscription and kind, with an
//!   atomic claim shared by the timer and on-demand publication
//! - [`orchestrator`]: Create, delete and plugin reply entry points
//! - [`consumer`]: Inbound topic consumers
//! - [`memory_bus`]: In-process bus used by the daemon and tests
//! - [`config_file`]: TOML configuration
//! - [`logging`]: tracing subscriber setup

pub mod aggregator;
pub mod cache;
pub mod config_file;
pub mod consumer;
pub mod dedup;
pub mod logging;
pub mod memory_bus;
pub mod orchestrator;
pub mod scheduler;

pub use aggregator::ResponseAggregator;
pub use cache::SubscriptionCache;
pub use config_file::{SubscriptionConfig, DEFAULT_CONFIG_PATH};
pub use consumer::{
    run_consumer, spawn_consumer, ClientRequestConsumer, EventHandler, PluginReplyConsumer,
};
pub use dedup::Deduplicator;
pub use logging::init_logging;
pub use memory_bus::{BusMessage, InMemoryBus};
pub use orchestrator::{OrchestratorDeps, SubscriptionOrchestrator};
pub use scheduler::ResponseScheduler;
