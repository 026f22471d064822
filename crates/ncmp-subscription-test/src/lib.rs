//! Integration test infrastructure for the NCMP subscription orchestrator
//!
//! Provides:
//! - Fixtures for predicates, client requests and plugin replies
//! - A recording publisher with injectable transport failures
//! - Helpers that decode recorded traffic into responses and requests

pub mod fixtures;
mod recording;
mod verification;

pub use fixtures::*;
pub use recording::{PublishedEvent, RecordingPublisher};
pub use verification::*;
