//! Inbound topic consumers.
//!
//! - [`ClientRequestConsumer`]: create/delete requests from clients
//! - [`PluginReplyConsumer`]: accept/reject replies from DMI plugins
//!
//! Both are driven by [`run_consumer`], which drains a bus receiver until
//! shutdown. A failing message is logged and skipped; the loop keeps going.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ncmp_subscription_common::events::split_plugin_correlation_id;
use ncmp_subscription_common::{
    CreateSubscriptionRequest, DeleteSubscriptionRequest, EventEnvelope, PluginReply,
    PluginReplyData, ResponseKind, SubscriptionResult,
};

use crate::memory_bus::BusMessage;
use crate::orchestrator::SubscriptionOrchestrator;

/// Handles envelopes received on one topic.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Handles one envelope.
    async fn handle(&self, envelope: EventEnvelope) -> SubscriptionResult<()>;
}

/// Routes client requests to the orchestrator by event type.
pub struct ClientRequestConsumer {
    orchestrator: Arc<SubscriptionOrchestrator>,
}

impl ClientRequestConsumer {
    pub fn new(orchestrator: Arc<SubscriptionOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl EventHandler for ClientRequestConsumer {
    fn name(&self) -> &str {
        "client-requests"
    }

    async fn handle(&self, envelope: EventEnvelope) -> SubscriptionResult<()> {
        match ResponseKind::from_request_event_type(&envelope.event_type) {
            Some(ResponseKind::Create) => {
                let request: CreateSubscriptionRequest = envelope.decode()?;
                self.orchestrator.process_create_request(&request).await
            }
            Some(ResponseKind::Delete) => {
                let request: DeleteSubscriptionRequest = envelope.decode()?;
                self.orchestrator.process_delete_request(&request).await
            }
            None => {
                warn!("Ignoring client event of type {}", envelope.event_type);
                Ok(())
            }
        }
    }
}

/// Decodes plugin replies and hands them to the orchestrator.
pub struct PluginReplyConsumer {
    orchestrator: Arc<SubscriptionOrchestrator>,
}

impl PluginReplyConsumer {
    pub fn new(orchestrator: Arc<SubscriptionOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl EventHandler for PluginReplyConsumer {
    fn name(&self) -> &str {
        "plugin-replies"
    }

    async fn handle(&self, envelope: EventEnvelope) -> SubscriptionResult<()> {
        let Some(kind) = ResponseKind::from_response_event_type(&envelope.event_type) else {
            warn!("Ignoring plugin event of type {}", envelope.event_type);
            return Ok(());
        };
        let (subscription_id, plugin_name) =
            split_plugin_correlation_id(&envelope.correlation_id)?;
        let data: PluginReplyData = envelope.decode()?;
        if !data.status_message.is_empty() {
            debug!(
                "{} says {:?} for {}: {}",
                plugin_name, data.decision, subscription_id, data.status_message
            );
        }

        self.orchestrator
            .process_plugin_reply(&PluginReply {
                subscription_id,
                plugin_name,
                kind,
                decision: data.decision,
            })
            .await
    }
}

/// Feeds every message from `rx` to `handler` until `shutdown` fires or
/// the channel closes.
pub async fn run_consumer(
    handler: Arc<dyn EventHandler>,
    mut rx: mpsc::Receiver<BusMessage>,
    shutdown: CancellationToken,
) {
    info!("{}: consuming", handler.name());
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("{}: shutting down", handler.name());
                break;
            }
            message = rx.recv() => {
                let Some(message) = message else {
                    info!("{}: channel closed", handler.name());
                    break;
                };
                let event_type = message.envelope.event_type.clone();
                if let Err(e) = handler.handle(message.envelope).await {
                    if e.is_retryable() {
                        warn!(error = %e, key = %message.key, "{}: failed to handle {}", handler.name(), event_type);
                    } else {
                        error!(error = %e, key = %message.key, "{}: dropped {}", handler.name(), event_type);
                    }
                }
            }
        }
    }
}

/// Spawns [`run_consumer`] on the current runtime.
pub fn spawn_consumer(
    handler: Arc<dyn EventHandler>,
    rx: mpsc::Receiver<BusMessage>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_consumer(handler, rx, shutdown))
}
