//! ncmp-subscriptiond entry point.
//!
//! Wires the orchestrator to the in-process bus. Envelopes are read as JSON
//! lines from stdin and routed by event type: requests go to the client
//! request topic, responses to the plugin reply topic. Everything published
//! on the outbound topics is written to stdout as JSON lines.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ncmp_subscription_common::{
    EventEnvelope, EventPublisher, InMemorySubscriptionStore, ResponseKind, SubscriptionStore,
};
use ncmp_subscriptiond::{
    init_logging, spawn_consumer, BusMessage, ClientRequestConsumer, InMemoryBus,
    OrchestratorDeps, PluginReplyConsumer, ResponseScheduler, SubscriptionCache,
    SubscriptionConfig, SubscriptionOrchestrator, DEFAULT_CONFIG_PATH,
};

/// NCMP CM-change subscription orchestrator
#[derive(Parser, Debug)]
#[command(name = "ncmp-subscriptiond")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Override timers.response_timeout_ms
    #[arg(long)]
    response_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs);

    info!("--- Starting ncmp-subscriptiond ---");

    match run(args).await {
        Ok(()) => {
            info!("ncmp-subscriptiond: exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("ncmp-subscriptiond: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = SubscriptionConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(timeout) = args.response_timeout_ms {
        config.timers.response_timeout_ms = timeout;
    }
    config.validate().context("invalid configuration")?;

    info!("Response timeout: {}ms", config.timers.response_timeout_ms);
    info!("Known CM handles: {}", config.inventory.cm_handles.len());

    let shutdown = CancellationToken::new();
    let bus = Arc::new(InMemoryBus::new(config.bus.channel_capacity));
    let requests_rx = bus.subscribe(config.topics.ncmp_in.as_str());
    let replies_rx = bus.subscribe(config.topics.dmi_out.as_str());
    let responses_rx = bus.subscribe(config.topics.ncmp_out.as_str());
    let plugin_requests_rx = bus.subscribe(config.topics.dmi_in.as_str());

    let publisher: Arc<dyn EventPublisher> = Arc::clone(&bus) as Arc<dyn EventPublisher>;
    let cache = Arc::new(SubscriptionCache::new(config.cache_entry_ttl()));
    let scheduler = ResponseScheduler::new(
        config.response_timeout(),
        Arc::clone(&cache),
        Arc::clone(&publisher),
        config.topics.ncmp_out.as_str(),
    );
    let orchestrator = Arc::new(SubscriptionOrchestrator::new(
        OrchestratorDeps {
            store: Arc::new(InMemorySubscriptionStore::new()) as Arc<dyn SubscriptionStore>,
            resolver: Arc::new(config.plugin_resolver()),
            publisher,
            cache: Arc::clone(&cache),
            scheduler: scheduler.clone(),
        },
        config.topics.dmi_in.as_str(),
    ));

    let (out_tx, out_rx) = mpsc::channel::<BusMessage>(config.bus.channel_capacity);
    let (stdin_tx, stdin_rx) = mpsc::channel::<String>(config.bus.channel_capacity);
    spawn_stdin_reader(stdin_tx);
    let tasks: Vec<JoinHandle<()>> = vec![
        spawn_consumer(
            Arc::new(ClientRequestConsumer::new(Arc::clone(&orchestrator))),
            requests_rx,
            shutdown.clone(),
        ),
        spawn_consumer(
            Arc::new(PluginReplyConsumer::new(Arc::clone(&orchestrator))),
            replies_rx,
            shutdown.clone(),
        ),
        Arc::clone(&cache).spawn_sweeper(config.cache_sweep_interval(), shutdown.clone()),
        tokio::spawn(forward(responses_rx, out_tx.clone(), shutdown.clone())),
        tokio::spawn(forward(plugin_requests_rx, out_tx, shutdown.clone())),
        tokio::spawn(write_stdout(out_rx)),
        tokio::spawn(route_inbound(
            stdin_rx,
            Arc::clone(&bus),
            config.clone(),
            shutdown.clone(),
        )),
    ];

    info!("ncmp-subscriptiond: ready");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("ncmp-subscriptiond: received SIGINT, shutting down");

    shutdown.cancel();
    scheduler.cancel_all();
    for task in tasks {
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                warn!("Task ended abnormally: {}", e);
            }
        }
    }
    Ok(())
}

/// Reads stdin lines on a plain thread so a pending read never holds up
/// runtime shutdown.
fn spawn_stdin_reader(tx: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
        debug!("stdin closed");
    });
}

/// Routes envelopes read from stdin onto the inbound topics.
async fn route_inbound(
    mut lines: mpsc::Receiver<String>,
    bus: Arc<InMemoryBus>,
    config: SubscriptionConfig,
    shutdown: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };
        if line.trim().is_empty() {
            continue;
        }

        let envelope: EventEnvelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Skipping malformed envelope: {}", e);
                continue;
            }
        };
        let topic = if ResponseKind::from_request_event_type(&envelope.event_type).is_some() {
            &config.topics.ncmp_in
        } else if ResponseKind::from_response_event_type(&envelope.event_type).is_some() {
            &config.topics.dmi_out
        } else {
            warn!("No inbound topic for event type {}", envelope.event_type);
            continue;
        };

        let key = envelope.correlation_id.clone();
        if let Err(e) = bus.publish(topic, &key, envelope).await {
            error!("Failed to route inbound envelope: {}", e);
        }
    }
}

async fn forward(
    mut rx: mpsc::Receiver<BusMessage>,
    tx: mpsc::Sender<BusMessage>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => {
                    if tx.send(message).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

async fn write_stdout(mut rx: mpsc::Receiver<BusMessage>) {
    let mut stdout = tokio::io::stdout();
    while let Some(message) = rx.recv().await {
        let mut line = match serde_json::to_vec(&message.envelope) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode outbound envelope: {}", e);
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = stdout.write_all(&line).await {
            error!("Failed to write stdout: {}", e);
            break;
        }
        if let Err(e) = stdout.flush().await {
            error!("Failed to flush stdout: {}", e);
            break;
        }
    }
}
