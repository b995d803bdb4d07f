//! Order status relay server.
//!
//! Wires configuration into a running relay:
//!
//! - one [`TargetWorker`] per configured target, each with its own
//!   dead-letter queue (file-backed when `RELAY_DLQ_DIR` is set)
//! - the [`EventRelay`] behind a bounded publish channel
//! - the axum router serving the gateway, ingress and inspection routes
//!
//! The binary in `main.rs` adds tracing, metrics and graceful shutdown.

pub mod config;

pub use config::{Config, ConfigError};

use metrics_exporter_prometheus::PrometheusHandle;
use status_relay_core::DeadLetterSink;
use status_relay_runtime::{
    DeadLetterRegistry, EventRelay, FanOutDispatcher, FileDeadLetterQueue, HttpTransport,
    InMemoryDeadLetterQueue, MutationGateway, RelayHandle, TargetWorker, TransportConfig,
};
use status_relay_web::{AppState, build_router};
use std::sync::Arc;

/// A wired relay, ready to serve.
#[derive(Debug)]
pub struct App {
    /// HTTP surface
    pub router: axum::Router,
    /// Lifecycle of the background relay
    pub relay: RelayHandle,
    /// Broadcast side of the gateway
    pub gateway: MutationGateway,
    /// Every target's dead-letter queue
    pub dead_letters: Arc<DeadLetterRegistry>,
}

/// Build every component from `config` and spawn the relay.
///
/// Must be called inside a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or a file-backed
/// dead-letter queue cannot be opened.
pub async fn build_app(config: &Config, metrics: Option<PrometheusHandle>) -> anyhow::Result<App> {
    let gateway = MutationGateway::new();
    let transport = Arc::new(HttpTransport::new(TransportConfig {
        timeout: config.delivery_timeout,
        ..TransportConfig::default()
    })?);

    let mut registry = DeadLetterRegistry::new();
    let mut dispatcher = FanOutDispatcher::new();
    for target in &config.targets {
        let sink: Arc<dyn DeadLetterSink> = match &config.dead_letters.dir {
            Some(dir) => Arc::new(FileDeadLetterQueue::open(dir, target.dead_letter_queue.clone()).await?),
            None => Arc::new(InMemoryDeadLetterQueue::new(
                target.dead_letter_queue.clone(),
                config.dead_letters.capacity,
            )),
        };
        registry.insert(Arc::clone(&sink));

        tracing::info!(
            target_id = %target.id,
            endpoint = %target.endpoint,
            retry_attempts = target.retry_attempts,
            dead_letter_queue = %target.dead_letter_queue,
            "Delivery target configured"
        );
        dispatcher.push(
            TargetWorker::new(target.clone(), transport.clone(), sink).with_backoff(config.backoff.clone()),
        );
    }

    let relay = EventRelay::new(config.rule.clone(), status_relay_core::MappingTable::status_update(), dispatcher);
    let (publisher, handle) = relay.spawn(config.event_buffer);

    let dead_letters = Arc::new(registry);
    let mut state = AppState::new(gateway.clone(), publisher, Arc::clone(&dead_letters));
    match &config.api_key {
        Some(api_key) => state = state.with_api_key(api_key.as_str()),
        None => tracing::warn!("RELAY_API_KEY is not set; protected routes accept unauthenticated requests"),
    }
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }

    Ok(App {
        router: build_router(state),
        relay: handle,
        gateway,
        dead_letters,
    })
}
