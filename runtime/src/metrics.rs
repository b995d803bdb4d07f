//! Prometheus metrics for the relay pipeline.
//!
//! Metric families:
//! - Event intake (received, matched, dropped, extraction failures)
//! - Per-target delivery attempts and terminal outcomes
//! - Per-target dead-letter writes
//! - Subscription broadcast
//!
//! Recording goes through the `metrics` facade, so every recorder below is a
//! no-op until [`MetricsExporter::start`] installs the Prometheus recorder.
//!
//! # Example
//!
//! ```rust,no_run
//! use status_relay_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.start()?;
//!
//! // Serve `exporter.render()` from a `/metrics` route.
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installs the Prometheus recorder and renders the scrape body.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

impl MetricsExporter {
    /// Exporter with no recorder installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g. by another test in the same
    /// process), this logs a warning and leaves [`Self::handle`] empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if the recorder was not installed by this exporter.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Intake
    describe_counter!(
        "relay_events_received_total",
        "Total number of events published to the relay"
    );
    describe_counter!(
        "relay_events_matched_total",
        "Total number of events that matched the rule"
    );
    describe_counter!(
        "relay_events_dropped_total",
        "Total number of events that did not match the rule"
    );
    describe_counter!(
        "relay_extraction_failures_total",
        "Total number of matched events whose fields could not be extracted"
    );

    // Delivery
    describe_counter!(
        "relay_delivery_attempts_total",
        "Total number of delivery attempts, by target"
    );
    describe_counter!(
        "relay_delivery_successes_total",
        "Total number of successful deliveries, by target"
    );
    describe_counter!(
        "relay_delivery_failures_total",
        "Total number of failed delivery attempts, by target"
    );
    describe_histogram!(
        "relay_delivery_attempt_duration_seconds",
        "Time taken by a single delivery attempt"
    );

    // Dead letters
    describe_counter!(
        "relay_dead_letters_total",
        "Total number of dead-letter entries written, by target"
    );
    describe_counter!(
        "relay_dead_letter_write_failures_total",
        "Total number of dead-letter writes that failed, by target"
    );
    describe_counter!(
        "relay_dead_letters_evicted_total",
        "Total number of entries evicted from full in-memory queues"
    );
    describe_gauge!(
        "relay_dead_letter_queue_size",
        "Current number of entries in a dead-letter queue"
    );

    // Broadcast
    describe_counter!(
        "relay_broadcasts_total",
        "Total number of updates broadcast, by channel"
    );
    describe_counter!(
        "relay_broadcast_lagged_total",
        "Total number of messages skipped for subscribers that fell behind"
    );
    describe_gauge!(
        "relay_subscribers",
        "Current number of subscribers, by channel"
    );
}

/// Event intake metrics recorder.
pub struct EventMetrics;

impl EventMetrics {
    /// Record an event entering the relay.
    pub fn record_received() {
        counter!("relay_events_received_total").increment(1);
    }

    /// Record a rule match.
    pub fn record_matched() {
        counter!("relay_events_matched_total").increment(1);
    }

    /// Record a silent drop.
    pub fn record_dropped() {
        counter!("relay_events_dropped_total").increment(1);
    }

    /// Record a field extraction failure.
    pub fn record_extraction_failure() {
        counter!("relay_extraction_failures_total").increment(1);
    }
}

/// Per-target delivery metrics recorder.
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// Record one attempt and how long it took.
    pub fn record_attempt(target: &str, duration: Duration) {
        counter!("relay_delivery_attempts_total", "target" => target.to_string()).increment(1);
        histogram!("relay_delivery_attempt_duration_seconds", "target" => target.to_string())
            .record(duration.as_secs_f64());
    }

    /// Record a successful delivery.
    pub fn record_success(target: &str) {
        counter!("relay_delivery_successes_total", "target" => target.to_string()).increment(1);
    }

    /// Record a failed attempt.
    pub fn record_failure(target: &str) {
        counter!("relay_delivery_failures_total", "target" => target.to_string()).increment(1);
    }
}

/// Dead-letter metrics recorder.
pub struct DeadLetterMetrics;

impl DeadLetterMetrics {
    /// Record an entry written for `target`.
    pub fn record_entry(target: &str) {
        counter!("relay_dead_letters_total", "target" => target.to_string()).increment(1);
    }

    /// Record a lost dead-letter write.
    pub fn record_write_failure(target: &str) {
        counter!("relay_dead_letter_write_failures_total", "target" => target.to_string())
            .increment(1);
    }

    /// Record an eviction from a full in-memory queue.
    pub fn record_eviction(queue: &str) {
        counter!("relay_dead_letters_evicted_total", "queue" => queue.to_string()).increment(1);
    }

    /// Record the current queue size.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_size(queue: &str, size: usize) {
        gauge!("relay_dead_letter_queue_size", "queue" => queue.to_string()).set(size as f64);
    }
}

/// Subscription broadcast metrics recorder.
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    /// Record one broadcast on `channel`.
    pub fn record_broadcast(channel: &str) {
        counter!("relay_broadcasts_total", "channel" => channel.to_string()).increment(1);
    }

    /// Record a message skipped for a subscriber whose buffer was full.
    pub fn record_lagged(channel: &str) {
        counter!("relay_broadcast_lagged_total", "channel" => channel.to_string()).increment(1);
    }

    /// Record the current subscriber count on `channel`.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_subscribers(channel: &str, count: usize) {
        gauge!("relay_subscribers", "channel" => channel.to_string()).set(count as f64);
    }
}
