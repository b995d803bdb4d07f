//! Event relay: rule match, field extraction and fan-out for each event.
//!
//! [`EventRelay::process`] handles one event end to end. [`EventRelay::spawn`]
//! puts the relay behind a bounded queue and processes every queued event on
//! its own task, so publishing never waits for delivery.

use crate::dispatcher::FanOutDispatcher;
use crate::metrics::EventMetrics;
use status_relay_core::{
    DeliveryOutcome, DomainEvent, FieldExtractionError, MappingTable, MutationArgs, Rule,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

/// Errors from the relay's publish point and lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The relay no longer accepts events.
    #[error("Relay is shut down")]
    Closed,

    /// The relay is at capacity and the event was not queued.
    #[error("Relay queue is full")]
    Full,

    /// Draining in-flight events did not finish in time.
    #[error("Shutdown timeout: {0} events still in flight")]
    ShutdownTimeout(usize),

    /// The relay task itself failed.
    #[error("Relay task failed: {0}")]
    Task(String),
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The event did not match the rule. Nothing was attempted.
    Dropped,

    /// The event matched but a required field could not be extracted. Every
    /// target recorded a failure without an attempt.
    ExtractionFailed {
        /// What was missing or malformed
        error: FieldExtractionError,
        /// One outcome per target
        outcomes: Vec<DeliveryOutcome>,
    },

    /// Arguments were extracted and sent to every target.
    Dispatched {
        /// The mapped arguments
        args: MutationArgs,
        /// One outcome per target
        outcomes: Vec<DeliveryOutcome>,
    },
}

impl RelayOutcome {
    /// Per-target outcomes (empty for a dropped event).
    #[must_use]
    pub fn outcomes(&self) -> &[DeliveryOutcome] {
        match self {
            Self::Dropped => &[],
            Self::ExtractionFailed { outcomes, .. } | Self::Dispatched { outcomes, .. } => outcomes,
        }
    }

    /// Whether the event was dispatched and every target received it.
    #[must_use]
    pub fn all_delivered(&self) -> bool {
        matches!(self, Self::Dispatched { outcomes, .. } if outcomes.iter().all(DeliveryOutcome::is_delivered))
    }
}

/// The relay pipeline for one rule and one mapping table.
#[derive(Debug, Clone)]
pub struct EventRelay {
    rule: Rule,
    mapping: MappingTable,
    dispatcher: FanOutDispatcher,
}

impl EventRelay {
    /// Build a relay.
    #[must_use]
    pub const fn new(rule: Rule, mapping: MappingTable, dispatcher: FanOutDispatcher) -> Self {
        Self {
            rule,
            mapping,
            dispatcher,
        }
    }

    /// The routing rule.
    #[must_use]
    pub const fn rule(&self) -> &Rule {
        &self.rule
    }

    /// The dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &FanOutDispatcher {
        &self.dispatcher
    }

    /// Match, extract and fan out one event.
    pub async fn process(&self, event: &DomainEvent) -> RelayOutcome {
        EventMetrics::record_received();

        if !self.rule.matches(event) {
            EventMetrics::record_dropped();
            tracing::debug!(
                source = %event.source,
                detail_type = %event.detail_type,
                "Event does not match rule, dropped"
            );
            return RelayOutcome::Dropped;
        }
        EventMetrics::record_matched();

        match self.mapping.extract(event) {
            Ok(args) => {
                let outcomes = self.dispatcher.dispatch(args.clone()).await;
                RelayOutcome::Dispatched { args, outcomes }
            }
            Err(error) => {
                EventMetrics::record_extraction_failure();
                tracing::warn!(
                    source = %event.source,
                    detail_type = %event.detail_type,
                    error = %error,
                    "Field extraction failed, recording failure on every target"
                );
                let payload = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
                let outcomes = self.dispatcher.fail_all(&payload, &error.to_string()).await;
                RelayOutcome::ExtractionFailed { error, outcomes }
            }
        }
    }

    /// Run the relay in the background behind a queue of `buffer` events.
    ///
    /// Returns the publish handle and the handle used to shut the relay
    /// down. Each dequeued event is processed on its own task.
    #[must_use]
    pub fn spawn(self, buffer: usize) -> (EventPublisher, RelayHandle) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let in_flight = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn(run(Arc::new(self), rx, shutdown_rx, Arc::clone(&in_flight)));

        (
            EventPublisher { sender: tx },
            RelayHandle {
                task,
                shutdown: shutdown_tx,
                in_flight,
            },
        )
    }
}

/// Decrements the in-flight counter when an event task finishes, even if it
/// panicked.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn spawn_event(
    tasks: &mut JoinSet<RelayOutcome>,
    relay: &Arc<EventRelay>,
    in_flight: &Arc<AtomicUsize>,
    event: DomainEvent,
) {
    in_flight.fetch_add(1, Ordering::AcqRel);
    let guard = InFlightGuard(Arc::clone(in_flight));
    let relay = Arc::clone(relay);
    tasks.spawn(async move {
        let _guard = guard;
        relay.process(&event).await
    });
}

async fn run(
    relay: Arc<EventRelay>,
    mut events: mpsc::Receiver<DomainEvent>,
    mut shutdown: watch::Receiver<bool>,
    in_flight: Arc<AtomicUsize>,
) {
    let mut tasks = JoinSet::new();
    let mut shutdown_open = true;
    tracing::info!(targets = relay.dispatcher.len(), "Event relay started");

    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else { break };
                spawn_event(&mut tasks, &relay, &in_flight, event);
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "Event task failed");
                }
            }
            changed = shutdown.changed(), if shutdown_open => match changed {
                Ok(()) if *shutdown.borrow() => break,
                Ok(()) => {}
                // Handle dropped without a shutdown request; keep running
                // until every publisher is gone.
                Err(_) => shutdown_open = false,
            }
        }
    }

    events.close();
    // Events already queued before close still get processed.
    while let Ok(event) = events.try_recv() {
        spawn_event(&mut tasks, &relay, &in_flight, event);
    }

    tracing::info!(in_flight = tasks.len(), "Event relay draining");
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "Event task failed");
        }
    }
    tracing::info!("Event relay stopped");
}

/// Fire-and-forget publish point.
///
/// Cheap to clone. Publishing returns as soon as the event is queued; the
/// publisher never learns what happened to it downstream.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: mpsc::Sender<DomainEvent>,
}

impl EventPublisher {
    /// Queue an event, waiting for space if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Closed`] once the relay has shut down.
    pub async fn publish(&self, event: DomainEvent) -> Result<(), RelayError> {
        self.sender.send(event).await.map_err(|_| RelayError::Closed)
    }

    /// Queue an event without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Full`] when the queue is at capacity and
    /// [`RelayError::Closed`] once the relay has shut down.
    pub fn try_publish(&self, event: DomainEvent) -> Result<(), RelayError> {
        self.sender.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => RelayError::Full,
            mpsc::error::TrySendError::Closed(_) => RelayError::Closed,
        })
    }
}

/// Lifecycle handle of a spawned relay.
#[derive(Debug)]
pub struct RelayHandle {
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
    in_flight: Arc<AtomicUsize>,
}

impl RelayHandle {
    /// Events currently being processed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stop accepting events and wait for in-flight ones to finish.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ShutdownTimeout`] if draining takes longer than
    /// `timeout`, or [`RelayError::Task`] if the relay task panicked.
    pub async fn shutdown(mut self, timeout: Duration) -> Result<(), RelayError> {
        tracing::info!("Initiating relay shutdown");
        let _ = self.shutdown.send(true);

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(())) => {
                tracing::info!("Relay shutdown complete");
                Ok(())
            }
            Ok(Err(err)) => Err(RelayError::Task(err.to_string())),
            Err(_) => {
                let pending = self.in_flight();
                tracing::error!(in_flight = pending, "Relay shutdown timed out");
                self.task.abort();
                Err(RelayError::ShutdownTimeout(pending))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn event(source: &str) -> DomainEvent {
        DomainEvent::new(source, "Order Status Update", "2024-01-01T00:00:00Z".parse().unwrap())
            .with_detail("order-id", "123")
            .with_detail("status", "SHIPPED")
            .with_detail("prev-status", "IN_PROGRESS")
    }

    fn relay() -> EventRelay {
        EventRelay::new(
            Rule::order_status_updates(),
            MappingTable::status_update(),
            FanOutDispatcher::new(),
        )
    }

    #[tokio::test]
    async fn unmatched_events_are_dropped() {
        assert_eq!(relay().process(&event("billing.system")).await, RelayOutcome::Dropped);
    }

    #[tokio::test]
    async fn matched_events_are_dispatched() {
        let outcome = relay().process(&event("orders.system")).await;
        assert!(matches!(outcome, RelayOutcome::Dispatched { ref args, .. } if args.len() == 4));
    }

    #[tokio::test]
    async fn missing_field_is_an_extraction_failure() {
        let mut incomplete = event("orders.system");
        incomplete.detail.remove("prev-status");

        let outcome = relay().process(&incomplete).await;
        assert!(matches!(outcome, RelayOutcome::ExtractionFailed { .. }));
        assert!(!outcome.all_delivered());
    }

    #[tokio::test]
    async fn shutdown_closes_the_publish_point() {
        let (publisher, handle) = relay().spawn(8);
        publisher.publish(event("orders.system")).await.unwrap();

        handle.shutdown(Duration::from_secs(5)).await.unwrap();

        assert_eq!(
            publisher.publish(event("orders.system")).await,
            Err(RelayError::Closed)
        );
    }
}
