//! Fan-out dispatcher.
//!
//! One event's mutation arguments go to every configured target
//! concurrently. Each target runs its own bounded, sequential attempt
//! sequence through a [`TargetWorker`] and, once its budget is spent, writes
//! one entry to its own dead-letter sink. Targets share nothing: a failing,
//! slow or panicking target never changes what another target does.

use crate::metrics::{DeadLetterMetrics, DeliveryMetrics};
use crate::retry::{Backoff, Exhausted, RetryPolicy, Succeeded, retry_with_backoff};
use status_relay_core::environment::{Clock, SystemClock};
use status_relay_core::{
    DeadLetterEntry, DeadLetterSink, DeliveryOutcome, DeliveryStatus, DeliveryTarget, MutationArgs,
    MutationTransport,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info_span};

/// Delivers to a single target: attempt, retry, dead-letter.
pub struct TargetWorker {
    target: DeliveryTarget,
    policy: RetryPolicy,
    transport: Arc<dyn MutationTransport>,
    dead_letters: Arc<dyn DeadLetterSink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TargetWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetWorker")
            .field("target", &self.target)
            .field("policy", &self.policy)
            .field("dead_letters", &self.dead_letters.name())
            .finish_non_exhaustive()
    }
}

impl TargetWorker {
    /// Worker allowing `target.retry_attempts` retries with no backoff.
    #[must_use]
    pub fn new(
        target: DeliveryTarget,
        transport: Arc<dyn MutationTransport>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        let policy = RetryPolicy::new(target.retry_attempts);
        Self {
            target,
            policy,
            transport,
            dead_letters,
            clock: Arc::new(SystemClock),
        }
    }

    /// Wait between attempts according to `backoff`.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.policy = self.policy.with_backoff(backoff);
        self
    }

    /// Clock used to timestamp dead-letter entries.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The target this worker delivers to.
    #[must_use]
    pub const fn target(&self) -> &DeliveryTarget {
        &self.target
    }

    /// This target's dead-letter sink.
    #[must_use]
    pub fn dead_letters(&self) -> &Arc<dyn DeadLetterSink> {
        &self.dead_letters
    }

    /// Run the attempt sequence for one event.
    ///
    /// At most `retry_attempts + 1` attempts are made, one at a time. On
    /// exhaustion exactly one dead-letter entry is written carrying the last
    /// failure reason.
    pub async fn deliver(&self, args: &MutationArgs) -> DeliveryOutcome {
        let target = &self.target;
        let transport = &self.transport;

        let result = retry_with_backoff(&self.policy, |attempt| {
            let span = info_span!("delivery_attempt", target_id = %target.id, attempt);
            async move {
                let started = Instant::now();
                let result = transport.invoke(target, args).await;
                DeliveryMetrics::record_attempt(target.id.as_str(), started.elapsed());

                if let Err(err) = &result {
                    DeliveryMetrics::record_failure(target.id.as_str());
                    tracing::warn!(error = %err, "Delivery attempt failed");
                }
                result
            }
            .instrument(span)
        })
        .await;

        match result {
            Ok(Succeeded { value, attempts }) => {
                DeliveryMetrics::record_success(target.id.as_str());
                tracing::info!(
                    target_id = %target.id,
                    attempts,
                    order_id = %value.order_id,
                    "Delivered status update"
                );
                DeliveryOutcome {
                    target_id: target.id.clone(),
                    attempts,
                    status: DeliveryStatus::Delivered(value),
                }
            }
            Err(Exhausted { last_error, attempts }) => {
                self.dead_letter(args.to_json(), last_error.to_string(), attempts)
                    .await
            }
        }
    }

    /// Record a failure for this target without attempting delivery.
    ///
    /// Writes one dead-letter entry with `payload` as the original payload.
    pub async fn dead_letter(
        &self,
        payload: serde_json::Value,
        reason: String,
        attempts: u32,
    ) -> DeliveryOutcome {
        let target_id = self.target.id.clone();
        let entry = DeadLetterEntry::new(
            target_id.clone(),
            payload,
            reason.clone(),
            attempts,
            self.clock.now(),
        );

        let status = match self.dead_letters.append(entry).await {
            Ok(()) => {
                DeadLetterMetrics::record_entry(target_id.as_str());
                tracing::warn!(
                    target_id = %target_id,
                    queue = %self.dead_letters.name(),
                    attempts,
                    reason = %reason,
                    "Delivery dead-lettered"
                );
                DeliveryStatus::DeadLettered { reason }
            }
            Err(err) => {
                DeadLetterMetrics::record_write_failure(target_id.as_str());
                tracing::error!(
                    target_id = %target_id,
                    queue = %self.dead_letters.name(),
                    reason = %reason,
                    error = %err,
                    "Dead letter write failed, delivery lost"
                );
                DeliveryStatus::DeadLetterLost {
                    reason,
                    write_error: err.to_string(),
                }
            }
        };

        DeliveryOutcome {
            target_id,
            attempts,
            status,
        }
    }
}

/// Sends each event to every target independently.
#[derive(Debug, Clone, Default)]
pub struct FanOutDispatcher {
    workers: Vec<Arc<TargetWorker>>,
}

impl FanOutDispatcher {
    /// Dispatcher with no targets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target worker.
    #[must_use]
    pub fn with_worker(mut self, worker: TargetWorker) -> Self {
        self.push(worker);
        self
    }

    /// Add a target worker.
    pub fn push(&mut self, worker: TargetWorker) {
        self.workers.push(Arc::new(worker));
    }

    /// Configured targets, in dispatch order.
    pub fn targets(&self) -> impl Iterator<Item = &DeliveryTarget> {
        self.workers.iter().map(|worker| worker.target())
    }

    /// Configured workers, in dispatch order.
    #[must_use]
    pub fn workers(&self) -> &[Arc<TargetWorker>] {
        &self.workers
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no target is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Deliver `args` to every target concurrently.
    ///
    /// Each target runs on its own task. Returns one outcome per target, in
    /// target order, once every attempt sequence has finished.
    pub async fn dispatch(&self, args: MutationArgs) -> Vec<DeliveryOutcome> {
        let args = Arc::new(args);

        let handles: Vec<_> = self
            .workers
            .iter()
            .map(|worker| {
                let worker = Arc::clone(worker);
                let args = Arc::clone(&args);
                tokio::spawn(async move { worker.deliver(&args).await })
            })
            .collect();

        let results = futures::future::join_all(handles).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for (worker, result) in self.workers.iter().zip(results) {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(target_id = %worker.target().id, error = %err, "Delivery task aborted");
                    worker
                        .dead_letter(args.to_json(), format!("delivery task aborted: {err}"), 0)
                        .await
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Count a failure on every target without attempting delivery.
    ///
    /// Used when an event matched but its arguments could not be extracted.
    pub async fn fail_all(&self, payload: &serde_json::Value, reason: &str) -> Vec<DeliveryOutcome> {
        futures::future::join_all(
            self.workers
                .iter()
                .map(|worker| worker.dead_letter(payload.clone(), reason.to_string(), 0)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::dead_letter::InMemoryDeadLetterQueue;
    use status_relay_core::{Credential, DeliveryError, StatusUpdate, gateway};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then echoes.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl MutationTransport for Flaky {
        fn invoke<'a>(
            &'a self,
            _target: &'a DeliveryTarget,
            args: &'a MutationArgs,
        ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate, DeliveryError>> + Send + 'a>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call <= self.failures {
                    Err(DeliveryError::Network(format!("failure {call}")))
                } else {
                    Ok(gateway::publish(args)?)
                }
            })
        }
    }

    fn args() -> MutationArgs {
        MutationArgs::new()
            .with("orderID", "123")
            .with("status", "SHIPPED")
            .with("prevStatus", "IN_PROGRESS")
            .with("updatedAt", "2024-01-01T00:00:00Z")
    }

    fn worker(retries: u32, failures: u32) -> (TargetWorker, Arc<Flaky>, Arc<InMemoryDeadLetterQueue>) {
        let transport = Arc::new(Flaky {
            failures,
            calls: AtomicU32::new(0),
        });
        let dlq = Arc::new(InMemoryDeadLetterQueue::new("primary-dlq", 10));
        let target = DeliveryTarget::new("primary", "local", Credential::api_key("k"))
            .with_retry_attempts(retries);
        (
            TargetWorker::new(target, transport.clone(), dlq.clone()),
            transport,
            dlq,
        )
    }

    #[tokio::test]
    async fn delivers_on_first_attempt() {
        let (worker, transport, dlq) = worker(0, 0);

        let outcome = worker.deliver(&args()).await;

        assert!(outcome.is_delivered());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let (worker, transport, dlq) = worker(2, 2);

        let outcome = worker.deliver(&args()).await;

        assert!(outcome.is_delivered());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn exhaustion_writes_one_entry_with_last_reason() {
        let (worker, transport, dlq) = worker(1, u32::MAX);

        let outcome = worker.deliver(&args()).await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            outcome.status,
            DeliveryStatus::DeadLettered {
                reason: "Network error: failure 2".into()
            }
        );

        let entries = dlq.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 2);
        assert_eq!(entries[0].original_payload, args().to_json());
        assert_eq!(entries[0].target_id.as_str(), "primary");
    }

    #[tokio::test]
    async fn fail_all_dead_letters_every_target_without_attempts() {
        let (primary, primary_transport, primary_dlq) = worker(3, 0);
        let (debug, _, debug_dlq) = worker(0, 0);
        let dispatcher = FanOutDispatcher::new().with_worker(primary).with_worker(debug);

        let payload = serde_json::json!({"source": "orders.system"});
        let outcomes = dispatcher.fail_all(&payload, "missing order-id").await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.attempts == 0 && !o.is_delivered()));
        assert_eq!(primary_transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(primary_dlq.snapshot()[0].original_payload, payload);
        assert_eq!(debug_dlq.len(), 1);
    }

    #[tokio::test]
    async fn dispatch_returns_outcomes_in_target_order() {
        let (failing, _, failing_dlq) = worker(0, u32::MAX);
        let (healthy, _, healthy_dlq) = worker(0, 0);
        let dispatcher = FanOutDispatcher::new().with_worker(failing).with_worker(healthy);

        let outcomes = dispatcher.dispatch(args()).await;

        assert!(!outcomes[0].is_delivered());
        assert!(outcomes[1].is_delivered());
        assert_eq!(failing_dlq.len(), 1);
        assert!(healthy_dlq.is_empty());
    }
}
