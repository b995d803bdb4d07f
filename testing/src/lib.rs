//! # Status Relay Testing
//!
//! Testing utilities for the order status relay.
//!
//! This crate provides:
//! - Mock implementations of the clock, transport and dead-letter traits
//! - Event and target fixtures
//! - Property-based testing strategies
//! - [`RelayTest`], a Given-When-Then harness around `EventRelay`
//!
//! ## Example
//!
//! ```
//! use status_relay_testing::{Behavior, RelayTest, fixtures};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! RelayTest::new()
//!     .given_target(fixtures::target("primary"), Behavior::Echo)
//!     .when_event(fixtures::scenario_event())
//!     .then_outcome(|outcome| assert!(outcome.all_delivered()))
//!     .then_dead_letters("primary-dlq", |entries| assert!(entries.is_empty()))
//!     .run()
//!     .await;
//! # }
//! ```

#![allow(clippy::module_name_repetitions)]

use chrono::{DateTime, Utc};
use status_relay_core::environment::Clock;


pub use relay_test::RelayTest;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use status_relay_core::{
        DeadLetterEntry, DeadLetterError, DeadLetterSink, DeliveryError, DeliveryTarget,
        MutationArgs, MutationTransport, StatusUpdate, TargetId, gateway,
    };
    use status_relay_runtime::MutationGateway;
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use status_relay_testing::mocks::FixedClock;
    /// use status_relay_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// How a [`ScriptedTransport`] answers for one target.
    #[derive(Debug, Clone)]
    pub enum Behavior {
        /// Run the echo resolver (rejections surface as validation errors).
        Echo,
        /// Fail every attempt with this error.
        AlwaysFail(DeliveryError),
        /// Fail the first `n` attempts, then echo.
        FailFirst(u32, DeliveryError),
        /// Sleep, then echo.
        Slow(Duration),
    }

    #[derive(Debug, Default)]
    struct TargetLog {
        attempts: u32,
        in_flight: u32,
        max_in_flight: u32,
        received: Vec<MutationArgs>,
    }

    /// Transport whose answers are scripted per target.
    ///
    /// Records every attempt so tests can assert attempt counts, argument
    /// identity and that attempts for one target never overlap.
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        behaviors: HashMap<TargetId, Behavior>,
        gateway: Option<MutationGateway>,
        log: Mutex<HashMap<TargetId, TargetLog>>,
    }

    impl ScriptedTransport {
        /// Transport echoing for every target.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Script `target`.
        #[must_use]
        pub fn with_behavior(mut self, target: impl Into<TargetId>, behavior: Behavior) -> Self {
            self.behaviors.insert(target.into(), behavior);
            self
        }

        /// Echo through `gateway`, so successful attempts are broadcast.
        #[must_use]
        pub fn with_gateway(mut self, gateway: MutationGateway) -> Self {
            self.gateway = Some(gateway);
            self
        }

        /// Attempts made against `target`.
        #[must_use]
        pub fn attempts(&self, target: &str) -> u32 {
            self.with_log(target, |log| log.attempts)
        }

        /// Highest number of simultaneous attempts seen for `target`.
        #[must_use]
        pub fn max_concurrent_attempts(&self, target: &str) -> u32 {
            self.with_log(target, |log| log.max_in_flight)
        }

        /// Arguments received by `target`, one per attempt.
        #[must_use]
        pub fn received(&self, target: &str) -> Vec<MutationArgs> {
            self.with_log(target, |log| log.received.clone())
        }

        fn with_log<T: Default>(&self, target: &str, f: impl FnOnce(&TargetLog) -> T) -> T {
            self.log
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(&TargetId::new(target))
                .map(f)
                .unwrap_or_default()
        }

        fn begin(&self, target: &TargetId, args: &MutationArgs) -> u32 {
            let mut logs = self
                .log
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let log = logs.entry(target.clone()).or_default();
            log.attempts += 1;
            log.in_flight += 1;
            log.max_in_flight = log.max_in_flight.max(log.in_flight);
            log.received.push(args.clone());
            log.attempts
        }

        fn end(&self, target: &TargetId) {
            if let Some(log) = self
                .log
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get_mut(target)
            {
                log.in_flight = log.in_flight.saturating_sub(1);
            }
        }

        fn echo(&self, args: &MutationArgs) -> Result<StatusUpdate, DeliveryError> {
            match &self.gateway {
                Some(gateway) => Ok(gateway.publish_status_update(args)?),
                None => Ok(gateway::publish(args)?),
            }
        }
    }

    impl MutationTransport for ScriptedTransport {
        fn invoke<'a>(
            &'a self,
            target: &'a DeliveryTarget,
            args: &'a MutationArgs,
        ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate, DeliveryError>> + Send + 'a>> {
            Box::pin(async move {
                let attempt = self.begin(&target.id, args);
                // Yield so overlapping attempts would be observable.
                tokio::task::yield_now().await;

                let result = match self.behaviors.get(&target.id).unwrap_or(&Behavior::Echo) {
                    Behavior::Echo => self.echo(args),
                    Behavior::AlwaysFail(err) => Err(err.clone()),
                    Behavior::FailFirst(n, err) if attempt <= *n => Err(err.clone()),
                    Behavior::FailFirst(..) => self.echo(args),
                    Behavior::Slow(delay) => {
                        tokio::time::sleep(*delay).await;
                        self.echo(args)
                    }
                };

                self.end(&target.id);
                result
            })
        }
    }

    /// Dead-letter sink whose writes always fail.
    #[derive(Debug, Clone)]
    pub struct BrokenSink {
        name: String,
    }

    impl BrokenSink {
        /// Sink named `name`.
        #[must_use]
        pub fn new(name: impl Into<String>) -> Self {
            Self { name: name.into() }
        }
    }

    impl DeadLetterSink for BrokenSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn append(
            &self,
            _entry: DeadLetterEntry,
        ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterError>> + Send + '_>> {
            Box::pin(async { Err(DeadLetterError::Io("disk full".into())) })
        }

        fn entries(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetterEntry>, DeadLetterError>> + Send + '_>>
        {
            Box::pin(async { Err(DeadLetterError::Io("disk unreadable".into())) })
        }
    }
}

/// Event, argument and target fixtures.
pub mod fixtures {
    use super::{DateTime, Utc};
    use status_relay_core::{Credential, DeliveryTarget, DomainEvent, MutationArgs, Status};

    /// Timestamp used by every fixture event.
    pub const EVENT_TIME: &str = "2024-01-01T00:00:00Z";

    /// API key used by fixture targets.
    pub const API_KEY: &str = "test-api-key";

    /// Parsed [`EVENT_TIME`].
    #[must_use]
    pub fn event_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(EVENT_TIME)
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_default()
    }

    /// An `orders.system` / `Order Status Update` event.
    #[must_use]
    pub fn order_status_event(order_id: &str, status: Status, prev_status: Status) -> DomainEvent {
        DomainEvent::new("orders.system", "Order Status Update", event_time())
            .with_detail("order-id", order_id)
            .with_detail("status", status.as_str())
            .with_detail("prev-status", prev_status.as_str())
    }

    /// Order `123` moving from `IN_PROGRESS` to `SHIPPED`.
    #[must_use]
    pub fn scenario_event() -> DomainEvent {
        order_status_event("123", Status::Shipped, Status::InProgress)
    }

    /// Arguments [`scenario_event`] maps to.
    #[must_use]
    pub fn scenario_args() -> MutationArgs {
        MutationArgs::new()
            .with("orderID", "123")
            .with("status", "SHIPPED")
            .with("prevStatus", "IN_PROGRESS")
            .with("updatedAt", event_time())
    }

    /// A target with no retries and queue `<id>-dlq`.
    #[must_use]
    pub fn target(id: &str) -> DeliveryTarget {
        DeliveryTarget::new(id, format!("http://localhost/{id}/graphql"), Credential::api_key(API_KEY))
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use chrono::DateTime;
    use proptest::prelude::*;
    use status_relay_core::{DomainEvent, Status};

    /// Any member of the `Status` enumeration.
    pub fn arb_status() -> impl Strategy<Value = Status> {
        proptest::sample::select(Status::ALL.to_vec())
    }

    /// An order identifier.
    pub fn arb_order_id() -> impl Strategy<Value = String> {
        "[A-Za-z0-9-]{1,36}"
    }

    /// A well-formed event with the given envelope strategy.
    pub fn arb_event_from(
        source: impl Strategy<Value = String>,
        detail_type: impl Strategy<Value = String>,
    ) -> impl Strategy<Value = DomainEvent> {
        (
            source,
            detail_type,
            arb_order_id(),
            arb_status(),
            arb_status(),
            0i64..4_000_000_000,
        )
            .prop_map(|(source, detail_type, order_id, status, prev, secs)| {
                DomainEvent::new(source, detail_type, DateTime::from_timestamp(secs, 0).unwrap_or_default())
                    .with_detail("order-id", order_id)
                    .with_detail("status", status.as_str())
                    .with_detail("prev-status", prev.as_str())
            })
    }

    /// An event the default rule accepts.
    pub fn arb_matching_event() -> impl Strategy<Value = DomainEvent> {
        arb_event_from(Just("orders.system".to_string()), Just("Order Status Update".to_string()))
    }

    /// An event with an arbitrary envelope; rarely matches the default rule.
    pub fn arb_event() -> impl Strategy<Value = DomainEvent> {
        arb_event_from(
            prop_oneof![Just("orders.system".to_string()), "[a-z]{1,8}\\.[a-z]{1,8}"],
            prop_oneof![Just("Order Status Update".to_string()), "[A-Za-z ]{1,24}"],
        )
    }
}

pub use mocks::{Behavior, BrokenSink, FixedClock, ScriptedTransport, test_clock};

/// Install a `tracing` subscriber writing to the test output.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use status_relay_core::{DeliveryError, MappingTable, MutationTransport, Rule};

    #[test]
    fn fixed_clock_is_stable() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn scenario_event_maps_to_scenario_args() {
        let event = fixtures::scenario_event();
        assert!(Rule::order_status_updates().matches(&event));
        assert_eq!(
            MappingTable::status_update().extract(&event).unwrap(),
            fixtures::scenario_args()
        );
    }

    #[tokio::test]
    async fn scripted_transport_counts_attempts() {
        let transport = ScriptedTransport::new().with_behavior(
            "primary",
            Behavior::FailFirst(1, DeliveryError::Network("reset".into())),
        );
        let target = fixtures::target("primary");
        let args = fixtures::scenario_args();

        assert!(transport.invoke(&target, &args).await.is_err());
        assert!(transport.invoke(&target, &args).await.is_ok());
        assert_eq!(transport.attempts("primary"), 2);
        assert_eq!(transport.attempts("debug"), 0);
        assert_eq!(transport.received("primary"), vec![args.clone(), args]);
    }
}
