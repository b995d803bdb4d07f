//! End-to-end pipeline behavior with scripted targets.

#![allow(clippy::unwrap_used, clippy::panic)]

use status_relay_core::{DeliveryError, DeliveryStatus, Status};
use status_relay_runtime::{MutationGateway, RelayOutcome};
use status_relay_testing::{Behavior, RelayTest, fixtures};

fn network_down() -> DeliveryError {
    DeliveryError::Network("connection refused".into())
}

#[tokio::test]
async fn matching_event_reaches_both_targets_with_identical_args() {
    RelayTest::new()
        .given_target(fixtures::target("primary"), Behavior::Echo)
        .given_target(fixtures::target("debug"), Behavior::Echo)
        .when_event(fixtures::scenario_event())
        .then_outcome(|outcome| {
            let RelayOutcome::Dispatched { args, outcomes } = outcome else {
                panic!("expected dispatch, got {outcome:?}");
            };
            assert_eq!(args, &fixtures::scenario_args());
            assert_eq!(outcomes.len(), 2);
            assert!(outcome.all_delivered());
        })
        .then_transport(|transport| {
            assert_eq!(transport.attempts("primary"), 1);
            assert_eq!(transport.attempts("debug"), 1);
            assert_eq!(transport.received("primary"), vec![fixtures::scenario_args()]);
            assert_eq!(transport.received("primary"), transport.received("debug"));
        })
        .then_dead_letters("primary-dlq", |entries| assert!(entries.is_empty()))
        .then_dead_letters("debug-dlq", |entries| assert!(entries.is_empty()))
        .run()
        .await;
}

#[tokio::test]
async fn other_source_produces_nothing() {
    let mut event = fixtures::scenario_event();
    event.source = "other.system".into();

    RelayTest::new()
        .given_target(fixtures::target("primary"), Behavior::Echo)
        .given_target(fixtures::target("debug"), Behavior::Echo)
        .when_event(event)
        .then_outcome(|outcome| assert_eq!(outcome, &RelayOutcome::Dropped))
        .then_transport(|transport| {
            assert_eq!(transport.attempts("primary"), 0);
            assert_eq!(transport.attempts("debug"), 0);
        })
        .then_dead_letters("primary-dlq", |entries| assert!(entries.is_empty()))
        .then_dead_letters("debug-dlq", |entries| assert!(entries.is_empty()))
        .run()
        .await;
}

#[tokio::test]
async fn failing_target_dead_letters_while_healthy_target_broadcasts() {
    let gateway = MutationGateway::new();
    let mut subscriber = gateway.subscribe();

    RelayTest::new()
        .given_gateway(gateway.clone())
        .given_target(fixtures::target("a"), Behavior::AlwaysFail(network_down()))
        .given_target(fixtures::target("b"), Behavior::Echo)
        .when_event(fixtures::scenario_event())
        .then_dead_letters("a-dlq", |entries| {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].target_id.as_str(), "a");
            assert_eq!(entries[0].original_payload, fixtures::scenario_args().to_json());
            assert_eq!(entries[0].failure_reason, "Network error: connection refused");
            assert_eq!(entries[0].attempts, 1);
        })
        .then_dead_letters("b-dlq", |entries| assert!(entries.is_empty()))
        .run()
        .await;

    let update = subscriber.try_recv().unwrap();
    assert_eq!(update.order_id, "123");
    assert_eq!(update.status, Status::Shipped);
    assert_eq!(update.prev_status, Status::InProgress);
    assert!(subscriber.try_recv().is_none(), "exactly one broadcast");
}

#[tokio::test]
async fn gateway_rejection_follows_the_retry_and_dead_letter_path() {
    let gateway = MutationGateway::new();
    let mut subscriber = gateway.subscribe();

    let mut event = fixtures::scenario_event();
    event.detail.insert("status".into(), "UNKNOWN".into());

    RelayTest::new()
        .given_gateway(gateway.clone())
        .given_target(fixtures::target("primary").with_retry_attempts(2), Behavior::Echo)
        .when_event(event)
        .then_outcome(|outcome| {
            let outcomes = outcome.outcomes();
            assert_eq!(outcomes[0].attempts, 3);
            assert!(matches!(
                &outcomes[0].status,
                DeliveryStatus::DeadLettered { reason } if reason.contains("UNKNOWN")
            ));
        })
        .then_transport(|transport| assert_eq!(transport.attempts("primary"), 3))
        .then_dead_letters("primary-dlq", |entries| {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].original_payload["status"], "UNKNOWN");
        })
        .run()
        .await;

    assert!(subscriber.try_recv().is_none(), "rejected mutation must not broadcast");
}

#[tokio::test]
async fn missing_field_counts_as_failure_on_every_target() {
    let mut event = fixtures::scenario_event();
    event.detail.remove("order-id");

    RelayTest::new()
        .given_target(fixtures::target("primary").with_retry_attempts(3), Behavior::Echo)
        .given_target(fixtures::target("debug"), Behavior::Echo)
        .when_event(event)
        .then_outcome(|outcome| {
            assert!(matches!(outcome, RelayOutcome::ExtractionFailed { .. }));
            assert_eq!(outcome.outcomes().len(), 2);
            assert!(outcome.outcomes().iter().all(|o| o.attempts == 0));
        })
        .then_transport(|transport| {
            assert_eq!(transport.attempts("primary"), 0);
            assert_eq!(transport.attempts("debug"), 0);
        })
        .then_dead_letters("primary-dlq", |entries| {
            assert_eq!(entries.len(), 1);
            assert!(entries[0].failure_reason.contains("orderID"));
            assert_eq!(entries[0].original_payload["source"], "orders.system");
        })
        .then_dead_letters("debug-dlq", |entries| assert_eq!(entries.len(), 1))
        .run()
        .await;
}

#[tokio::test]
async fn out_of_order_transition_is_relayed_as_is() {
    RelayTest::new()
        .given_target(fixtures::target("primary"), Behavior::Echo)
        .when_event(fixtures::order_status_event("9", Status::Pending, Status::Complete))
        .then_outcome(|outcome| {
            let update = outcome.outcomes()[0].delivered().unwrap();
            assert_eq!(update.status, Status::Pending);
            assert_eq!(update.prev_status, Status::Complete);
        })
        .run()
        .await;
}

#[tokio::test]
async fn replayed_event_is_delivered_again() {
    for _ in 0..2 {
        RelayTest::new()
            .given_target(fixtures::target("primary"), Behavior::Echo)
            .when_event(fixtures::scenario_event())
            .then_outcome(|outcome| assert!(outcome.all_delivered()))
            .run()
            .await;
    }
}
