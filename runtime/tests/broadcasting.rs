//! Subscription broadcast through the mutation gateway.

#![allow(clippy::unwrap_used)]

use status_relay_core::MutationArgs;
use status_relay_runtime::MutationGateway;
use status_relay_testing::fixtures;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
async fn every_subscriber_gets_the_echo() {
    let gateway = MutationGateway::new();
    let mut subscribers: Vec<_> = (0..10).map(|_| gateway.subscribe()).collect();

    let update = gateway.publish_status_update(&fixtures::scenario_args()).unwrap();

    for subscriber in &mut subscribers {
        assert_eq!(subscriber.recv().await.as_ref(), Some(&update));
    }
}

#[tokio::test]
async fn subscribers_joining_later_see_only_later_updates() {
    let gateway = MutationGateway::new();
    gateway.publish_status_update(&fixtures::scenario_args()).unwrap();

    let mut late = gateway.subscribe();
    let second = fixtures::scenario_args().with("orderID", "456");
    gateway.publish_status_update(&second).unwrap();

    assert_eq!(late.recv().await.unwrap().order_id, "456");
    assert!(late.try_recv().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disconnects_during_broadcast_do_not_affect_others() {
    let gateway = MutationGateway::new();
    let received = Arc::new(AtomicUsize::new(0));

    // Stable subscribers count what they receive.
    let mut stable = Vec::new();
    for _ in 0..5 {
        let mut subscription = gateway.subscribe();
        let received = Arc::clone(&received);
        stable.push(tokio::spawn(async move {
            for _ in 0..20 {
                if subscription.recv().await.is_some() {
                    received.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));
    }

    // Churning subscribers come and go while updates are published.
    let churn_gateway = gateway.clone();
    let churn = tokio::spawn(async move {
        for _ in 0..200 {
            let subscription = churn_gateway.subscribe();
            tokio::task::yield_now().await;
            drop(subscription);
        }
    });

    for i in 0..20 {
        let args: MutationArgs = fixtures::scenario_args().with("orderID", format!("order-{i}"));
        gateway.publish_status_update(&args).unwrap();
        tokio::task::yield_now().await;
    }

    churn.await.unwrap();
    for handle in stable {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    assert_eq!(received.load(Ordering::SeqCst), 5 * 20);
    assert_eq!(gateway.subscriber_count(), 0);
}

#[tokio::test]
async fn broadcast_preserves_publish_order_per_subscriber() {
    let gateway = MutationGateway::new();
    let mut subscriber = gateway.subscribe();

    for i in 0..5 {
        gateway
            .publish_status_update(&fixtures::scenario_args().with("orderID", i.to_string()))
            .unwrap();
    }

    for i in 0..5 {
        assert_eq!(subscriber.recv().await.unwrap().order_id, i.to_string());
    }
}
