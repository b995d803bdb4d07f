//! Relay hot-path benchmarks
//!
//! - Rule match + field extraction per event
//! - Gateway echo + broadcast to subscribers
//! - Full dispatch to two in-process targets
//!
//! Run with: `cargo bench --bench relay_benchmarks`

#![allow(missing_docs)]
#![allow(clippy::expect_used)]

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use status_relay_core::{Credential, DeliveryTarget, DomainEvent, MappingTable, Rule, gateway};
use status_relay_runtime::dead_letter::InMemoryDeadLetterQueue;
use status_relay_runtime::dispatcher::{FanOutDispatcher, TargetWorker};
use status_relay_runtime::{LocalTransport, MutationGateway};
use std::sync::Arc;

fn event(source: &str) -> DomainEvent {
    DomainEvent::new(
        source,
        "Order Status Update",
        "2024-01-01T00:00:00Z".parse().expect("valid timestamp"),
    )
    .with_detail("order-id", "123")
    .with_detail("status", "SHIPPED")
    .with_detail("prev-status", "IN_PROGRESS")
}

/// Benchmark the pure pipeline in isolation
fn benchmark_match_and_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(1));

    let rule = Rule::order_status_updates();
    let mapping = MappingTable::status_update();
    let matching = event("orders.system");
    let other = event("billing.system");

    group.bench_function("match_and_extract", |b| {
        b.iter(|| {
            let event = black_box(&matching);
            if rule.matches(event) {
                let _args = mapping.extract(event);
            }
        });
    });

    group.bench_function("drop_unmatched", |b| {
        b.iter(|| rule.matches(black_box(&other)));
    });

    let args = mapping.extract(&matching).expect("extractable");
    group.bench_function("echo", |b| {
        b.iter(|| gateway::publish(black_box(&args)));
    });

    group.finish();
}

/// Benchmark broadcast fan-out to many subscribers
fn benchmark_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast");

    let args = MappingTable::status_update()
        .extract(&event("orders.system"))
        .expect("extractable");

    for subscribers in [1usize, 16, 128] {
        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_function(format!("subscribers_{subscribers}"), |b| {
            let gateway = MutationGateway::new();
            let mut subscriptions: Vec<_> = (0..subscribers).map(|_| gateway.subscribe()).collect();
            b.iter(|| {
                let _ = gateway.publish_status_update(black_box(&args));
                for subscription in &mut subscriptions {
                    let _ = subscription.try_recv();
                }
            });
        });
    }

    group.finish();
}

/// Benchmark dispatch to two in-process targets
fn benchmark_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    let transport = Arc::new(LocalTransport::new(MutationGateway::new()));
    let dispatcher = ["primary", "debug"]
        .into_iter()
        .fold(FanOutDispatcher::new(), |dispatcher, id| {
            dispatcher.with_worker(TargetWorker::new(
                DeliveryTarget::new(id, "local", Credential::api_key("bench")),
                transport.clone(),
                Arc::new(InMemoryDeadLetterQueue::new(format!("{id}-dlq"), 1000)),
            ))
        });
    let args = MappingTable::status_update()
        .extract(&event("orders.system"))
        .expect("extractable");

    group.bench_function("two_targets", |b| {
        b.to_async(&runtime)
            .iter(|| async { dispatcher.dispatch(black_box(args.clone())).await });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_match_and_extract,
    benchmark_broadcast,
    benchmark_dispatch,
);
criterion_main!(benches);
