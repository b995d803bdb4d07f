//! Wiring from configuration to a serving app.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use status_relay_core::DeadLetterEntry;
use status_relay_server::{Config, build_app};
use status_relay_testing::fixtures;
use std::collections::HashMap;
use std::time::Duration;

fn config(vars: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

/// An address nothing listens on.
async fn dead_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/graphql")
}

fn api_key() -> (HeaderName, HeaderValue) {
    (HeaderName::from_static("x-api-key"), HeaderValue::from_static("secret"))
}

#[tokio::test]
async fn every_target_gets_its_own_queue() {
    let primary = dead_endpoint().await;
    let debug = dead_endpoint().await;
    let config = config(&[
        ("RELAY_API_KEY", "secret"),
        ("RELAY_PRIMARY_ENDPOINT", &primary),
        ("RELAY_DEBUG_ENDPOINT", &debug),
        ("RELAY_METRICS_ENABLED", "false"),
    ]);

    let app = build_app(&config, None).await.unwrap();

    let names: Vec<_> = app.dead_letters.names().collect();
    assert_eq!(names, vec!["debug-dlq", "primary-dlq"]);
}

#[tokio::test]
async fn unreachable_target_dead_letters_through_the_router() {
    let primary = dead_endpoint().await;
    let config = config(&[("RELAY_API_KEY", "secret"), ("RELAY_PRIMARY_ENDPOINT", &primary)]);
    let app = build_app(&config, None).await.unwrap();
    let dead_letters = app.dead_letters.clone();
    let server = TestServer::new(app.router).unwrap();

    let (name, value) = api_key();
    server
        .post("/events")
        .add_header(name.clone(), value.clone())
        .json(&fixtures::scenario_event())
        .await
        .assert_status(StatusCode::ACCEPTED);

    let sink = dead_letters.get("primary-dlq").unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        while sink.len().await.unwrap() == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("dead-letter entry within timeout");

    let entries: Vec<DeadLetterEntry> = server
        .get("/dead-letters/primary-dlq")
        .add_header(name, value)
        .await
        .json();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].attempts, 1);
    assert!(entries[0].failure_reason.starts_with("Network error"));

    app.relay.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn file_backed_queues_live_in_the_configured_directory() {
    let dir = tempfile::tempdir().unwrap();
    let primary = dead_endpoint().await;
    let config = config(&[
        ("RELAY_PRIMARY_ENDPOINT", &primary),
        ("RELAY_DLQ_DIR", dir.path().to_str().unwrap()),
    ]);

    let app = build_app(&config, None).await.unwrap();
    let sink = app.dead_letters.get("primary-dlq").unwrap();
    let server = TestServer::new(app.router).unwrap();

    server
        .post("/events")
        .json(&fixtures::scenario_event())
        .await
        .assert_status(StatusCode::ACCEPTED);
    app.relay.shutdown(Duration::from_secs(10)).await.unwrap();

    assert_eq!(sink.len().await.unwrap(), 1);
    let persisted = std::fs::read_to_string(dir.path().join("primary-dlq.jsonl")).unwrap();
    assert_eq!(persisted.lines().count(), 1);
}
