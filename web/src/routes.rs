//! Router configuration for the relay.

use crate::handlers::{dead_letters, events, graphql, health, realtime};
use crate::middleware::{api_key_layer, trace_layer};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// Build the complete Axum router.
///
/// Protected by the api key (when one is configured):
/// - `POST /graphql`
/// - `POST /events`
/// - `GET /dead-letters`, `GET /dead-letters/:queue`
///
/// Open:
/// - `GET /graphql/schema`, `GET /graphql/realtime`
/// - `GET /health`, `GET /health/ready`, `GET /metrics`
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/graphql", post(graphql::execute))
        .route("/events", post(events::publish))
        .route("/dead-letters", get(dead_letters::list))
        .route("/dead-letters/:queue", get(dead_letters::entries))
        .route_layer(api_key_layer(state.api_key.clone()));

    let open = Router::new()
        .route("/graphql/schema", get(graphql::schema))
        .route("/graphql/realtime", get(realtime::handle))
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics));

    protected.merge(open).layer(trace_layer()).with_state(state)
}
