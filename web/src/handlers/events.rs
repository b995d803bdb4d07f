//! Event ingress: the HTTP face of the relay's publish point.
//!
//! # Endpoint
//!
//! ```text
//! POST /events
//! ```
//!
//! Accepts one event or a batch:
//!
//! ```json
//! {
//!   "entries": [
//!     {
//!       "source": "orders.system",
//!       "detailType": "Order Status Update",
//!       "detail": { "order-id": "123", "status": "SHIPPED", "prev-status": "IN_PROGRESS" },
//!       "time": "2024-01-01T00:00:00Z"
//!     }
//!   ]
//! }
//! ```
//!
//! Returns `202 Accepted` with `{ "accepted": <count> }` once every event is
//! queued. Matching, delivery and failures happen afterwards and are never
//! reported back to the publisher.

use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State, extract::rejection::JsonRejection, http::StatusCode};
use serde::{Deserialize, Serialize};
use status_relay_core::DomainEvent;

/// Body of `POST /events`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PublishRequest {
    /// `{ "entries": [...] }`
    Batch {
        /// Events in publish order
        entries: Vec<DomainEvent>,
    },
    /// A bare event
    Single(DomainEvent),
}

impl PublishRequest {
    fn into_events(self) -> Vec<DomainEvent> {
        match self {
            Self::Batch { entries } => entries,
            Self::Single(event) => vec![event],
        }
    }
}

/// Body of the `202` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Events queued by this request
    pub accepted: usize,
}

/// Queue events for relaying.
///
/// # Errors
///
/// Returns `400` for an unreadable body and `503` once the relay has shut
/// down. Events queued before the failure stay queued.
pub async fn publish(
    State(state): State<AppState>,
    request: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublishResponse>), AppError> {
    let Json(request) = request?;
    let events = request.into_events();

    let mut accepted = 0;
    for event in events {
        if let Err(err) = state.publisher.publish(event).await {
            tracing::warn!(accepted, error = %err, "Event ingress stopped early");
            return Err(err.into());
        }
        accepted += 1;
    }

    tracing::debug!(accepted, "Events queued");
    Ok((StatusCode::ACCEPTED, Json(PublishResponse { accepted })))
}
