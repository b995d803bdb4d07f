//! Read-only inspection of dead-letter queues.
//!
//! ```text
//! GET /dead-letters          → [{ "name": "primary-dlq", "size": 2 }, ...]
//! GET /dead-letters/:queue   → [DeadLetterEntry, ...]
//! ```

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use status_relay_core::DeadLetterEntry;

/// One queue in the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    /// Queue name
    pub name: String,
    /// Entries currently held
    pub size: usize,
}

/// List every queue with its size.
///
/// # Errors
///
/// Returns `500` if a queue cannot be read.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<QueueSummary>>, AppError> {
    let sizes = state.dead_letters.sizes().await?;
    Ok(Json(
        sizes
            .into_iter()
            .map(|(name, size)| QueueSummary { name, size })
            .collect(),
    ))
}

/// Entries of one queue, oldest first.
///
/// # Errors
///
/// Returns `404` for an unknown queue and `500` if it cannot be read.
pub async fn entries(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Json<Vec<DeadLetterEntry>>, AppError> {
    let sink = state
        .dead_letters
        .get(&queue)
        .ok_or_else(|| AppError::not_found("Dead-letter queue", &queue))?;
    Ok(Json(sink.entries().await?))
}
