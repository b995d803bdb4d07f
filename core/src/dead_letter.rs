//! Dead-letter records and the sink abstraction.

use crate::error::DeadLetterError;
use crate::target::TargetId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// A delivery that exhausted its target's retry budget.
///
/// Entries are append-only and never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    /// Target the delivery was for
    pub target_id: TargetId,
    /// Opaque copy of the mapped arguments (or of the raw event when
    /// extraction itself failed)
    pub original_payload: serde_json::Value,
    /// Reason of the last failed attempt
    pub failure_reason: String,
    /// Attempts made before giving up; zero when delivery was never attempted
    #[serde(default)]
    pub attempts: u32,
    /// When the entry was written
    pub enqueued_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    /// Create an entry.
    #[must_use]
    pub fn new(
        target_id: TargetId,
        original_payload: serde_json::Value,
        failure_reason: impl Into<String>,
        attempts: u32,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            target_id,
            original_payload,
            failure_reason: failure_reason.into(),
            attempts,
            enqueued_at,
        }
    }
}

/// A durable, append-only queue of failed deliveries for one target.
///
/// Implementations must accept concurrent `append` calls from many in-flight
/// events without interleaving or corrupting entries.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so sinks can be held as
/// `Arc<dyn DeadLetterSink>`.
pub trait DeadLetterSink: Send + Sync {
    /// Queue name.
    fn name(&self) -> &str;

    /// Append one entry.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError`] if the entry could not be persisted. The
    /// caller reports the loss but carries on.
    fn append(
        &self,
        entry: DeadLetterEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterError>> + Send + '_>>;

    /// All entries currently held, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError`] if the backing storage cannot be read.
    fn entries(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetterEntry>, DeadLetterError>> + Send + '_>>;

    /// Number of entries currently held.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError`] if the backing storage cannot be read.
    fn len(&self) -> Pin<Box<dyn Future<Output = Result<usize, DeadLetterError>> + Send + '_>> {
        Box::pin(async move { self.entries().await.map(|entries| entries.len()) })
    }
}
