//! Transport abstraction and per-target delivery outcomes.

use crate::error::DeliveryError;
use crate::mutation::MutationArgs;
use crate::status::StatusUpdate;
use crate::target::{DeliveryTarget, TargetId};
use std::future::Future;
use std::pin::Pin;

/// Invokes the mutation gateway on behalf of one target.
///
/// One call is exactly one attempt; retrying is the dispatcher's concern.
/// A successful call returns the gateway's echo.
///
/// # Dyn Compatibility
///
/// Returns a boxed future so transports can be shared as
/// `Arc<dyn MutationTransport>`.
pub trait MutationTransport: Send + Sync {
    /// Make one delivery attempt.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] on timeout, network failure, non-success
    /// response, gateway rejection or a malformed echo.
    fn invoke<'a>(
        &'a self,
        target: &'a DeliveryTarget,
        args: &'a MutationArgs,
    ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate, DeliveryError>> + Send + 'a>>;
}

/// Terminal state of one target's attempt sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// An attempt succeeded and the gateway echoed the update.
    Delivered(StatusUpdate),

    /// Every attempt failed (or none was possible) and a dead-letter entry
    /// was written.
    DeadLettered {
        /// Last failure reason
        reason: String,
    },

    /// Every attempt failed and the dead-letter write failed too.
    DeadLetterLost {
        /// Last delivery failure reason
        reason: String,
        /// Why the dead-letter write failed
        write_error: String,
    },
}

/// Result of dispatching one event to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// Target the outcome belongs to
    pub target_id: TargetId,
    /// Attempts made (zero when delivery was never attempted)
    pub attempts: u32,
    /// Terminal state
    pub status: DeliveryStatus,
}

impl DeliveryOutcome {
    /// Whether the target received the update.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self.status, DeliveryStatus::Delivered(_))
    }

    /// The echoed update, if delivered.
    #[must_use]
    pub const fn delivered(&self) -> Option<&StatusUpdate> {
        match &self.status {
            DeliveryStatus::Delivered(update) => Some(update),
            _ => None,
        }
    }
}
