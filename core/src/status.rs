//! Order status enumeration and the broadcast payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of an order. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Order accepted, not yet worked on
    Pending,
    /// Order being prepared
    InProgress,
    /// Handed to the carrier
    Shipped,
    /// Received by the customer
    Delivered,
    /// Closed
    Complete,
}

impl Status {
    /// Every member of the enumeration, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::InProgress,
        Self::Shipped,
        Self::Delivered,
        Self::Complete,
    ];

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value is not a member of [`Status`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid Status")]
pub struct ParseStatusError(pub String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// Payload returned by `publishStatusUpdate` and pushed to `onStatusUpdate`
/// subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Order identifier
    #[serde(rename = "orderID")]
    pub order_id: String,
    /// New status
    pub status: Status,
    /// Status before the transition
    #[serde(rename = "prevStatus")]
    pub prev_status: Status,
    /// Time of the transition
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}
