//! The raw event envelope published onto the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A domain event as published by an external system.
///
/// Wire form:
///
/// ```json
/// {
///   "source": "orders.system",
///   "detailType": "Order Status Update",
///   "detail": { "order-id": "123", "status": "SHIPPED", "prev-status": "IN_PROGRESS" },
///   "time": "2024-01-01T00:00:00Z"
/// }
/// ```
///
/// `detail-type` is accepted as an alias of `detailType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    /// Originating system
    pub source: String,
    /// Event kind within the source
    #[serde(alias = "detail-type")]
    pub detail_type: String,
    /// Flat key/value payload
    #[serde(default)]
    pub detail: BTreeMap<String, String>,
    /// When the change happened
    pub time: DateTime<Utc>,
}

impl DomainEvent {
    /// Create an event with an empty detail map.
    #[must_use]
    pub fn new(source: impl Into<String>, detail_type: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            detail_type: detail_type.into(),
            detail: BTreeMap::new(),
            time,
        }
    }

    /// Add a detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }
}
