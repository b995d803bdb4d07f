//! # Status Relay Runtime
//!
//! Async machinery around the pure pipeline in `status-relay-core`.
//!
//! ## Core Components
//!
//! - **`EventRelay`**: rule match → field extraction → fan-out, behind a
//!   fire-and-forget publish point
//! - **`FanOutDispatcher`**: concurrent, isolated per-target delivery with
//!   bounded retry and dead-letter capture
//! - **`MutationGateway`**: the stateless echo resolver plus its broadcast
//!   side effect
//! - **`SubscriptionBroadcaster`**: explicit subscriber registry
//! - **`HttpTransport`**: reqwest client posting the mutation to a target
//! - **Dead-letter sinks**: bounded in-memory and JSON-lines file queues
//!
//! ## Example
//!
//! ```no_run
//! use status_relay_core::{Credential, DeliveryTarget, MappingTable, Rule};
//! use status_relay_runtime::dead_letter::InMemoryDeadLetterQueue;
//! use status_relay_runtime::dispatcher::{FanOutDispatcher, TargetWorker};
//! use status_relay_runtime::gateway::{LocalTransport, MutationGateway};
//! use status_relay_runtime::relay::EventRelay;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let gateway = MutationGateway::new();
//! let target = DeliveryTarget::new("primary", "local", Credential::api_key("key"));
//! let dispatcher = FanOutDispatcher::new().with_worker(TargetWorker::new(
//!     target,
//!     Arc::new(LocalTransport::new(gateway.clone())),
//!     Arc::new(InMemoryDeadLetterQueue::new("primary-dlq", 1000)),
//! ));
//!
//! let relay = EventRelay::new(Rule::order_status_updates(), MappingTable::status_update(), dispatcher);
//! let (publisher, handle) = relay.spawn(1024);
//! # drop(publisher);
//! # handle.shutdown(std::time::Duration::from_secs(5)).await.ok();
//! # }
//! ```

use serde::Serialize;

/// Fan-out of mapped arguments to every target
pub mod dispatcher;

/// Dead-letter sinks and registry
pub mod dead_letter;

/// Channel-scoped subscriber registry
pub mod broadcast;

/// Echo resolver service with broadcast
pub mod gateway;

/// Prometheus metrics for observability
pub mod metrics;

/// Event intake and the relay loop
pub mod relay;

/// Retry logic with optional exponential backoff
pub mod retry;

/// HTTP delivery transport
pub mod transport;

pub use broadcast::{Subscription, SubscriptionBroadcaster};
pub use dead_letter::{DeadLetterRegistry, FileDeadLetterQueue, InMemoryDeadLetterQueue};
pub use dispatcher::{FanOutDispatcher, TargetWorker};
pub use gateway::{LocalTransport, MutationGateway};
pub use relay::{EventPublisher, EventRelay, RelayError, RelayHandle, RelayOutcome};
pub use retry::{Backoff, RetryPolicy};
pub use transport::{HttpTransport, TransportConfig};

/// Health check status levels
///
/// Indicates the current health state of a component or system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is operational but needs attention (e.g. undelivered
    /// dead-letter entries)
    Degraded,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if status is degraded
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Degraded)
    }

    /// Check if status is unhealthy
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }

    /// Get the worst status between two statuses
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Optional metadata (e.g., queue sizes)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<(String, String)>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
            metadata: Vec::new(),
        }
    }

    /// Create a degraded check result
    #[must_use]
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Add metadata to the health check
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

/// Aggregated health report
///
/// Combines multiple health checks into an overall system status.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall system status (worst of all checks)
    pub status: HealthStatus,

    /// Individual component checks
    pub checks: Vec<HealthCheck>,

    /// Timestamp when report was generated
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    /// Create a new health report from checks
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        Self {
            status,
            checks,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Check if overall system is healthy
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    /// Check if overall system is degraded
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.status.is_degraded()
    }

    /// Check if overall system is unhealthy
    #[must_use]
    pub const fn is_unhealthy(&self) -> bool {
        self.status.is_unhealthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_status_wins() {
        assert_eq!(HealthStatus::Healthy.worst(HealthStatus::Degraded), HealthStatus::Degraded);
        assert_eq!(HealthStatus::Degraded.worst(HealthStatus::Unhealthy), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::Healthy.worst(HealthStatus::Healthy), HealthStatus::Healthy);
    }

    #[test]
    fn empty_report_is_healthy() {
        assert!(HealthReport::new(Vec::new()).is_healthy());
    }

    #[test]
    fn report_takes_worst_check() {
        let report = HealthReport::new(vec![
            HealthCheck::healthy("relay"),
            HealthCheck::degraded("dead_letter_queue:primary-dlq", "3 undelivered entries"),
        ]);
        assert!(report.is_degraded());
        assert_eq!(report.checks.len(), 2);
    }
}
