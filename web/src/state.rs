//! Application state for Axum handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use status_relay_runtime::{DeadLetterRegistry, EventPublisher, MutationGateway};
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Echo resolver plus `onStatusUpdate` broadcaster
    pub gateway: MutationGateway,

    /// Publish point of the running relay
    pub publisher: EventPublisher,

    /// Every target's dead-letter queue, by name
    pub dead_letters: Arc<DeadLetterRegistry>,

    /// Credential required on protected routes; `None` disables the check
    pub api_key: Option<Arc<str>>,

    /// Prometheus scrape handle, when metrics are enabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new application state with auth and metrics disabled.
    #[must_use]
    pub fn new(
        gateway: MutationGateway,
        publisher: EventPublisher,
        dead_letters: Arc<DeadLetterRegistry>,
    ) -> Self {
        Self {
            gateway,
            publisher,
            dead_letters,
            api_key: None,
            metrics: None,
        }
    }

    /// Require `api_key` on protected routes.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<Arc<str>>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Expose `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("gateway", &self.gateway)
            .field("dead_letters", &self.dead_letters)
            .field("auth", &self.api_key.is_some())
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
