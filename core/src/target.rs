//! Delivery target configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a delivery target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Wrap a target name.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Header-borne credential sent with every attempt against a target.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Header name, `x-api-key` by default
    #[serde(default = "default_header")]
    pub header: String,
    /// Secret value
    pub value: String,
}

fn default_header() -> String {
    Credential::API_KEY_HEADER.to_string()
}

impl Credential {
    /// Default credential header.
    pub const API_KEY_HEADER: &'static str = "x-api-key";

    /// An `x-api-key` credential.
    #[must_use]
    pub fn api_key(value: impl Into<String>) -> Self {
        Self {
            header: Self::API_KEY_HEADER.to_string(),
            value: value.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("header", &self.header)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// One independent sink for mutation calls.
///
/// Targets share nothing: each has its own retry budget and its own
/// dead-letter queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryTarget {
    /// Target identifier
    pub id: TargetId,
    /// URL the mutation is posted to
    pub endpoint: String,
    /// Credential header
    pub credential: Credential,
    /// Additional attempts after the first failure
    #[serde(default)]
    pub retry_attempts: u32,
    /// Name of this target's dead-letter queue
    pub dead_letter_queue: String,
}

impl DeliveryTarget {
    /// New target with no retries and a dead-letter queue named `<id>-dlq`.
    #[must_use]
    pub fn new(id: impl Into<TargetId>, endpoint: impl Into<String>, credential: Credential) -> Self {
        let id = id.into();
        let dead_letter_queue = format!("{id}-dlq");
        Self {
            id,
            endpoint: endpoint.into(),
            credential,
            retry_attempts: 0,
            dead_letter_queue,
        }
    }

    /// Set the retry budget.
    #[must_use]
    pub const fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    /// Set the dead-letter queue name.
    #[must_use]
    pub fn with_dead_letter_queue(mut self, name: impl Into<String>) -> Self {
        self.dead_letter_queue = name.into();
        self
    }

    /// Total attempts allowed: `retry_attempts + 1`.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.retry_attempts.saturating_add(1)
    }
}
