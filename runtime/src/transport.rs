//! HTTP transport posting `publishStatusUpdate` to a target endpoint.
//!
//! Each call is one attempt. Failures are classified so the dead-letter
//! reason says what actually went wrong:
//!
//! | outcome | error |
//! |---------|-------|
//! | request timed out | [`DeliveryError::Timeout`] |
//! | connect / network failure | [`DeliveryError::Network`] |
//! | non-2xx status | [`DeliveryError::HttpStatus`] |
//! | GraphQL `errors` array | [`DeliveryError::Rejected`] |
//! | 2xx without a valid echo | [`DeliveryError::MalformedResponse`] |

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use status_relay_core::mutation::PUBLISH_STATUS_UPDATE;
use status_relay_core::{
    DeliveryError, DeliveryTarget, GraphqlRequest, GraphqlResponse, MutationArgs, MutationTransport,
    StatusUpdate,
};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{Instrument, info_span};

/// Longest response body excerpt kept in an error.
const MAX_ERROR_BODY: usize = 512;

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: concat!("status-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// reqwest-backed [`MutationTransport`].
///
/// The underlying client pools connections and is shared by every target.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    /// Build a transport.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if the HTTP client cannot be
    /// built.
    pub fn new(config: TransportConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| DeliveryError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Transport with default configuration.
    ///
    /// # Errors
    ///
    /// See [`HttpTransport::new`].
    pub fn with_defaults() -> Result<Self, DeliveryError> {
        Self::new(TransportConfig::default())
    }

    async fn post(&self, target: &DeliveryTarget, args: &MutationArgs) -> Result<StatusUpdate, DeliveryError> {
        let header = HeaderName::from_bytes(target.credential.header.as_bytes()).map_err(|e| {
            DeliveryError::Configuration(format!("invalid credential header '{}': {e}", target.credential.header))
        })?;
        let mut value = HeaderValue::from_str(&target.credential.value)
            .map_err(|e| DeliveryError::Configuration(format!("invalid credential value: {e}")))?;
        value.set_sensitive(true);

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(&target.endpoint)
            .header(header, value)
            .json(&GraphqlRequest::publish_status_update(args))
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.status();
        tracing::debug!(
            status = status.as_u16(),
            duration_ms = started.elapsed().as_millis(),
            "Received response"
        );

        let body = response.text().await.map_err(|e| self.classify(&e))?;

        if !status.is_success() {
            return Err(DeliveryError::HttpStatus {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        parse_echo(&body)
    }

    fn classify(&self, err: &reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            #[allow(clippy::cast_possible_truncation)]
            let timeout_ms = self.config.timeout.as_millis() as u64;
            DeliveryError::Timeout { timeout_ms }
        } else if err.is_connect() {
            DeliveryError::Network(format!("connection failed: {err}"))
        } else if err.is_builder() {
            DeliveryError::Configuration(err.to_string())
        } else {
            DeliveryError::Network(err.to_string())
        }
    }
}

impl MutationTransport for HttpTransport {
    fn invoke<'a>(
        &'a self,
        target: &'a DeliveryTarget,
        args: &'a MutationArgs,
    ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate, DeliveryError>> + Send + 'a>> {
        let span = info_span!(
            "http_delivery",
            target_id = %target.id,
            endpoint = %target.endpoint,
        );
        Box::pin(self.post(target, args).instrument(span))
    }
}

/// Decode a gateway response body into the echoed update.
///
/// # Errors
///
/// Returns [`DeliveryError::Rejected`] for a GraphQL `errors` array and
/// [`DeliveryError::MalformedResponse`] when the body holds no valid echo.
pub fn parse_echo(body: &str) -> Result<StatusUpdate, DeliveryError> {
    let envelope: GraphqlResponse = serde_json::from_str(body)
        .map_err(|e| DeliveryError::MalformedResponse(format!("invalid JSON envelope: {e}")))?;

    if !envelope.errors.is_empty() {
        let messages: Vec<_> = envelope.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(DeliveryError::Rejected(messages.join("; ")));
    }

    let echo = envelope
        .get(PUBLISH_STATUS_UPDATE)
        .ok_or_else(|| DeliveryError::MalformedResponse(format!("missing data.{PUBLISH_STATUS_UPDATE}")))?;

    serde_json::from_value(echo.clone())
        .map_err(|e| DeliveryError::MalformedResponse(format!("invalid StatusUpdate: {e}")))
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use status_relay_core::Status;

    #[test]
    fn parses_a_valid_echo() {
        let body = r#"{"data":{"publishStatusUpdate":{"orderID":"123","status":"SHIPPED","prevStatus":"IN_PROGRESS","updatedAt":"2024-01-01T00:00:00Z"}}}"#;
        let update = parse_echo(body).unwrap();
        assert_eq!(update.order_id, "123");
        assert_eq!(update.prev_status, Status::InProgress);
    }

    #[test]
    fn errors_array_is_a_rejection() {
        let body = r#"{"data":null,"errors":[{"message":"bad enum","errorType":"ValidationError"}]}"#;
        assert_eq!(
            parse_echo(body),
            Err(DeliveryError::Rejected("bad enum".into()))
        );
    }

    #[test]
    fn null_data_is_malformed() {
        assert!(matches!(
            parse_echo(r#"{"data":null}"#),
            Err(DeliveryError::MalformedResponse(_))
        ));
    }

    #[test]
    fn incomplete_echo_is_malformed() {
        let body = r#"{"data":{"publishStatusUpdate":{"orderID":"123"}}}"#;
        assert!(matches!(parse_echo(body), Err(DeliveryError::MalformedResponse(_))));
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(parse_echo("<html>"), Err(DeliveryError::MalformedResponse(_))));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY * 2);
        let truncated = truncate(&body);
        assert_eq!(truncated.len(), MAX_ERROR_BODY + 3);
        assert_eq!(truncate("short"), "short");
    }
}
