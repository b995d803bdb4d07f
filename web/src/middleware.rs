//! Axum middleware for credential checks and request tracing.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::post};
//! use status_relay_web::middleware::api_key_layer;
//!
//! let app = Router::new()
//!     .route("/graphql", post(graphql))
//!     .route_layer(api_key_layer(Some("secret".into())));
//! ```
//!
//! # Flow
//!
//! 1. **Read** the `x-api-key` header
//! 2. **Compare** it with the configured key
//! 3. **Reject** with `401` on mismatch, otherwise call the inner service

use crate::error::AppError;
use axum::{extract::Request, response::IntoResponse, response::Response};
use status_relay_core::Credential;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};

/// Header carrying the relay credential.
pub const API_KEY_HEADER: &str = Credential::API_KEY_HEADER;

/// Create a layer that requires `api_key` on every request.
///
/// With `None` the layer lets everything through; the server warns about
/// that at startup.
#[must_use]
pub fn api_key_layer(api_key: Option<Arc<str>>) -> ApiKeyLayer {
    ApiKeyLayer { api_key }
}

/// Layer for credential checks.
#[derive(Clone, Debug)]
pub struct ApiKeyLayer {
    api_key: Option<Arc<str>>,
}

impl<S> Layer<S> for ApiKeyLayer {
    type Service = ApiKeyMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyMiddleware {
            inner,
            api_key: self.api_key.clone(),
        }
    }
}

/// Middleware service for credential checks.
#[derive(Clone, Debug)]
pub struct ApiKeyMiddleware<S> {
    inner: S,
    api_key: Option<Arc<str>>,
}

impl<S> ApiKeyMiddleware<S> {
    fn authorized(&self, req: &Request) -> bool {
        let Some(expected) = self.api_key.as_deref() else {
            return true;
        };
        req.headers()
            .get(API_KEY_HEADER)
            .is_some_and(|presented| presented.as_bytes() == expected.as_bytes())
    }
}

impl<S> Service<Request> for ApiKeyMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        if !self.authorized(&req) {
            tracing::warn!(
                method = %req.method(),
                uri = %req.uri(),
                "Rejected request without a valid api key"
            );
            let response = AppError::unauthorized("Missing or invalid api key").into_response();
            return Box::pin(async move { Ok(response) });
        }

        Box::pin(self.inner.call(req))
    }
}

/// Per-request `http_request` span with method, uri and status.
#[must_use]
pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
        .on_response(DefaultOnResponse::new().level(tracing::Level::INFO))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, http::StatusCode, routing::get};
    use tower::ServiceExt;

    fn app(api_key: Option<&str>) -> Router {
        Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(api_key_layer(api_key.map(Arc::from)))
    }

    #[tokio::test]
    async fn test_missing_key_is_rejected() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app(Some("secret")).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_key_is_rejected() {
        let request = Request::builder()
            .uri("/test")
            .header(API_KEY_HEADER, "guess")
            .body(Body::empty())
            .unwrap();

        let response = app(Some("secret")).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_matching_key_passes() {
        let request = Request::builder()
            .uri("/test")
            .header(API_KEY_HEADER, "secret")
            .body(Body::empty())
            .unwrap();

        let response = app(Some("secret")).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_no_key_configured_allows_everything() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app(None).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
