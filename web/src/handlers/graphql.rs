//! GraphQL-style gateway endpoint.
//!
//! Only the operations of the status-update schema are understood:
//!
//! - `publishStatusUpdate` (mutation): validate, echo, broadcast
//! - `__required` (query): placeholder, always `null`
//!
//! Arguments are taken from `variables`; inline literals in the document
//! are not parsed.
//!
//! # Endpoint
//!
//! ```text
//! POST /graphql
//! GET  /graphql/schema
//! ```
//!
//! # Response
//!
//! ```json
//! {
//!   "data": {
//!     "publishStatusUpdate": {
//!       "orderID": "123",
//!       "status": "SHIPPED",
//!       "prevStatus": "IN_PROGRESS",
//!       "updatedAt": "2024-01-01T00:00:00Z"
//!     }
//!   }
//! }
//! ```

use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State, extract::rejection::JsonRejection};
use status_relay_core::mutation::{PUBLISH_STATUS_UPDATE, REQUIRED_QUERY_FIELD, SCHEMA_SDL};
use status_relay_core::{GraphqlRequest, GraphqlResponse, MutationArgs};

/// `errorType` of argument validation failures.
pub const VALIDATION_ERROR: &str = "ValidationError";

/// `errorType` of documents selecting no known field.
pub const UNKNOWN_OPERATION: &str = "UnknownOperation";

/// Operations the gateway can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `publishStatusUpdate` mutation
    PublishStatusUpdate,
    /// `__required` placeholder query
    Required,
}

impl Operation {
    /// Resolve the operation a request document selects.
    #[must_use]
    pub fn resolve(request: &GraphqlRequest) -> Option<Self> {
        if selects(&request.query, PUBLISH_STATUS_UPDATE) {
            Some(Self::PublishStatusUpdate)
        } else if selects(&request.query, REQUIRED_QUERY_FIELD) {
            Some(Self::Required)
        } else {
            None
        }
    }
}

/// Whether `field` appears in `document` as a whole name.
fn selects(document: &str, field: &str) -> bool {
    const fn is_name_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_'
    }

    document.match_indices(field).any(|(at, _)| {
        let before = document[..at].chars().next_back();
        let after = document[at + field.len()..].chars().next();
        !before.is_some_and(is_name_char) && !after.is_some_and(is_name_char)
    })
}

/// Execute one GraphQL request.
///
/// Malformed bodies are a `400`; anything that reaches an operation is
/// answered with a `200` and a GraphQL envelope.
///
/// # Errors
///
/// Returns [`AppError`] when the body is not a GraphQL request or the echo
/// cannot be encoded.
pub async fn execute(
    State(state): State<AppState>,
    request: Result<Json<GraphqlRequest>, JsonRejection>,
) -> Result<Json<GraphqlResponse>, AppError> {
    let Json(request) = request?;

    let response = match Operation::resolve(&request) {
        Some(Operation::PublishStatusUpdate) => publish_status_update(&state, request.variables)?,
        Some(Operation::Required) => GraphqlResponse::field(REQUIRED_QUERY_FIELD, serde_json::Value::Null),
        None => {
            tracing::debug!(
                operation_name = request.operation_name.as_deref(),
                "Document selects no known operation"
            );
            GraphqlResponse::error(
                format!(
                    "Unknown operation; expected '{PUBLISH_STATUS_UPDATE}' or '{REQUIRED_QUERY_FIELD}'"
                ),
                Some(UNKNOWN_OPERATION),
            )
        }
    };

    Ok(Json(response))
}

fn publish_status_update(
    state: &AppState,
    variables: serde_json::Value,
) -> Result<GraphqlResponse, AppError> {
    let args: MutationArgs = match serde_json::from_value(variables) {
        Ok(args) => args,
        Err(err) => {
            return Ok(GraphqlResponse::error(
                format!("Variables must be an object of scalar values: {err}"),
                Some(VALIDATION_ERROR),
            ));
        }
    };

    match state.gateway.publish_status_update(&args) {
        Ok(update) => {
            let echo = serde_json::to_value(update)
                .map_err(|err| AppError::internal("Failed to encode status update").with_source(err))?;
            Ok(GraphqlResponse::field(PUBLISH_STATUS_UPDATE, echo))
        }
        Err(err) => Ok(GraphqlResponse::error(err.to_string(), Some(VALIDATION_ERROR))),
    }
}

/// Serve the schema SDL.
#[allow(clippy::unused_async)]
pub async fn schema() -> &'static str {
    SCHEMA_SDL
}
