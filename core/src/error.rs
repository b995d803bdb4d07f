//! Error taxonomy for the relay pipeline.
//!
//! Pattern mismatches are not errors: an event that fails the rule is dropped
//! and produces nothing. Every other failure kind below is resolved inside the
//! per-target attempt sequence and never reaches the publisher.

use thiserror::Error;

/// A path expression in a mapping table could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldPathError {
    /// The expression was empty.
    #[error("Field path is empty")]
    Empty,

    /// The expression does not name a supported envelope field.
    #[error("Unsupported field path '{0}' (expected $.source, $.detail-type, $.time or $.detail.<key>)")]
    Unsupported(String),
}

/// A required value could not be extracted from the event envelope.
///
/// No delivery is attempted for the event; it counts as a failure on every
/// configured target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldExtractionError {
    /// The source path is absent from the event.
    #[error("Missing required field '{argument}' at path {path}")]
    MissingField {
        /// Mutation argument that could not be filled
        argument: String,
        /// Path that resolved to nothing
        path: String,
    },

    /// The value was present but does not parse as the declared timestamp type.
    #[error("Field '{argument}' at path {path} is not an ISO-8601 timestamp: '{value}'")]
    InvalidTimestamp {
        /// Mutation argument being filled
        argument: String,
        /// Path the value came from
        path: String,
        /// The offending raw value
        value: String,
    },
}

/// The mutation gateway rejected its arguments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A non-null argument was not supplied.
    #[error("Missing required argument '{0}'")]
    MissingArgument(String),

    /// An enum argument is outside the `Status` enumeration.
    #[error("Argument '{argument}' has invalid value '{value}' for enum Status")]
    InvalidEnumValue {
        /// Argument name
        argument: String,
        /// The rejected value
        value: String,
    },

    /// A `DateTime` argument does not parse.
    #[error("Argument '{argument}' has invalid DateTime value '{value}'")]
    InvalidDateTime {
        /// Argument name
        argument: String,
        /// The rejected value
        value: String,
    },

    /// The argument is not declared on the operation.
    #[error("Unknown argument '{0}' on field publishStatusUpdate")]
    UnknownArgument(String),
}

/// A single delivery attempt against one target failed.
///
/// All variants are retried within the target's budget; `Validation` is
/// included because a gateway rejection follows the same retry and
/// dead-letter path as a transport failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The attempt did not complete within the transport timeout.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds
        timeout_ms: u64,
    },

    /// Connection or other network level failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("Endpoint returned HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// The endpoint answered with a GraphQL `errors` array.
    #[error("Mutation rejected: {0}")]
    Rejected(String),

    /// The gateway rejected the arguments.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The response was not a well-formed `StatusUpdate` echo.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The target is misconfigured (bad endpoint, bad credential header).
    #[error("Target configuration error: {0}")]
    Configuration(String),
}

/// A dead-letter queue could not be written or read.
///
/// Losing a dead-letter write is reported but never fatal to the relay.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterError {
    /// Underlying storage I/O failed.
    #[error("Dead letter storage error: {0}")]
    Io(String),

    /// An entry could not be encoded or decoded.
    #[error("Dead letter serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for DeadLetterError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DeadLetterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
