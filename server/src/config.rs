//! Configuration management for the relay server.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Values come through a lookup function so tests can inject them without
//! touching the process environment.
//!
//! `RELAY_RULE_SOURCES` and `RELAY_RULE_DETAIL_TYPES` are comma-separated with
//! no escaping, so a source or detail-type containing a comma cannot be
//! configured. Surrounding whitespace is trimmed from each item.

use serde::Deserialize;
use status_relay_core::{Credential, DeliveryTarget, Rule};
use status_relay_runtime::dead_letter::DEFAULT_CAPACITY;
use status_relay_runtime::retry::Backoff;
use std::collections::HashSet;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration could not be loaded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set to something unusable.
    #[error("Invalid value for {key} ('{value}'): {reason}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Offending value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// The targets file could not be read or parsed.
    #[error("Failed to load targets file {path}: {reason}")]
    TargetsFile {
        /// File path
        path: String,
        /// Underlying error
        reason: String,
    },

    /// A target definition is unusable.
    #[error("Invalid target '{id}': {reason}")]
    InvalidTarget {
        /// Target id
        id: String,
        /// Why it was rejected
        reason: String,
    },

    /// No delivery target is configured.
    #[error("At least one delivery target is required")]
    NoTargets,

    /// Two targets share an id.
    #[error("Duplicate target id '{0}'")]
    DuplicateTarget(String),

    /// Two targets share a dead-letter queue.
    #[error("Dead-letter queue '{0}' is used by more than one target")]
    DuplicateDeadLetterQueue(String),
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Credential required on protected routes and sent by default targets
    pub api_key: Option<String>,
    /// Event pattern, from the comma-separated `RELAY_RULE_SOURCES` and
    /// `RELAY_RULE_DETAIL_TYPES` (items cannot contain a comma)
    pub rule: Rule,
    /// Delivery targets
    pub targets: Vec<DeliveryTarget>,
    /// Delay between attempts against one target
    pub backoff: Backoff,
    /// Per-attempt HTTP timeout
    pub delivery_timeout: Duration,
    /// Dead-letter storage
    pub dead_letters: DeadLetterConfig,
    /// Ingress channel capacity
    pub event_buffer: usize,
    /// Install the Prometheus recorder and serve `/metrics`
    pub metrics_enabled: bool,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Time allowed for in-flight events to drain on shutdown
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Dead-letter storage configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterConfig {
    /// Directory for JSON-lines queues; in-memory when `None`
    pub dir: Option<PathBuf>,
    /// Capacity of each in-memory queue
    pub capacity: usize,
}

/// One entry of the targets file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TargetDefinition {
    id: String,
    endpoint: String,
    #[serde(default)]
    credential: Option<Credential>,
    #[serde(default)]
    retry_attempts: Option<u32>,
    #[serde(default)]
    dead_letter_queue: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is invalid, the targets file
    /// cannot be used, or two targets collide.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let server = ServerConfig {
            host: get("RELAY_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(&get, "RELAY_PORT", 8080)?,
            shutdown_timeout: Duration::from_secs(parse(&get, "RELAY_SHUTDOWN_TIMEOUT_SECS", 30)?),
        };

        let api_key = get("RELAY_API_KEY");

        let rule = Rule::new(
            list(&get, "RELAY_RULE_SOURCES", "orders.system")?,
            list(&get, "RELAY_RULE_DETAIL_TYPES", "Order Status Update")?,
        );

        let retry_attempts = parse(&get, "RELAY_RETRY_ATTEMPTS", 0)?;
        let credential = Credential::api_key(api_key.clone().unwrap_or_default());
        let targets = match get("RELAY_TARGETS_FILE") {
            Some(path) => load_targets(&path, &credential, retry_attempts)?,
            None => default_targets(&get, server.port, &credential, retry_attempts),
        };
        validate_targets(&targets)?;

        let initial_ms: u64 = parse(&get, "RELAY_BACKOFF_INITIAL_MS", 0)?;
        let backoff = if initial_ms == 0 {
            Backoff::none()
        } else {
            let multiplier: f64 = parse(&get, "RELAY_BACKOFF_MULTIPLIER", 2.0)?;
            if !(multiplier.is_finite() && multiplier >= 1.0) {
                return Err(ConfigError::Invalid {
                    key: "RELAY_BACKOFF_MULTIPLIER",
                    value: multiplier.to_string(),
                    reason: "must be a finite number >= 1.0".into(),
                });
            }
            Backoff::exponential(Duration::from_millis(initial_ms))
                .with_max_delay(Duration::from_millis(parse(&get, "RELAY_BACKOFF_MAX_MS", 30_000)?))
                .with_multiplier(multiplier)
                .with_jitter(flag(&get, "RELAY_BACKOFF_JITTER", false)?)
        };

        let delivery_timeout = Duration::from_secs(positive(&get, "RELAY_DELIVERY_TIMEOUT_SECS", 10)?);

        let dead_letters = DeadLetterConfig {
            dir: get("RELAY_DLQ_DIR").map(PathBuf::from),
            capacity: positive(&get, "RELAY_DLQ_CAPACITY", DEFAULT_CAPACITY as u64)?
                .try_into()
                .unwrap_or(usize::MAX),
        };

        Ok(Self {
            server,
            api_key,
            rule,
            targets,
            backoff,
            delivery_timeout,
            dead_letters,
            event_buffer: positive(&get, "RELAY_EVENT_BUFFER", 1024)?
                .try_into()
                .unwrap_or(usize::MAX),
            metrics_enabled: flag(&get, "RELAY_METRICS_ENABLED", true)?,
        })
    }
}

fn parse<T, F>(get: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    get(key).map_or(Ok(default), |value| {
        value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            key,
            reason: err.to_string(),
            value,
        })
    })
}

fn positive<F>(get: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse(get, key, default)? {
        0 => Err(ConfigError::Invalid {
            key,
            value: "0".into(),
            reason: "must be greater than zero".into(),
        }),
        value => Ok(value),
    }
}

fn flag<F>(get: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = get(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value,
            reason: "expected true or false".into(),
        }),
    }
}

fn list<F>(get: &F, key: &'static str, default: &str) -> Result<Vec<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = get(key).unwrap_or_else(|| default.to_string());
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        return Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "expected a comma-separated list".into(),
        });
    }
    Ok(items)
}

/// Primary target at this relay's own `/graphql`, plus the debug target
/// when one is configured.
fn default_targets<F>(get: &F, port: u16, credential: &Credential, retry_attempts: u32) -> Vec<DeliveryTarget>
where
    F: Fn(&str) -> Option<String>,
{
    let primary_endpoint =
        get("RELAY_PRIMARY_ENDPOINT").unwrap_or_else(|| format!("http://127.0.0.1:{port}/graphql"));
    let mut targets = vec![
        DeliveryTarget::new("primary", primary_endpoint, credential.clone()).with_retry_attempts(retry_attempts),
    ];
    if let Some(debug_endpoint) = get("RELAY_DEBUG_ENDPOINT") {
        targets.push(
            DeliveryTarget::new("debug", debug_endpoint, credential.clone()).with_retry_attempts(retry_attempts),
        );
    }
    targets
}

fn load_targets(path: &str, credential: &Credential, retry_attempts: u32) -> Result<Vec<DeliveryTarget>, ConfigError> {
    let file_error = |reason: String| ConfigError::TargetsFile {
        path: path.to_string(),
        reason,
    };
    let raw = std::fs::read_to_string(path).map_err(|err| file_error(err.to_string()))?;
    let definitions: Vec<TargetDefinition> =
        serde_json::from_str(&raw).map_err(|err| file_error(err.to_string()))?;

    Ok(definitions
        .into_iter()
        .map(|definition| {
            let mut target = DeliveryTarget::new(
                definition.id.as_str(),
                definition.endpoint,
                definition.credential.unwrap_or_else(|| credential.clone()),
            )
            .with_retry_attempts(definition.retry_attempts.unwrap_or(retry_attempts));
            if let Some(queue) = definition.dead_letter_queue {
                target = target.with_dead_letter_queue(queue);
            }
            target
        })
        .collect())
}

fn validate_targets(targets: &[DeliveryTarget]) -> Result<(), ConfigError> {
    if targets.is_empty() {
        return Err(ConfigError::NoTargets);
    }

    let mut ids = HashSet::new();
    let mut queues = HashSet::new();
    for target in targets {
        if !(target.endpoint.starts_with("http://") || target.endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidTarget {
                id: target.id.to_string(),
                reason: format!("endpoint '{}' is not an http(s) URL", target.endpoint),
            });
        }
        if !ids.insert(target.id.as_str()) {
            return Err(ConfigError::DuplicateTarget(target.id.to_string()));
        }
        if !queues.insert(target.dead_letter_queue.as_str()) {
            return Err(ConfigError::DuplicateDeadLetterQueue(target.dead_letter_queue.clone()));
        }
    }
    Ok(())
}
