//! Field mapper: turns an event envelope into mutation arguments.
//!
//! A [`MappingTable`] is a static list of `(argument, path)` pairs. Paths use
//! the envelope's JSON-path style:
//!
//! | path | resolves to |
//! |------|-------------|
//! | `$.source` | `event.source` |
//! | `$.detail-type` | `event.detail_type` |
//! | `$.time` | `event.time` |
//! | `$.detail.<key>` | `event.detail[<key>]` |
//!
//! The leading `$.` is optional. Keys may contain dashes (`$.detail.order-id`).

use crate::error::{FieldExtractionError, FieldPathError};
use crate::event::DomainEvent;
use crate::mutation::{ArgValue, MutationArgs};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A location in the event envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
    /// `$.source`
    Source,
    /// `$.detail-type`
    DetailType,
    /// `$.time`
    Time,
    /// `$.detail.<key>`
    Detail(String),
}

impl FromStr for FieldPath {
    type Err = FieldPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(FieldPathError::Empty);
        }
        let path = trimmed.strip_prefix("$.").unwrap_or(trimmed);

        match path {
            "source" => Ok(Self::Source),
            "detail-type" | "detailType" => Ok(Self::DetailType),
            "time" => Ok(Self::Time),
            _ => match path.strip_prefix("detail.") {
                Some(key) if !key.is_empty() => Ok(Self::Detail(key.to_string())),
                _ => Err(FieldPathError::Unsupported(s.to_string())),
            },
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("$.source"),
            Self::DetailType => f.write_str("$.detail-type"),
            Self::Time => f.write_str("$.time"),
            Self::Detail(key) => write!(f, "$.detail.{key}"),
        }
    }
}

impl Serialize for FieldPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Declared value type of a mapped argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Passed through as text
    #[default]
    String,
    /// Must be an ISO-8601 timestamp
    Timestamp,
}

/// One `(argument ← path)` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Mutation argument name
    pub argument: String,
    /// Source location in the envelope
    pub path: FieldPath,
    /// Declared value type
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
    /// Whether absence fails extraction
    #[serde(default = "required_by_default")]
    pub required: bool,
}

const fn required_by_default() -> bool {
    true
}

impl FieldMapping {
    /// A required string argument.
    #[must_use]
    pub fn string(argument: impl Into<String>, path: FieldPath) -> Self {
        Self {
            argument: argument.into(),
            path,
            field_type: FieldType::String,
            required: true,
        }
    }

    /// A required timestamp argument.
    #[must_use]
    pub fn timestamp(argument: impl Into<String>, path: FieldPath) -> Self {
        Self {
            argument: argument.into(),
            path,
            field_type: FieldType::Timestamp,
            required: true,
        }
    }

    /// Mark the argument optional: a missing path is skipped instead of failing.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn resolve(&self, event: &DomainEvent) -> Result<Option<ArgValue>, FieldExtractionError> {
        let raw = match &self.path {
            FieldPath::Time => {
                return Ok(Some(match self.field_type {
                    FieldType::Timestamp => ArgValue::Timestamp(event.time),
                    FieldType::String => {
                        ArgValue::Text(event.time.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                    }
                }));
            }
            FieldPath::Source => Some(event.source.as_str()),
            FieldPath::DetailType => Some(event.detail_type.as_str()),
            FieldPath::Detail(key) => event.detail.get(key).map(String::as_str),
        };

        let Some(raw) = raw else {
            return Ok(None);
        };

        match self.field_type {
            FieldType::String => Ok(Some(ArgValue::Text(raw.to_string()))),
            FieldType::Timestamp => DateTime::parse_from_rfc3339(raw)
                .map(|ts| Some(ArgValue::Timestamp(ts.with_timezone(&Utc))))
                .map_err(|_| FieldExtractionError::InvalidTimestamp {
                    argument: self.argument.clone(),
                    path: self.path.to_string(),
                    value: raw.to_string(),
                }),
        }
    }
}

/// Static mapping from event envelope to mutation arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingTable {
    fields: Vec<FieldMapping>,
}

impl MappingTable {
    /// Build a table from explicit entries.
    #[must_use]
    pub const fn new(fields: Vec<FieldMapping>) -> Self {
        Self { fields }
    }

    /// The table used for order status updates:
    /// `orderID ← detail.order-id`, `status ← detail.status`,
    /// `prevStatus ← detail.prev-status`, `updatedAt ← time`.
    #[must_use]
    pub fn status_update() -> Self {
        Self::new(vec![
            FieldMapping::string("orderID", FieldPath::Detail("order-id".into())),
            FieldMapping::string("status", FieldPath::Detail("status".into())),
            FieldMapping::string("prevStatus", FieldPath::Detail("prev-status".into())),
            FieldMapping::timestamp("updatedAt", FieldPath::Time),
        ])
    }

    /// Entries in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    /// Resolve every entry against `event`.
    ///
    /// Enum membership is not checked here; that is the gateway's job.
    ///
    /// # Errors
    ///
    /// Returns [`FieldExtractionError`] on the first required path that is
    /// absent, or on a timestamp-typed value that does not parse.
    pub fn extract(&self, event: &DomainEvent) -> Result<MutationArgs, FieldExtractionError> {
        let mut args = MutationArgs::new();
        for field in &self.fields {
            match field.resolve(event)? {
                Some(value) => args.insert(field.argument.clone(), value),
                None if field.required => {
                    return Err(FieldExtractionError::MissingField {
                        argument: field.argument.clone(),
                        path: field.path.to_string(),
                    });
                }
                None => {}
            }
        }
        Ok(args)
    }
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::status_update()
    }
}

/// Free-function form of [`MappingTable::extract`].
///
/// # Errors
///
/// See [`MappingTable::extract`].
pub fn extract(event: &DomainEvent, table: &MappingTable) -> Result<MutationArgs, FieldExtractionError> {
    table.extract(event)
}
