//! Mutation arguments and the GraphQL-style request body carried to targets.

use crate::status::StatusUpdate;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Name of the mutation field.
pub const PUBLISH_STATUS_UPDATE: &str = "publishStatusUpdate";

/// Operation name sent with the mutation document.
pub const OPERATION_NAME: &str = "PublishStatusUpdate";

/// Subscription channel fed by successful mutations.
pub const ON_STATUS_UPDATE: &str = "onStatusUpdate";

/// Placeholder query field. Exists only so the schema has a query type.
pub const REQUIRED_QUERY_FIELD: &str = "__required";

/// Mutation document delivered to every target.
pub const PUBLISH_STATUS_UPDATE_QUERY: &str = "mutation PublishStatusUpdate($orderID:ID!, $status:Status!, $prevStatus:Status!, $updatedAt:AWSDateTime!) { publishStatusUpdate(orderID:$orderID, status:$status, prevStatus:$prevStatus, updatedAt:$updatedAt) { orderID status prevStatus updatedAt } }";

/// Schema served by the gateway.
pub const SCHEMA_SDL: &str = r#"enum Status {
  PENDING
  IN_PROGRESS
  SHIPPED
  DELIVERED
  COMPLETE
}

type StatusUpdate {
  orderID: ID!
  status: Status!
  prevStatus: Status!
  updatedAt: AWSDateTime!
}

type Query {
  __required: Boolean
}

type Mutation {
  publishStatusUpdate(orderID: ID!, status: Status!, prevStatus: Status!, updatedAt: AWSDateTime!): StatusUpdate!
}

type Subscription {
  onStatusUpdate: StatusUpdate
    @aws_subscribe(mutations: ["publishStatusUpdate"])
}
"#;

/// One extracted argument value.
///
/// Only two value types exist: plain strings and timestamps. Timestamps
/// serialize as RFC 3339 strings. Deserialization always yields
/// [`ArgValue::Text`]; the gateway parses the arguments it declares as
/// `DateTime`, so an `ID` that happens to look like a timestamp is echoed
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    /// A point in time
    Timestamp(DateTime<Utc>),
    /// Any other scalar
    Text(String),
}

impl ArgValue {
    /// String form of the value, as it appears on the wire.
    #[must_use]
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Timestamp(ts) => Cow::Owned(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Text(text) => Cow::Borrowed(text),
        }
    }
}

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::Text)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for ArgValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// Argument set for one `publishStatusUpdate` call, keyed by argument name.
///
/// Produced once per event by the field mapper and shared read-only by every
/// delivery target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationArgs(BTreeMap<String, ArgValue>);

impl MutationArgs {
    /// Empty argument set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace an argument.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up an argument.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    /// Iterate arguments in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no arguments are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Opaque JSON copy, as stored in dead-letter entries.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .map(|(name, value)| (name.to_string(), serde_json::Value::String(value.as_text().into_owned())))
                .collect(),
        )
    }
}

impl From<&StatusUpdate> for MutationArgs {
    fn from(update: &StatusUpdate) -> Self {
        Self::new()
            .with("orderID", update.order_id.as_str())
            .with("status", update.status.as_str())
            .with("prevStatus", update.prev_status.as_str())
            .with("updatedAt", update.updated_at)
    }
}

/// Request body delivered to a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    /// GraphQL document
    pub query: String,
    /// Operation to run within the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Variables, passed through untouched
    #[serde(default)]
    pub variables: serde_json::Value,
}

impl GraphqlRequest {
    /// The `publishStatusUpdate` mutation carrying `args` as variables.
    #[must_use]
    pub fn publish_status_update(args: &MutationArgs) -> Self {
        Self {
            query: PUBLISH_STATUS_UPDATE_QUERY.to_string(),
            operation_name: Some(OPERATION_NAME.to_string()),
            variables: args.to_json(),
        }
    }
}

/// One entry of a GraphQL `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlError {
    /// Human readable message
    pub message: String,
    /// Error classification, e.g. `ValidationError`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

/// Response envelope returned by the gateway endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlResponse {
    /// Operation result keyed by field name, `null` on failure
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Errors, omitted when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphqlError>,
}

impl GraphqlResponse {
    /// Successful response carrying `value` under `field`.
    #[must_use]
    pub fn field(field: &str, value: serde_json::Value) -> Self {
        let mut data = serde_json::Map::new();
        data.insert(field.to_string(), value);
        Self {
            data: Some(serde_json::Value::Object(data)),
            errors: Vec::new(),
        }
    }

    /// Failed response with a single error.
    #[must_use]
    pub fn error(message: impl Into<String>, error_type: Option<&str>) -> Self {
        Self {
            data: None,
            errors: vec![GraphqlError {
                message: message.into(),
                error_type: error_type.map(str::to_string),
            }],
        }
    }

    /// Value of `field` in `data`, if present and non-null.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.data
            .as_ref()
            .and_then(|data| data.get(field))
            .filter(|value| !value.is_null())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::status::Status;

    #[test]
    fn timestamps_serialize_as_rfc3339_and_come_back_as_text() {
        let args = MutationArgs::new()
            .with("orderID", "123")
            .with("updatedAt", "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap());

        let json = serde_json::to_string(&args).unwrap();
        assert_eq!(json, r#"{"orderID":"123","updatedAt":"2024-01-01T00:00:00Z"}"#);

        let back: MutationArgs = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("updatedAt"), Some(&ArgValue::Text("2024-01-01T00:00:00Z".into())));
        assert_eq!(back.to_json(), args.to_json());
    }

    #[test]
    fn timestamp_shaped_strings_stay_text() {
        let back: MutationArgs =
            serde_json::from_value(serde_json::json!({"orderID": "2024-01-01T02:00:00+02:00"})).unwrap();
        assert_eq!(
            back.get("orderID"),
            Some(&ArgValue::Text("2024-01-01T02:00:00+02:00".into()))
        );
    }

    #[test]
    fn non_string_values_are_rejected() {
        let result = serde_json::from_value::<MutationArgs>(serde_json::json!({"orderID": {"id": 1}}));
        assert!(result.is_err());
    }

    #[test]
    fn error_response_has_null_data() {
        let response = GraphqlResponse::error("bad status", Some("ValidationError"));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({
                "data": null,
                "errors": [{"message": "bad status", "errorType": "ValidationError"}]
            })
        );
        assert!(response.get(PUBLISH_STATUS_UPDATE).is_none());
    }

    #[test]
    fn request_body_carries_operation_and_variables() {
        let update = StatusUpdate {
            order_id: "123".into(),
            status: Status::Shipped,
            prev_status: Status::InProgress,
            updated_at: "2024-01-01T00:00:00Z".parse().unwrap(),
        };
        let request = GraphqlRequest::publish_status_update(&MutationArgs::from(&update));

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["operationName"], "PublishStatusUpdate");
        assert!(body["query"].as_str().unwrap().contains(PUBLISH_STATUS_UPDATE));
        assert_eq!(
            body["variables"],
            serde_json::json!({
                "orderID": "123",
                "status": "SHIPPED",
                "prevStatus": "IN_PROGRESS",
                "updatedAt": "2024-01-01T00:00:00Z"
            })
        );
    }
}
