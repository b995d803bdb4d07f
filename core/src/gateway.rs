//! The echo resolver behind `publishStatusUpdate`.
//!
//! [`publish`] is a pure function: it touches no store, keeps no state and
//! has no side effects beyond its return value. Replaying identical arguments
//! always yields an identical `StatusUpdate`; deduplication is deliberately
//! absent.

use crate::error::ValidationError;
use crate::mutation::{ArgValue, MutationArgs};
use crate::status::{Status, StatusUpdate};
use chrono::{DateTime, Utc};

const ORDER_ID: &str = "orderID";
const STATUS: &str = "status";
const PREV_STATUS: &str = "prevStatus";
const UPDATED_AT: &str = "updatedAt";

const DECLARED_ARGUMENTS: [&str; 4] = [ORDER_ID, STATUS, PREV_STATUS, UPDATED_AT];

/// Validate `args` and echo them back as a [`StatusUpdate`].
///
/// # Errors
///
/// Returns [`ValidationError`] if an argument is missing, undeclared, outside
/// the `Status` enumeration, or not a valid `DateTime`.
pub fn publish(args: &MutationArgs) -> Result<StatusUpdate, ValidationError> {
    if let Some((unknown, _)) = args
        .iter()
        .find(|(name, _)| !DECLARED_ARGUMENTS.contains(name))
    {
        return Err(ValidationError::UnknownArgument(unknown.to_string()));
    }

    Ok(StatusUpdate {
        order_id: required(args, ORDER_ID)?.as_text().into_owned(),
        status: status(args, STATUS)?,
        prev_status: status(args, PREV_STATUS)?,
        updated_at: timestamp(args, UPDATED_AT)?,
    })
}

fn required<'a>(args: &'a MutationArgs, name: &str) -> Result<&'a ArgValue, ValidationError> {
    args.get(name)
        .ok_or_else(|| ValidationError::MissingArgument(name.to_string()))
}

fn status(args: &MutationArgs, name: &str) -> Result<Status, ValidationError> {
    let raw = required(args, name)?.as_text();
    raw.parse().map_err(|_| ValidationError::InvalidEnumValue {
        argument: name.to_string(),
        value: raw.into_owned(),
    })
}

fn timestamp(args: &MutationArgs, name: &str) -> Result<DateTime<Utc>, ValidationError> {
    match required(args, name)? {
        ArgValue::Timestamp(ts) => Ok(*ts),
        ArgValue::Text(text) => DateTime::parse_from_rfc3339(text)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| ValidationError::InvalidDateTime {
                argument: name.to_string(),
                value: text.clone(),
            }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    fn valid_args() -> MutationArgs {
        MutationArgs::new()
            .with("orderID", "123")
            .with("status", "SHIPPED")
            .with("prevStatus", "IN_PROGRESS")
            .with("updatedAt", "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap())
    }

    #[test]
    fn echoes_valid_arguments() {
        let update = publish(&valid_args()).unwrap();
        assert_eq!(
            update,
            StatusUpdate {
                order_id: "123".into(),
                status: Status::Shipped,
                prev_status: Status::InProgress,
                updated_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            }
        );
    }

    #[test]
    fn accepts_textual_datetime() {
        let args = valid_args().with("updatedAt", "2024-01-01T02:00:00+02:00");
        let update = publish(&args).unwrap();
        assert_eq!(update.updated_at, "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn timestamp_shaped_order_id_survives_the_wire() {
        let sent = "2024-01-01T02:00:00+02:00";
        let args = valid_args().with("orderID", sent);

        let request = crate::mutation::GraphqlRequest::publish_status_update(&args);
        let received: MutationArgs = serde_json::from_value(request.variables).unwrap();
        let update = publish(&received).unwrap();

        assert_eq!(update.order_id, sent);
        assert_eq!(update.updated_at, "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn rejects_status_outside_enumeration() {
        let args = valid_args().with("status", "UNKNOWN");
        assert_eq!(
            publish(&args),
            Err(ValidationError::InvalidEnumValue {
                argument: "status".into(),
                value: "UNKNOWN".into(),
            })
        );
    }

    #[test]
    fn rejects_prev_status_outside_enumeration() {
        let args = valid_args().with("prevStatus", "LOST");
        assert!(matches!(
            publish(&args),
            Err(ValidationError::InvalidEnumValue { argument, .. }) if argument == "prevStatus"
        ));
    }

    #[test]
    fn rejects_missing_arguments() {
        for name in DECLARED_ARGUMENTS {
            let args: MutationArgs = valid_args()
                .iter()
                .filter(|(n, _)| *n != name)
                .fold(MutationArgs::new(), |acc, (n, v)| acc.with(n, v.clone()));

            assert_eq!(
                publish(&args),
                Err(ValidationError::MissingArgument(name.to_string()))
            );
        }
    }

    #[test]
    fn rejects_unknown_arguments() {
        let args = valid_args().with("priority", "HIGH");
        assert_eq!(
            publish(&args),
            Err(ValidationError::UnknownArgument("priority".into()))
        );
    }

    #[test]
    fn rejects_bad_datetime() {
        let args = valid_args().with("updatedAt", "yesterday");
        assert!(matches!(publish(&args), Err(ValidationError::InvalidDateTime { .. })));
    }

    #[test]
    fn replay_always_succeeds() {
        let args = valid_args();
        let first = publish(&args).unwrap();
        let second = publish(&args).unwrap();
        assert_eq!(first, second);
    }

    fn arb_status() -> impl Strategy<Value = Status> {
        proptest::sample::select(Status::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn echo_is_structurally_equal_to_input(
            order_id in "[A-Za-z0-9-]{1,32}",
            status in arb_status(),
            prev_status in arb_status(),
            secs in 0i64..4_000_000_000,
        ) {
            let update = StatusUpdate {
                order_id,
                status,
                prev_status,
                updated_at: DateTime::from_timestamp(secs, 0).unwrap(),
            };

            let echoed = publish(&MutationArgs::from(&update)).unwrap();
            prop_assert_eq!(echoed, update);
        }
    }
}
