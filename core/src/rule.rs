//! Declarative event filter.

use crate::event::DomainEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Decides whether an event is eligible for relay.
///
/// An event matches iff its `source` is in `sources` and its `detail_type` is
/// in `detail_types`. Membership is exact: no prefixes, wildcards or case
/// folding. An empty set matches nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Accepted `source` values
    #[serde(rename = "sourceSet")]
    pub sources: BTreeSet<String>,
    /// Accepted `detailType` values
    #[serde(rename = "detailTypeSet")]
    pub detail_types: BTreeSet<String>,
}

impl Rule {
    /// Build a rule from source and detail-type sets.
    #[must_use]
    pub fn new<S, D>(sources: S, detail_types: D) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            detail_types: detail_types.into_iter().map(Into::into).collect(),
        }
    }

    /// The rule the order system publishes under.
    #[must_use]
    pub fn order_status_updates() -> Self {
        Self::new(["orders.system"], ["Order Status Update"])
    }

    /// Evaluate the rule against an event.
    #[must_use]
    pub fn matches(&self, event: &DomainEvent) -> bool {
        self.sources.contains(&event.source) && self.detail_types.contains(&event.detail_type)
    }
}

/// Free-function form of [`Rule::matches`].
#[must_use]
pub fn matches(event: &DomainEvent, rule: &Rule) -> bool {
    rule.matches(event)
}
