//! # Status Relay Core
//!
//! Domain types and pure logic for relaying order status events onto a
//! real-time subscription channel.
//!
//! This crate contains no I/O. Everything that talks to the network, a disk or
//! a clock lives behind a trait defined here and implemented in
//! `status-relay-runtime`.
//!
//! ## Pipeline
//!
//! ```text
//! DomainEvent ──► Rule::matches ──► MappingTable::extract ──► MutationArgs
//!                     │ false                │ Err                 │
//!                     ▼                      ▼                     ▼
//!                  dropped       FieldExtractionError     fan-out to every
//!                                (dead-lettered on        DeliveryTarget
//!                                 every target)                 │
//!                                                               ▼
//!                                              gateway::publish (echo) ──► broadcast
//! ```
//!
//! ## Example
//!
//! ```
//! use status_relay_core::{DomainEvent, MappingTable, Rule, Status, gateway};
//!
//! let event = DomainEvent::new("orders.system", "Order Status Update", "2024-01-01T00:00:00Z".parse().unwrap())
//!     .with_detail("order-id", "123")
//!     .with_detail("status", "SHIPPED")
//!     .with_detail("prev-status", "IN_PROGRESS");
//!
//! let rule = Rule::new(["orders.system"], ["Order Status Update"]);
//! assert!(rule.matches(&event));
//!
//! let args = MappingTable::status_update().extract(&event).unwrap();
//! let update = gateway::publish(&args).unwrap();
//! assert_eq!(update.order_id, "123");
//! assert_eq!(update.status, Status::Shipped);
//! ```

pub use chrono::{DateTime, Utc};

pub mod dead_letter;
pub mod delivery;
pub mod error;
pub mod event;
pub mod gateway;
pub mod mapping;
pub mod mutation;
pub mod rule;
pub mod status;
pub mod target;

pub use dead_letter::{DeadLetterEntry, DeadLetterSink};
pub use delivery::{DeliveryOutcome, DeliveryStatus, MutationTransport};
pub use error::{
    DeadLetterError, DeliveryError, FieldExtractionError, FieldPathError, ValidationError,
};
pub use event::DomainEvent;
pub use mapping::{FieldMapping, FieldPath, FieldType, MappingTable};
pub use mutation::{ArgValue, GraphqlError, GraphqlRequest, GraphqlResponse, MutationArgs};
pub use rule::Rule;
pub use status::{Status, StatusUpdate};
pub use target::{Credential, DeliveryTarget, TargetId};

/// Environment traits injected into the runtime.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time so dead-letter timestamps are testable
    ///
    /// # Examples
    ///
    /// ```
    /// use status_relay_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
