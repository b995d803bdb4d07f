//! HTTP request handlers.

pub mod dead_letters;
pub mod events;
pub mod graphql;
pub mod health;
pub mod realtime;

pub use health::health_check;
