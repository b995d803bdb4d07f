//! Axum surface for the order status relay.
//!
//! # Architecture
//!
//! ```text
//!  POST /events ──► EventPublisher ──► relay ──► targets ──┐
//!                                                          │ HTTP
//!  POST /graphql ◄─────────────────────────────────────────┘
//!       │
//!       ├─ MutationGateway (validate + echo)
//!       └─ broadcast ──► GET /graphql/realtime (WebSocket)
//! ```
//!
//! The relay delivers to its own `/graphql` endpoint like any other target,
//! so a successful delivery fans out to every realtime subscriber.
//!
//! # Example
//!
//! ```ignore
//! use status_relay_web::{AppState, build_router};
//!
//! let state = AppState::new(gateway, publisher, dead_letters).with_api_key("secret");
//! let app = build_router(state);
//! axum::serve(listener, app).await?;
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use middleware::{API_KEY_HEADER, api_key_layer};
pub use routes::build_router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
