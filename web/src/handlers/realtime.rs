//! Realtime `onStatusUpdate` subscriptions over WebSocket.
//!
//! # Architecture
//!
//! ```text
//! Client              Realtime Handler            Broadcaster
//!   │                        │                         │
//!   ├─ Connect ─────────────>│                         │
//!   ├─ Subscribe ───────────>│                         │
//!   │                        ├─ subscribe() ──────────>│
//!   │<─ Subscribed ──────────┤                         │
//!   │                        │<── StatusUpdate ────────┤
//!   │                        ├─ orderID filter         │
//!   │<─ Data ────────────────┤                         │
//!   ├─ Close ───────────────>│                         │
//!   │                        ├─ drop (unregister) ────>│
//! ```
//!
//! # Message Protocol
//!
//! **Client → Server:**
//! ```json
//! { "type": "subscribe", "channel": "onStatusUpdate", "orderID": "123" }
//! { "type": "unsubscribe" }
//! { "type": "ping" }
//! ```
//!
//! **Server → Client:**
//! ```json
//! { "type": "subscribed", "channel": "onStatusUpdate", "orderID": "123" }
//! { "type": "data", "channel": "onStatusUpdate", "payload": { "orderID": "123", ... } }
//! { "type": "pong" }
//! { "type": "error", "message": "Unknown channel 'x'" }
//! ```
//!
//! `orderID` is optional; without it every update is delivered.

use crate::state::AppState;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use status_relay_core::StatusUpdate;
use status_relay_core::mutation::ON_STATUS_UPDATE;
use status_relay_runtime::{MutationGateway, Subscription};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Message sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Start (or replace) this connection's subscription
    Subscribe {
        /// Channel name; only `onStatusUpdate` exists
        channel: String,
        /// Deliver only updates for this order
        #[serde(rename = "orderID", default, skip_serializing_if = "Option::is_none")]
        order_id: Option<String>,
    },
    /// Stop receiving updates, keep the connection
    Unsubscribe,
    /// Keep-alive
    Ping,
}

/// Message sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Subscription is active
    Subscribed {
        /// Channel subscribed to
        channel: String,
        /// Active order filter
        #[serde(rename = "orderID", default, skip_serializing_if = "Option::is_none")]
        order_id: Option<String>,
    },
    /// Subscription was removed
    Unsubscribed,
    /// One broadcast status update
    Data {
        /// Channel the update came from
        channel: String,
        /// The echoed update
        payload: StatusUpdate,
    },
    /// Reply to `ping`
    Pong,
    /// The last client message could not be honored
    Error {
        /// Error description
        message: String,
    },
}

/// A live subscription plus its filter.
struct Active {
    subscription: Subscription<StatusUpdate>,
    order_id: Option<String>,
}

impl Active {
    fn wants(&self, update: &StatusUpdate) -> bool {
        self.order_id
            .as_deref()
            .is_none_or(|order_id| order_id == update.order_id)
    }
}

/// Next update of the active subscription; pending forever without one.
async fn next_update(active: &mut Option<Active>) -> Option<StatusUpdate> {
    match active {
        Some(active) => active.subscription.recv().await,
        None => std::future::pending().await,
    }
}

/// Upgrade to a realtime subscription socket.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn handle(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.gateway))
}

/// Drive one connection until either side closes it.
async fn handle_socket(socket: WebSocket, gateway: MutationGateway) {
    let connection_id = Uuid::new_v4();
    info!(%connection_id, "Realtime connection established");

    let (mut sender, mut receiver) = socket.split();
    let mut active: Option<Active> = None;

    loop {
        let reply = tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => Some(on_client_message(&text, &gateway, &mut active, connection_id)),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => None,
                Some(Err(err)) => {
                    debug!(%connection_id, error = %err, "Realtime receive failed");
                    break;
                }
            },
            Some(update) = next_update(&mut active) => {
                let wanted = active.as_ref().is_some_and(|active| active.wants(&update));
                wanted.then(|| ServerMessage::Data {
                    channel: ON_STATUS_UPDATE.to_string(),
                    payload: update,
                })
            }
        };

        let Some(reply) = reply else { continue };
        let json = match serde_json::to_string(&reply) {
            Ok(json) => json,
            Err(err) => {
                warn!(%connection_id, error = %err, "Failed to encode realtime message");
                continue;
            }
        };
        if sender.send(Message::Text(json)).await.is_err() {
            break;
        }
    }

    // Dropping the subscription unregisters it from the broadcaster.
    drop(active);
    info!(%connection_id, "Realtime connection closed");
}

fn on_client_message(
    text: &str,
    gateway: &MutationGateway,
    active: &mut Option<Active>,
    connection_id: Uuid,
) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { channel, order_id }) => {
            if channel != ON_STATUS_UPDATE {
                return ServerMessage::Error {
                    message: format!("Unknown channel '{channel}'"),
                };
            }
            debug!(%connection_id, order_id = order_id.as_deref(), "Realtime subscribe");
            *active = Some(Active {
                subscription: gateway.subscribe(),
                order_id: order_id.clone(),
            });
            ServerMessage::Subscribed { channel, order_id }
        }
        Ok(ClientMessage::Unsubscribe) => {
            debug!(%connection_id, "Realtime unsubscribe");
            *active = None;
            ServerMessage::Unsubscribed
        }
        Ok(ClientMessage::Ping) => ServerMessage::Pong,
        Err(err) => ServerMessage::Error {
            message: format!("Invalid message: {err}"),
        },
    }
}
