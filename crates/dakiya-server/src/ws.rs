// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Realtime WebSocket endpoint.
//!
//! One persistent duplex channel per participant. The first application
//! message may identify the channel (`identify_user` for customers and
//! viewers, `start_broadcast` for drivers); the binding is set once and
//! never changes for the life of the handle. Unidentified channels still
//! receive broadcasts.
//!
//! Inbound frames are dispatched synchronously per message; registry and
//! presence mutation happens inside single lock scopes, so the close
//! handler's ownership check cannot interleave with a newer registration.
//! A malformed frame is logged and dropped; the connection stays open.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use dakiya_wire::RealtimeMessage;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::handlers::AppState;
use crate::presence::PresenceIndex;
use crate::registry::{ConnectionId, ConnectionRegistry};

/// Outbound queue depth per channel; slower consumers miss broadcasts
/// rather than stalling the fan-out.
const OUTBOUND_QUEUE: usize = 64;

/// Identity bound to a channel by its first identifying message.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BoundIdentity {
    User(String),
    Driver(String),
}

impl BoundIdentity {
    fn identity(&self) -> &str {
        match self {
            BoundIdentity::User(id) | BoundIdentity::Driver(id) => id,
        }
    }

    fn is_driver(&self) -> bool {
        matches!(self, BoundIdentity::Driver(_))
    }
}

/// Upgrade handler for `GET /ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<RealtimeMessage>(OUTBOUND_QUEUE);
    let connection_id = state.registry.connect(tx).await;
    info!(connection = %connection_id, "realtime channel opened");

    // Writer task: drains the outbound queue into the socket so handlers
    // never hold a reference to the sink.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "failed to encode outbound frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut bound: Option<BoundIdentity> = None;

    while let Some(Ok(frame)) = stream.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            // Pings are answered by the library; binary frames carry nothing.
            _ => continue,
        };
        match RealtimeMessage::from_json(text.as_str()) {
            Ok(message) => {
                handle_message(
                    &state.registry,
                    &state.presence,
                    connection_id,
                    &mut bound,
                    message,
                )
                .await;
            }
            Err(err) => {
                warn!(connection = %connection_id, error = %err, "dropping malformed frame");
            }
        }
    }

    // Close path: runs in this connection's own handler. The unregister is
    // ownership-guarded, so a close delayed past a reconnect is a no-op and
    // never tears down the newer channel's presence.
    if let Some(bound) = &bound {
        let owned = state
            .registry
            .unregister(bound.identity(), connection_id)
            .await;
        if owned && bound.is_driver() {
            state.presence.set_unavailable(bound.identity()).await;
        }
    }
    state.registry.disconnect(connection_id).await;
    writer.abort();
    info!(connection = %connection_id, "realtime channel closed");
}

async fn handle_message(
    registry: &ConnectionRegistry,
    presence: &PresenceIndex,
    connection_id: ConnectionId,
    bound: &mut Option<BoundIdentity>,
    message: RealtimeMessage,
) {
    match message {
        RealtimeMessage::IdentifyUser { user_id } => {
            if bound.is_some() {
                warn!(connection = %connection_id, "channel already identified, ignoring");
                return;
            }
            if registry.register(&user_id, connection_id).await {
                *bound = Some(BoundIdentity::User(user_id));
            }
        }
        RealtimeMessage::StartBroadcast { driver_id } => {
            if bound.is_some() {
                warn!(connection = %connection_id, "channel already identified, ignoring");
                return;
            }
            if registry.register(&driver_id, connection_id).await {
                presence.set_available(&driver_id).await;
                *bound = Some(BoundIdentity::Driver(driver_id));
            }
        }
        RealtimeMessage::DriverLocationUpdate {
            lat,
            lon,
            driver_id,
        } => {
            presence.update_location(&driver_id, lat, lon).await;
            registry
                .broadcast(RealtimeMessage::TruckLocationBroadcast { lat, lon })
                .await;
        }
        other => {
            // Server-originated notifications echoed back by a confused
            // client; nothing to do.
            debug!(connection = %connection_id, kind = other.kind(), "ignoring client frame");
        }
    }
}
