// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Realtime channel client.
//!
//! One persistent duplex WebSocket to the coordination server. The first
//! message should identify the channel ([`RealtimeChannel::identify_user`]
//! for customers, [`RealtimeChannel::start_broadcast`] for drivers);
//! unidentified channels still receive broadcasts. Per-channel message
//! order is preserved by the transport.

use dakiya_wire::RealtimeMessage;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::error::Result;

/// A live channel to the server.
pub struct RealtimeChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RealtimeChannel {
    /// Open a channel to `url` (e.g. `ws://host:8080/ws`).
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _response) = connect_async(url).await?;
        debug!(url, "realtime channel connected");
        Ok(Self { stream })
    }

    /// Bind a customer/viewer identity to this channel. Send once, first.
    pub async fn identify_user(&mut self, user_id: &str) -> Result<()> {
        self.send(&RealtimeMessage::IdentifyUser {
            user_id: user_id.to_string(),
        })
        .await
    }

    /// Bind a driver identity and start broadcasting availability.
    pub async fn start_broadcast(&mut self, driver_id: &str) -> Result<()> {
        self.send(&RealtimeMessage::StartBroadcast {
            driver_id: driver_id.to_string(),
        })
        .await
    }

    /// Report the driver's position.
    pub async fn send_location(&mut self, lat: f64, lon: f64, driver_id: &str) -> Result<()> {
        self.send(&RealtimeMessage::DriverLocationUpdate {
            lat,
            lon,
            driver_id: driver_id.to_string(),
        })
        .await
    }

    /// Send any wire message.
    pub async fn send(&mut self, message: &RealtimeMessage) -> Result<()> {
        let text = message
            .to_json()
            .map_err(|err| crate::error::ClientError::Realtime(err.to_string()))?;
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    /// Next decoded message from the server.
    ///
    /// Malformed frames are logged and dropped — the channel stays open.
    /// Returns `None` once the server closed the channel.
    pub async fn next_message(&mut self) -> Result<Option<RealtimeMessage>> {
        while let Some(frame) = self.stream.next().await {
            match frame? {
                Message::Text(text) => match RealtimeMessage::from_json(text.as_str()) {
                    Ok(message) => return Ok(Some(message)),
                    Err(err) => {
                        warn!(error = %err, "dropping malformed frame");
                    }
                },
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Close the channel cleanly.
    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
