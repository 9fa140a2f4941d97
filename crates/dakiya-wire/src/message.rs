// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Realtime wire frames.
//!
//! Each frame is a JSON object `{ "type": <snake_case tag>, "payload": ... }`.
//! The first frame a participant sends may identify the channel
//! ([`RealtimeMessage::IdentifyUser`] for customers and viewers,
//! [`RealtimeMessage::StartBroadcast`] for drivers); everything else flows
//! in both directions for the rest of the channel's life.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Sale;

/// Errors that can occur while encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// The frame was not valid JSON or did not match any known message.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// All messages that travel over a realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum RealtimeMessage {
    /// Binds a customer/viewer identity to the channel. Sent once, first.
    IdentifyUser {
        /// Resolved participant identity.
        user_id: String,
    },

    /// Binds a driver identity to the channel and marks it available.
    StartBroadcast {
        /// Resolved driver identity.
        driver_id: String,
    },

    /// Driver position report; the server upserts presence and rebroadcasts
    /// it as [`RealtimeMessage::TruckLocationBroadcast`].
    DriverLocationUpdate {
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lon: f64,
        /// Reporting driver.
        driver_id: String,
    },

    /// Last-value-wins truck position, fanned out to every open channel.
    TruckLocationBroadcast {
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lon: f64,
    },

    /// A new urgent order; broadcast to viewers and targeted at eligible
    /// drivers.
    NewUrgentOrder(Sale),

    /// A driver collected cash for a sale.
    PaymentReceivedCash(Sale),

    /// The gateway confirmed an online payment for a sale.
    PaymentReceivedOnline(Sale),

    /// The customer's wishlist was converted into a sale and cleared.
    WishlistCleared {},

    /// A driver took responsibility for an urgent order.
    OrderAcceptedByDriver {
        /// The accepted order.
        order_id: i64,
        /// The accepting driver.
        driver_id: String,
    },
}

impl RealtimeMessage {
    /// Encode as the JSON wire form.
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from the JSON wire form.
    pub fn from_json(raw: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The `type` tag this message carries on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            RealtimeMessage::IdentifyUser { .. } => "identify_user",
            RealtimeMessage::StartBroadcast { .. } => "start_broadcast",
            RealtimeMessage::DriverLocationUpdate { .. } => "driver_location_update",
            RealtimeMessage::TruckLocationBroadcast { .. } => "truck_location_broadcast",
            RealtimeMessage::NewUrgentOrder(_) => "new_urgent_order",
            RealtimeMessage::PaymentReceivedCash(_) => "payment_received_cash",
            RealtimeMessage::PaymentReceivedOnline(_) => "payment_received_online",
            RealtimeMessage::WishlistCleared {} => "wishlist_cleared",
            RealtimeMessage::OrderAcceptedByDriver { .. } => "order_accepted_by_driver",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentStatus, SaleItem};
    use chrono::Utc;

    fn sample_sale() -> Sale {
        Sale {
            id: 42,
            owner_id: "9000000001".to_string(),
            items: vec![SaleItem {
                name: "Spinach".to_string(),
                quantity: "500g".to_string(),
                price: 25.0,
            }],
            total: 25.0,
            is_urgent: true,
            payment_status: PaymentStatus::Unpaid,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_identify_user_wire_form() {
        let msg = RealtimeMessage::IdentifyUser {
            user_id: "9000000001".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "identify_user");
        assert_eq!(value["payload"]["userId"], "9000000001");
    }

    #[test]
    fn test_location_update_wire_form() {
        let msg = RealtimeMessage::DriverLocationUpdate {
            lat: 23.1793,
            lon: 75.7849,
            driver_id: "d-1".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "driver_location_update");
        assert_eq!(value["payload"]["driverId"], "d-1");
        assert_eq!(value["payload"]["lat"], 23.1793);
    }

    #[test]
    fn test_round_trip_all_variants() {
        let messages = vec![
            RealtimeMessage::IdentifyUser {
                user_id: "u".to_string(),
            },
            RealtimeMessage::StartBroadcast {
                driver_id: "d".to_string(),
            },
            RealtimeMessage::DriverLocationUpdate {
                lat: 1.0,
                lon: 2.0,
                driver_id: "d".to_string(),
            },
            RealtimeMessage::TruckLocationBroadcast { lat: 1.0, lon: 2.0 },
            RealtimeMessage::NewUrgentOrder(sample_sale()),
            RealtimeMessage::PaymentReceivedCash(sample_sale()),
            RealtimeMessage::PaymentReceivedOnline(sample_sale()),
            RealtimeMessage::WishlistCleared {},
            RealtimeMessage::OrderAcceptedByDriver {
                order_id: 42,
                driver_id: "d".to_string(),
            },
        ];
        for msg in messages {
            let decoded = RealtimeMessage::from_json(&msg.to_json().unwrap()).unwrap();
            assert_eq!(msg, decoded);
        }
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let msg = RealtimeMessage::OrderAcceptedByDriver {
            order_id: 1,
            driver_id: "d".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], msg.kind());
    }

    #[test]
    fn test_malformed_frame_rejected() {
        assert!(RealtimeMessage::from_json("not json").is_err());
        assert!(RealtimeMessage::from_json("{\"type\":\"no_such_message\"}").is_err());
        // A known tag with a payload of the wrong shape is still malformed.
        assert!(
            RealtimeMessage::from_json("{\"type\":\"identify_user\",\"payload\":{\"lat\":1}}")
                .is_err()
        );
    }
}
