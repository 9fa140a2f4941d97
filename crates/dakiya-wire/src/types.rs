// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sale and push-subscription records shared across the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payment lifecycle of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Recorded but not yet settled.
    Unpaid,
    /// Settled in cash with the driver.
    PaidCash,
    /// Settled through the online gateway.
    PaidOnline,
}

impl PaymentStatus {
    /// Stable string form as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::PaidCash => "PAID_CASH",
            PaymentStatus::PaidOnline => "PAID_ONLINE",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNPAID" => Some(PaymentStatus::Unpaid),
            "PAID_CASH" => Some(PaymentStatus::PaidCash),
            "PAID_ONLINE" => Some(PaymentStatus::PaidOnline),
            _ => None,
        }
    }
}

/// One line item of a sale. Quantity is free text ("250g", "1kg", "2pc").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    /// Produce name as listed in the catalog.
    pub name: String,
    /// Quantity descriptor, opaque to the server.
    pub quantity: String,
    /// Line price in rupees.
    pub price: f64,
}

/// A sale not yet accepted by the server (what the client submits).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleDraft {
    /// Identity of the customer the sale belongs to.
    pub owner_id: String,
    /// Line items.
    pub items: Vec<SaleItem>,
    /// Total in rupees.
    pub total: f64,
    /// Whether this is an urgent (ad hoc) order rather than a route stop.
    pub is_urgent: bool,
}

/// A sale as recorded by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    /// Server-assigned id.
    pub id: i64,
    /// Identity of the customer the sale belongs to.
    pub owner_id: String,
    /// Line items.
    pub items: Vec<SaleItem>,
    /// Total in rupees.
    pub total: f64,
    /// Whether this is an urgent (ad hoc) order.
    pub is_urgent: bool,
    /// Payment lifecycle state.
    pub payment_status: PaymentStatus,
    /// When the server recorded the sale.
    pub created_at: DateTime<Utc>,
}

/// Durable push delivery address for one device of one participant.
///
/// Lives independently of any realtime connection; a participant may hold
/// several (one per device). `endpoint` is globally unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    /// Push service URL for this device.
    pub endpoint: String,
    /// Opaque encryption keys handed over by the device.
    pub keys: serde_json::Value,
    /// Identity that owns the subscription.
    pub owner_id: String,
}
