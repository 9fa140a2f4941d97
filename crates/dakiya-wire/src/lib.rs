// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dakiya Wire - shared message and record types.
//!
//! Every realtime frame exchanged between the coordination server and its
//! participants (drivers, customers, back-office viewers) is a JSON object
//! of the form `{ "type": ..., "payload": ... }`. This crate defines those
//! frames as one typed enum plus the sale and push-subscription records
//! that ride inside them. It contains no I/O; both `dakiya-server` and
//! `dakiya-client` depend on it.

mod message;
mod types;

pub use message::{RealtimeMessage, WireError};
pub use types::{PaymentStatus, PushSubscription, Sale, SaleDraft, SaleItem};
