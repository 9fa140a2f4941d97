// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dakiya Client - Field-agent SDK for the dakiya coordination server.
//!
//! Drivers work under intermittent connectivity: sales happen in the field
//! whether or not the network is up. This crate provides the offline-first
//! plumbing — a durable action queue, a connectivity monitor, and a sync
//! reconciler that replays queued actions against the server in strict
//! order once connectivity returns — plus the realtime channel and the
//! HTTP client for the server's business operations.
//!
//! # Quick Start
//!
//! ```ignore
//! use dakiya_client::{
//!     ActionKind, ActionQueue, ApiClient, ConnectivityMonitor, RecordSalePayload,
//!     SyncReconciler,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> dakiya_client::Result<()> {
//!     let queue = ActionQueue::open("sqlite://driver-queue.db").await?;
//!     let api = Arc::new(ApiClient::new("http://localhost:8080", "driver-7")?);
//!     let monitor = Arc::new(ConnectivityMonitor::new(true));
//!     let reconciler = Arc::new(SyncReconciler::new(queue.clone(), api.clone()));
//!
//!     // A sale made while offline goes into the durable queue...
//!     let payload = serde_json::to_value(RecordSalePayload {
//!         user_id: "9000000001".to_string(),
//!         items: vec![],
//!         total: 10.0,
//!         is_urgent: false,
//!     })?;
//!     queue.enqueue(ActionKind::RecordSale, &payload).await?;
//!
//!     // ...and the reconciler drains it on every restored signal.
//!     let driver = reconciler.clone();
//!     let transitions = monitor.clone();
//!     tokio::spawn(async move { driver.run(&transitions).await });
//!
//!     Ok(())
//! }
//! ```
//!
//! # Replay semantics
//!
//! Queued actions may be causally dependent (a later `MARK_PAID_CASH` can
//! reference an earlier `RECORD_SALE`), so replay is strictly ordered and
//! halts at the first failure: applied actions stay applied, the failing
//! action and everything after it stay queued, and the batch waits for the
//! next restored signal. The server operations are required to tolerate
//! at-least-once delivery.
//!
//! Status is tri-state and never an error: `Idle`, `Syncing { total }`,
//! `FailedWillRetry` — the UI renders "offline, will sync later" and
//! "sync failed, will retry" from it, nothing lower-level leaks out.
//!
//! # Realtime
//!
//! [`RealtimeChannel`] is the persistent duplex channel: identify once,
//! stream location updates, receive broadcasts and targeted notifications.
//! Delivery on this channel is best-effort; anything that must survive a
//! missed live delivery reaches the device via the server's durable push
//! path instead.

mod api;
mod connectivity;
mod error;
mod queue;
mod realtime;
mod reconciler;

pub use api::ApiClient;
pub use connectivity::{ConnectivityMonitor, wait_for_restored};
pub use error::{ClientError, Result};
pub use queue::{ActionKind, ActionQueue, PendingAction};
pub use realtime::RealtimeChannel;
pub use reconciler::{
    MarkPaidCashPayload, RecordSalePayload, SyncHandler, SyncOutcome, SyncReconciler, SyncStatus,
};
