// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dakiya Server - Delivery Fleet Coordination
//!
//! This crate is the central coordinator for a delivery fleet: it tracks
//! every participant's realtime channel, knows which drivers are available
//! and where, and delivers notifications either live (best-effort, over the
//! open channel) or durably (push subscriptions that outlive any process).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Participants                             │
//! │   drivers (dakiya-client) · customers · back-office viewers  │
//! └──────────────────────────────────────────────────────────────┘
//!        │ HTTP (business ops)            │ WebSocket (realtime)
//!        ▼                                ▼
//! ┌──────────────┐   targeted/broadcast   ┌─────────────────────┐
//! │   handlers   │───────────────────────▶│  ConnectionRegistry │
//! │  (axum API)  │                        │  PresenceIndex      │
//! └──────┬───────┘                        └─────────────────────┘
//!        │                                        ▲
//!        ▼                                        │ no live channel
//! ┌──────────────┐                        ┌───────┴─────────────┐
//! │  SqliteStore │◀───────────────────────│ NotificationDispatch│
//! │ sales + push │    gone endpoints      │  (live + push)      │
//! └──────────────┘                        └─────────────────────┘
//! ```
//!
//! # Delivery semantics
//!
//! | Path | Guarantee |
//! |------|-----------|
//! | Live (registry) | Best-effort, no ack, no retry; dropped if no channel |
//! | Durable push | Attempted per subscription, independently and concurrently |
//!
//! Connection state is deliberately ephemeral: a restart loses every
//! registration and participants reconnect and re-identify. Only push
//! subscriptions and the sales ledger are durable.
//!
//! # Reconnect race
//!
//! A driver may re-identify over a fresh channel before the old channel's
//! close handler fires. Registrations are stamped with a connection id and
//! deregistration is ownership-guarded, so the stale close is a no-op —
//! see [`registry`].
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `DAKIYA_DATABASE_URL` | Yes | - | SQLite connection string |
//! | `DAKIYA_HTTP_PORT` | No | `8080` | HTTP/WebSocket listen port |
//! | `DAKIYA_DEPOT_LAT` | No | `23.1793` | Depot latitude |
//! | `DAKIYA_DEPOT_LON` | No | `75.7849` | Depot longitude |
//! | `DAKIYA_DISPATCH_RADIUS_KM` | No | `10` | Urgent-order driver radius |
//! | `DAKIYA_DISPATCH_DRIVER_LIMIT` | No | `3` | Drivers notified per order |
//! | `DAKIYA_PRESENCE_TTL_SECS` | No | `300` | Proximity staleness cutoff |
//! | `DAKIYA_PUSH_TIMEOUT_MS` | No | `5000` | Push attempt timeout |
//!
//! # Modules
//!
//! - [`config`]: Server configuration from environment variables
//! - [`error`]: Error types with stable codes and HTTP mapping
//! - [`registry`]: Identity → live channel map with the stale-close guard
//! - [`presence`]: Driver availability and haversine proximity queries
//! - [`dispatch`]: Live broadcast/targeted delivery and durable push
//! - [`store`]: SQLite persistence for subscriptions and sales
//! - [`handlers`]: HTTP business operations (the reconciler's targets)
//! - [`ws`]: Realtime WebSocket endpoint and identify handshake

#![deny(missing_docs)]

/// Server configuration loaded from environment variables.
pub mod config;

/// Live + durable notification delivery.
pub mod dispatch;

/// Error types for server operations with HTTP response mapping.
pub mod error;

/// HTTP API handlers and router assembly.
pub mod handlers;

/// Geospatial presence index for available drivers.
pub mod presence;

/// In-memory connection registry with ownership-guarded deregistration.
pub mod registry;

/// SQLite-backed durable stores.
pub mod store;

/// Realtime WebSocket endpoint.
pub mod ws;
