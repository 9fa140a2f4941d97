// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dakiya Server - Delivery Fleet Coordination
//!
//! The server is responsible for:
//! - Realtime channels (identify handshake, broadcast, targeted sends)
//! - Driver presence (availability + last-known location, proximity)
//! - Notification dispatch (live best-effort + durable push)
//!
//! Note: catalog management, billing, and identity issuance live in the
//! back office, not here.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use dakiya_server::config::Config;
use dakiya_server::dispatch::HttpPushTransport;
use dakiya_server::handlers::{self, AppState};
use dakiya_server::store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dakiya_server=info".parse().unwrap()),
        )
        .init();

    info!("Starting Dakiya Server");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        http_addr = %config.http_addr,
        depot = ?(config.depot_lat, config.depot_lon),
        "Configuration loaded"
    );

    // Open the durable stores
    info!("Opening database...");
    let store = SqliteStore::connect(&config.database_url).await?;
    info!("Database ready");

    let transport = Arc::new(HttpPushTransport::new(config.push_timeout)?);
    let http_addr = config.http_addr;
    let state = Arc::new(AppState::new(config, store, transport));
    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    info!(addr = %http_addr, "Listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    server_handle.abort();
    info!("Shutdown complete");

    Ok(())
}
