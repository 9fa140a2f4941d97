// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API: business operations and push subscription lifecycle.
//!
//! These are the operations the client SDK replays from its offline queue
//! (`record_sale`, `mark_paid_cash`) plus the urgent-order flow and the
//! push subscription endpoints. Identity arrives already resolved in the
//! `x-participant-id` header; this layer neither issues nor validates
//! credentials.
//!
//! Replayed operations are required to tolerate at-least-once delivery:
//! `mark_paid_cash` is a success no-op on an already-settled sale, and
//! `record_sale` rejects (never drops) actions referencing discontinued
//! produce so a replayed batch halts explicitly.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use dakiya_wire::{PushSubscription, RealtimeMessage, Sale, SaleDraft};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::config::Config;
use crate::dispatch::{NotificationDispatcher, PushTransport};
use crate::error::{Result, ServerError};
use crate::presence::PresenceIndex;
use crate::registry::ConnectionRegistry;
use crate::store::SqliteStore;
use crate::ws;

/// Everything the handlers share.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Live channel registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Driver presence index.
    pub presence: Arc<PresenceIndex>,
    /// Live + durable notification delivery.
    pub dispatcher: NotificationDispatcher,
    /// Durable stores.
    pub store: SqliteStore,
}

impl AppState {
    /// Wire up registry, presence, and dispatcher over the given store and
    /// push transport.
    pub fn new(config: Config, store: SqliteStore, transport: Arc<dyn PushTransport>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = Arc::new(PresenceIndex::with_ttl(config.presence_ttl));
        let dispatcher = NotificationDispatcher::new(registry.clone(), store.clone(), transport);
        Self {
            config,
            registry,
            presence,
            dispatcher,
            store,
        }
    }
}

/// Build the full API router, realtime endpoint included.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/driver/sales", post(record_sale))
        .route(
            "/api/driver/sales/{id}/mark-paid-cash",
            post(mark_paid_cash),
        )
        .route("/api/driver/nearby-drivers", get(nearby_drivers))
        .route("/api/orders/urgent", post(create_urgent_order))
        .route("/api/orders/{id}/accept", post(accept_order))
        .route("/api/notifications/subscribe", post(subscribe))
        .route("/api/notifications/unsubscribe", post(unsubscribe))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        // The driver and back-office fronts are served from other origins.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn participant_id(headers: &HeaderMap) -> Result<String> {
    headers
        .get("x-participant-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|id| !id.is_empty())
        .ok_or(ServerError::Validation {
            field: "x-participant-id",
            message: "missing participant identity".to_string(),
        })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.registry.connection_count().await,
        "availableDrivers": state.presence.available_count().await,
    }))
}

async fn record_sale(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<SaleDraft>,
) -> Result<impl IntoResponse> {
    let sale = state.store.record_sale(&draft).await?;

    // The sale consumed the customer's wishlist; tell their live channel.
    // Best-effort by design: a customer without an open channel learns on
    // next load.
    state
        .registry
        .send_to(&sale.owner_id, RealtimeMessage::WishlistCleared {})
        .await;

    Ok((StatusCode::CREATED, Json(sale)))
}

async fn mark_paid_cash(
    State(state): State<Arc<AppState>>,
    Path(sale_id): Path<i64>,
) -> Result<Json<Sale>> {
    let sale = state.store.mark_paid_cash(sale_id).await?;
    state
        .dispatcher
        .broadcast(RealtimeMessage::PaymentReceivedCash(sale.clone()))
        .await;
    Ok(Json(sale))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NearbyQuery {
    lat: f64,
    lon: f64,
    radius_km: Option<f64>,
}

/// Default proximity radius for driver-to-driver queries, in km.
const DEFAULT_NEARBY_RADIUS_KM: f64 = 0.5;

async fn nearby_drivers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Json<Vec<String>> {
    let radius = query.radius_km.unwrap_or(DEFAULT_NEARBY_RADIUS_KM);
    Json(state.presence.query_nearby(query.lat, query.lon, radius).await)
}

async fn create_urgent_order(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<SaleDraft>,
) -> Result<impl IntoResponse> {
    let draft = SaleDraft {
        is_urgent: true,
        ..draft
    };
    let sale = state.store.record_sale(&draft).await?;

    let notified = state
        .dispatcher
        .dispatch_urgent_order(
            &sale,
            &state.presence,
            (state.config.depot_lat, state.config.depot_lon),
            state.config.dispatch_radius_km,
            state.config.dispatch_driver_limit,
        )
        .await?;
    debug!(sale = sale.id, drivers = notified.len(), "urgent order dispatched");

    Ok((StatusCode::CREATED, Json(sale)))
}

async fn accept_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Sale>> {
    let driver_id = participant_id(&headers)?;
    let sale = state
        .store
        .get_sale(order_id)
        .await?
        .ok_or(ServerError::SaleNotFound { sale_id: order_id })?;

    state
        .dispatcher
        .broadcast(RealtimeMessage::OrderAcceptedByDriver {
            order_id,
            driver_id,
        })
        .await;

    Ok(Json(sale))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeRequest {
    endpoint: String,
    keys: serde_json::Value,
}

async fn subscribe(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SubscribeRequest>,
) -> Result<impl IntoResponse> {
    let owner_id = participant_id(&headers)?;
    if request.endpoint.is_empty() {
        return Err(ServerError::Validation {
            field: "endpoint",
            message: "must not be empty".to_string(),
        });
    }
    state
        .store
        .upsert_subscription(&PushSubscription {
            endpoint: request.endpoint,
            keys: request.keys,
            owner_id,
        })
        .await?;
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnsubscribeRequest {
    endpoint: String,
}

async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<Json<serde_json::Value>> {
    let owner_id = participant_id(&headers)?;
    let removed = state
        .store
        .remove_subscription_for_owner(&owner_id, &request.endpoint)
        .await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}
