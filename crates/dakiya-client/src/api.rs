// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP client for the server's business operations.
//!
//! Implements [`SyncHandler`], so the reconciler replays the offline queue
//! straight through this client. Per-call timeouts come from the underlying
//! HTTP client; the reconciler itself adds none.

use async_trait::async_trait;
use dakiya_wire::{Sale, SaleDraft, SaleItem};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::reconciler::SyncHandler;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the coordination server's HTTP API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    participant_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl ApiClient {
    /// Client for `base_url` acting as `participant_id`.
    pub fn new(base_url: impl Into<String>, participant_id: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(ClientError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            participant_id: participant_id.into(),
        })
    }

    async fn post_json<T: serde::Serialize>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("x-participant-id", &self.participant_id)
            .json(body)
            .send()
            .await?;
        Self::check(response).await
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        // Error bodies carry {error: {code, message}}; anything else keeps
        // the raw status as the code.
        let fallback = ClientError::Server {
            code: format!("HTTP_{}", status.as_u16()),
            message: status.to_string(),
        };
        match response.json::<ErrorBody>().await {
            Ok(body) => Err(ClientError::Server {
                code: body.error.code,
                message: body.error.message,
            }),
            Err(_) => Err(fallback),
        }
    }

    /// Record a sale and return the server's version of it.
    pub async fn record_sale_returning(&self, draft: &SaleDraft) -> Result<Sale> {
        let response = self.post_json("/api/driver/sales", draft).await?;
        Ok(response.json().await?)
    }

    /// Mark a sale settled in cash and return it.
    pub async fn mark_paid_cash_returning(&self, sale_id: i64) -> Result<Sale> {
        let response = self
            .post_json(
                &format!("/api/driver/sales/{sale_id}/mark-paid-cash"),
                &serde_json::json!({}),
            )
            .await?;
        Ok(response.json().await?)
    }

    /// Accept an urgent order as this driver.
    pub async fn accept_order(&self, order_id: i64) -> Result<Sale> {
        let response = self
            .post_json(
                &format!("/api/orders/{order_id}/accept"),
                &serde_json::json!({}),
            )
            .await?;
        Ok(response.json().await?)
    }

    /// Store a durable push subscription for this participant.
    pub async fn subscribe_push(&self, endpoint: &str, keys: &serde_json::Value) -> Result<()> {
        self.post_json(
            "/api/notifications/subscribe",
            &serde_json::json!({ "endpoint": endpoint, "keys": keys }),
        )
        .await?;
        Ok(())
    }

    /// Remove one of this participant's push subscriptions.
    pub async fn unsubscribe_push(&self, endpoint: &str) -> Result<()> {
        self.post_json(
            "/api/notifications/unsubscribe",
            &serde_json::json!({ "endpoint": endpoint }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SyncHandler for ApiClient {
    async fn record_sale(
        &self,
        user_id: &str,
        items: &[SaleItem],
        total: f64,
        is_urgent: bool,
    ) -> Result<()> {
        self.record_sale_returning(&SaleDraft {
            owner_id: user_id.to_string(),
            items: items.to_vec(),
            total,
            is_urgent,
        })
        .await?;
        Ok(())
    }

    async fn mark_paid_cash(&self, sale_id: i64) -> Result<()> {
        self.mark_paid_cash_returning(sale_id).await?;
        Ok(())
    }
}
