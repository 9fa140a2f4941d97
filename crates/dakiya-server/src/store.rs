// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed durable stores.
//!
//! Two concerns live here: push subscriptions (durable delivery addresses
//! that outlive any connection) and the sales ledger the replayed offline
//! operations write into. Connection state is deliberately *not* persisted.

use chrono::{DateTime, Utc};
use dakiya_wire::{PaymentStatus, PushSubscription, Sale, SaleDraft, SaleItem};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{Result, ServerError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS push_subscriptions (
    endpoint TEXT PRIMARY KEY,
    keys TEXT NOT NULL,
    owner_id TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_push_subscriptions_owner
    ON push_subscriptions(owner_id);

CREATE TABLE IF NOT EXISTS produce_items (
    name TEXT PRIMARY KEY,
    unit_price REAL NOT NULL,
    available INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS sales (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    total REAL NOT NULL,
    is_urgent INTEGER NOT NULL,
    payment_status TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sale_items (
    sale_id INTEGER NOT NULL REFERENCES sales(id),
    name TEXT NOT NULL,
    quantity TEXT NOT NULL,
    price REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sale_items_sale ON sale_items(sale_id);
"#;

/// Durable store for subscriptions, sales, and the produce catalog.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if necessary) the database at `url` and apply the
    /// schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(ServerError::Database)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory store for tests. Single connection: each SQLite memory
    /// database is private to its connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    // ----- push subscriptions -----

    /// Insert or refresh a subscription. Endpoints are globally unique;
    /// re-subscribing moves the endpoint to the new owner.
    pub async fn upsert_subscription(&self, subscription: &PushSubscription) -> Result<()> {
        let keys = serde_json::to_string(&subscription.keys)?;
        sqlx::query(
            r#"
            INSERT INTO push_subscriptions (endpoint, keys, owner_id)
            VALUES (?, ?, ?)
            ON CONFLICT(endpoint) DO UPDATE SET
                keys = excluded.keys,
                owner_id = excluded.owner_id
            "#,
        )
        .bind(&subscription.endpoint)
        .bind(&keys)
        .bind(&subscription.owner_id)
        .execute(&self.pool)
        .await?;
        info!(owner = %subscription.owner_id, "push subscription stored");
        Ok(())
    }

    /// Delete a subscription by endpoint regardless of owner. Used when a
    /// delivery attempt reports the endpoint permanently gone.
    pub async fn remove_subscription(&self, endpoint: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = ?")
            .bind(endpoint)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete one of `owner`'s subscriptions (explicit unsubscribe).
    pub async fn remove_subscription_for_owner(
        &self,
        owner_id: &str,
        endpoint: &str,
    ) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM push_subscriptions WHERE owner_id = ? AND endpoint = ?")
                .bind(owner_id)
                .bind(endpoint)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All subscriptions held by one identity (multi-device).
    pub async fn subscriptions_for_owner(&self, owner_id: &str) -> Result<Vec<PushSubscription>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT endpoint, keys, owner_id FROM push_subscriptions WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(subscription_from_row).collect()
    }

    /// Every stored subscription.
    pub async fn all_subscriptions(&self) -> Result<Vec<PushSubscription>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT endpoint, keys, owner_id FROM push_subscriptions")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(subscription_from_row).collect()
    }

    // ----- produce catalog -----

    /// Add or replace a catalog entry. Catalog management proper lives in
    /// the back office; this exists for bootstrap and tests.
    pub async fn seed_item(&self, name: &str, unit_price: f64, available: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO produce_items (name, unit_price, available)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                unit_price = excluded.unit_price,
                available = excluded.available
            "#,
        )
        .bind(name)
        .bind(unit_price)
        .bind(available)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flip a catalog entry's availability.
    pub async fn set_item_available(&self, name: &str, available: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE produce_items SET available = ? WHERE name = ?")
            .bind(available)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ----- sales -----

    /// Record a sale with its line items.
    ///
    /// Every item must reference a catalog entry that still exists and is
    /// available; a replayed offline action that references discontinued
    /// produce fails here explicitly so the batch halts instead of
    /// silently dropping the action.
    pub async fn record_sale(&self, draft: &SaleDraft) -> Result<Sale> {
        if draft.owner_id.is_empty() {
            return Err(ServerError::Validation {
                field: "ownerId",
                message: "must not be empty".to_string(),
            });
        }
        if draft.items.is_empty() {
            return Err(ServerError::Validation {
                field: "items",
                message: "sale must contain at least one item".to_string(),
            });
        }

        let mut tx = self.pool.begin().await?;

        for item in &draft.items {
            let row: Option<(bool,)> =
                sqlx::query_as("SELECT available FROM produce_items WHERE name = ?")
                    .bind(&item.name)
                    .fetch_optional(&mut *tx)
                    .await?;
            match row {
                Some((true,)) => {}
                _ => {
                    return Err(ServerError::ItemUnavailable {
                        name: item.name.clone(),
                    });
                }
            }
        }

        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO sales (owner_id, total, is_urgent, payment_status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&draft.owner_id)
        .bind(draft.total)
        .bind(draft.is_urgent)
        .bind(PaymentStatus::Unpaid.as_str())
        .bind(created_at)
        .execute(&mut *tx)
        .await?;
        let sale_id = result.last_insert_rowid();

        for item in &draft.items {
            sqlx::query(
                "INSERT INTO sale_items (sale_id, name, quantity, price) VALUES (?, ?, ?, ?)",
            )
            .bind(sale_id)
            .bind(&item.name)
            .bind(&item.quantity)
            .bind(item.price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(sale = sale_id, owner = %draft.owner_id, urgent = draft.is_urgent, "sale recorded");

        Ok(Sale {
            id: sale_id,
            owner_id: draft.owner_id.clone(),
            items: draft.items.clone(),
            total: draft.total,
            is_urgent: draft.is_urgent,
            payment_status: PaymentStatus::Unpaid,
            created_at,
        })
    }

    /// Mark a sale settled in cash.
    ///
    /// Safely repeatable: marking an already cash-paid sale returns it
    /// unchanged, so an at-least-once replay cannot wedge on its own
    /// earlier success. Marking an online-paid sale is a conflict.
    pub async fn mark_paid_cash(&self, sale_id: i64) -> Result<Sale> {
        let sale = self
            .get_sale(sale_id)
            .await?
            .ok_or(ServerError::SaleNotFound { sale_id })?;

        match sale.payment_status {
            PaymentStatus::PaidCash => {
                warn!(sale = sale_id, "mark_paid_cash replayed on settled sale");
                return Ok(sale);
            }
            PaymentStatus::PaidOnline => {
                return Err(ServerError::Validation {
                    field: "paymentStatus",
                    message: format!("sale {sale_id} was already paid online"),
                });
            }
            PaymentStatus::Unpaid => {}
        }

        sqlx::query("UPDATE sales SET payment_status = ? WHERE id = ?")
            .bind(PaymentStatus::PaidCash.as_str())
            .bind(sale_id)
            .execute(&self.pool)
            .await?;

        info!(sale = sale_id, "sale marked paid in cash");

        Ok(Sale {
            payment_status: PaymentStatus::PaidCash,
            ..sale
        })
    }

    /// Fetch a sale with its line items.
    pub async fn get_sale(&self, sale_id: i64) -> Result<Option<Sale>> {
        let row: Option<(i64, String, f64, bool, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, owner_id, total, is_urgent, payment_status, created_at FROM sales WHERE id = ?",
        )
        .bind(sale_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, owner_id, total, is_urgent, status, created_at)) = row else {
            return Ok(None);
        };

        let items: Vec<(String, String, f64)> =
            sqlx::query_as("SELECT name, quantity, price FROM sale_items WHERE sale_id = ?")
                .bind(sale_id)
                .fetch_all(&self.pool)
                .await?;

        let payment_status = PaymentStatus::parse(&status).ok_or(ServerError::Validation {
            field: "paymentStatus",
            message: format!("unknown stored status '{status}'"),
        })?;

        Ok(Some(Sale {
            id,
            owner_id,
            total,
            is_urgent,
            payment_status,
            created_at,
            items: items
                .into_iter()
                .map(|(name, quantity, price)| SaleItem {
                    name,
                    quantity,
                    price,
                })
                .collect(),
        }))
    }
}

fn subscription_from_row(
    (endpoint, keys, owner_id): (String, String, String),
) -> Result<PushSubscription> {
    Ok(PushSubscription {
        endpoint,
        keys: serde_json::from_str(&keys)?,
        owner_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(endpoint: &str, owner: &str) -> PushSubscription {
        PushSubscription {
            endpoint: endpoint.to_string(),
            keys: serde_json::json!({"p256dh": "key", "auth": "secret"}),
            owner_id: owner.to_string(),
        }
    }

    fn draft(owner: &str) -> SaleDraft {
        SaleDraft {
            owner_id: owner.to_string(),
            items: vec![SaleItem {
                name: "Tomato".to_string(),
                quantity: "250g".to_string(),
                price: 10.0,
            }],
            total: 10.0,
            is_urgent: false,
        }
    }

    #[tokio::test]
    async fn test_subscription_upsert_and_list() {
        let store = SqliteStore::in_memory().await.unwrap();

        store
            .upsert_subscription(&subscription("https://push/1", "u1"))
            .await
            .unwrap();
        store
            .upsert_subscription(&subscription("https://push/2", "u1"))
            .await
            .unwrap();

        let subs = store.subscriptions_for_owner("u1").await.unwrap();
        assert_eq!(subs.len(), 2);

        // Re-subscribing the same endpoint moves it, never duplicates it.
        store
            .upsert_subscription(&subscription("https://push/1", "u2"))
            .await
            .unwrap();
        assert_eq!(store.subscriptions_for_owner("u1").await.unwrap().len(), 1);
        assert_eq!(store.subscriptions_for_owner("u2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_subscription() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert_subscription(&subscription("https://push/1", "u1"))
            .await
            .unwrap();

        assert!(store.remove_subscription("https://push/1").await.unwrap());
        assert!(!store.remove_subscription("https://push/1").await.unwrap());
        assert!(store.all_subscriptions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_for_owner_checks_owner() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert_subscription(&subscription("https://push/1", "u1"))
            .await
            .unwrap();

        assert!(
            !store
                .remove_subscription_for_owner("someone-else", "https://push/1")
                .await
                .unwrap()
        );
        assert!(
            store
                .remove_subscription_for_owner("u1", "https://push/1")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_record_sale_round_trip() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.seed_item("Tomato", 40.0, true).await.unwrap();

        let sale = store.record_sale(&draft("9000000001")).await.unwrap();
        assert_eq!(sale.owner_id, "9000000001");
        assert_eq!(sale.payment_status, PaymentStatus::Unpaid);

        let fetched = store.get_sale(sale.id).await.unwrap().unwrap();
        assert_eq!(fetched.items.len(), 1);
        assert_eq!(fetched.items[0].quantity, "250g");
        assert_eq!(fetched.total, 10.0);
    }

    #[tokio::test]
    async fn test_record_sale_rejects_unknown_item() {
        let store = SqliteStore::in_memory().await.unwrap();

        let err = store.record_sale(&draft("9000000001")).await.unwrap_err();
        assert_eq!(err.error_code(), "ITEM_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_record_sale_rejects_discontinued_item() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.seed_item("Tomato", 40.0, true).await.unwrap();
        store.set_item_available("Tomato", false).await.unwrap();

        let err = store.record_sale(&draft("9000000001")).await.unwrap_err();
        assert_eq!(err.error_code(), "ITEM_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_mark_paid_cash_is_repeatable() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.seed_item("Tomato", 40.0, true).await.unwrap();
        let sale = store.record_sale(&draft("9000000001")).await.unwrap();

        let paid = store.mark_paid_cash(sale.id).await.unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::PaidCash);

        // Replaying the same action succeeds without further effect.
        let replayed = store.mark_paid_cash(sale.id).await.unwrap();
        assert_eq!(replayed.payment_status, PaymentStatus::PaidCash);
    }

    #[tokio::test]
    async fn test_mark_paid_cash_missing_sale() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store.mark_paid_cash(404).await.unwrap_err();
        assert_eq!(err.error_code(), "SALE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_sale_ids_increase() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.seed_item("Tomato", 40.0, true).await.unwrap();

        let first = store.record_sale(&draft("a")).await.unwrap();
        let second = store.record_sale(&draft("b")).await.unwrap();
        assert!(second.id > first.id);
    }
}
