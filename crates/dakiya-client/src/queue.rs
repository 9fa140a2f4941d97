// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable offline action queue.
//!
//! An append-only, ordered, crash-surviving store of actions taken while
//! offline. Ids are queue-assigned, strictly increasing, and never reused
//! (SQLite AUTOINCREMENT). The payload is opaque at this layer; the
//! reconciler decodes it when replaying.
//!
//! An enqueue that cannot be persisted propagates the failure to the
//! caller — a field sale must never be dropped silently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::{ClientError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pending_actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    enqueued_at TEXT NOT NULL
);
"#;

/// What a queued action asks the server to do. Extensible; the queue never
/// interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Record a sale made in the field.
    RecordSale,
    /// Mark an existing sale as settled in cash.
    MarkPaidCash,
}

impl ActionKind {
    /// Stable string form as stored in the queue.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::RecordSale => "RECORD_SALE",
            ActionKind::MarkPaidCash => "MARK_PAID_CASH",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RECORD_SALE" => Some(ActionKind::RecordSale),
            "MARK_PAID_CASH" => Some(ActionKind::MarkPaidCash),
            _ => None,
        }
    }
}

/// One queued action awaiting replay.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    /// Queue-assigned id; replay order is ascending id.
    pub id: i64,
    /// What the action does.
    pub kind: ActionKind,
    /// Operation arguments, opaque to the queue.
    pub payload: serde_json::Value,
    /// When the action was taken.
    pub enqueued_at: DateTime<Utc>,
}

/// SQLite-backed durable queue.
#[derive(Clone)]
pub struct ActionQueue {
    pool: SqlitePool,
}

impl ActionQueue {
    /// Open (creating if necessary) the queue database at `url`.
    pub async fn open(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(ClientError::Storage)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;
        let queue = Self { pool };
        queue.init_schema().await?;
        Ok(queue)
    }

    /// In-memory queue for tests. Single connection: each SQLite memory
    /// database is private to its connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let queue = Self { pool };
        queue.init_schema().await?;
        Ok(queue)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Append an action with a fresh increasing id. Returns the id.
    pub async fn enqueue(&self, kind: ActionKind, payload: &serde_json::Value) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO pending_actions (kind, payload, enqueued_at) VALUES (?, ?, ?)",
        )
        .bind(kind.as_str())
        .bind(serde_json::to_string(payload)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// All pending actions, ordered by id ascending.
    pub async fn drain(&self) -> Result<Vec<PendingAction>> {
        let rows: Vec<(i64, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, kind, payload, enqueued_at FROM pending_actions ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, kind, payload, enqueued_at)| {
                let kind = ActionKind::parse(&kind).ok_or_else(|| {
                    ClientError::Config(format!("unknown queued action kind '{kind}'"))
                })?;
                Ok(PendingAction {
                    id,
                    kind,
                    payload: serde_json::from_str(&payload)?,
                    enqueued_at,
                })
            })
            .collect()
    }

    /// Empty the store. Invoked only after a fully successful drain.
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM pending_actions")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove every action with id at or below `id`. Used on the failure
    /// path to drop the applied prefix so the failing action and everything
    /// after it stay queued.
    pub async fn remove_up_to(&self, id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pending_actions WHERE id <= ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of pending actions.
    pub async fn len(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_actions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Whether the queue holds nothing.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
