// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sync reconciler: replays the offline queue against the server.
//!
//! Replay is strictly ordered (ascending queue id) because queued actions
//! may be causally dependent — a later "mark paid" can reference an earlier
//! "record sale". Skipping or reordering risks corrupting server state, so
//! the reconciler halts at the first failure: applied actions stay applied
//! (no rollback), the failing action and everything after it stay queued,
//! and the whole batch waits for the next restored signal. Server
//! operations must tolerate at-least-once delivery; that contract is on
//! the handlers, not enforced here.
//!
//! Single-flight: a trigger while a drain is in progress returns
//! immediately and never interleaves. Nothing in here escapes as an
//! uncaught failure; callers observe the tri-state [`SyncStatus`].

use async_trait::async_trait;
use dakiya_wire::SaleItem;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::connectivity::{self, ConnectivityMonitor};
use crate::error::Result;
use crate::queue::{ActionKind, ActionQueue, PendingAction};

/// Arguments of a queued `RECORD_SALE` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSalePayload {
    /// Customer the sale belongs to.
    pub user_id: String,
    /// Line items.
    pub items: Vec<SaleItem>,
    /// Total in rupees.
    pub total: f64,
    /// Whether the sale is an urgent order.
    pub is_urgent: bool,
}

/// Arguments of a queued `MARK_PAID_CASH` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPaidCashPayload {
    /// The sale that was settled.
    pub sale_id: i64,
}

/// The server operations the reconciler replays. Implementations must be
/// safely repeatable (at-least-once tolerant).
#[async_trait]
pub trait SyncHandler: Send + Sync {
    /// Record a sale made in the field.
    async fn record_sale(
        &self,
        user_id: &str,
        items: &[SaleItem],
        total: f64,
        is_urgent: bool,
    ) -> Result<()>;

    /// Mark an existing sale as settled in cash.
    async fn mark_paid_cash(&self, sale_id: i64) -> Result<()>;
}

#[async_trait]
impl<H: SyncHandler + ?Sized> SyncHandler for Arc<H> {
    async fn record_sale(
        &self,
        user_id: &str,
        items: &[SaleItem],
        total: f64,
        is_urgent: bool,
    ) -> Result<()> {
        (**self).record_sale(user_id, items, total, is_urgent).await
    }

    async fn mark_paid_cash(&self, sale_id: i64) -> Result<()> {
        (**self).mark_paid_cash(sale_id).await
    }
}

/// User-visible reconciler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Nothing in flight and nothing known to be failing.
    Idle,
    /// A drain of `total` actions is in progress.
    Syncing {
        /// Size of the batch being replayed.
        total: usize,
    },
    /// The last drain halted; the remainder will be retried on the next
    /// restored signal.
    FailedWillRetry,
}

/// What one sync trigger accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every queued action was applied and the queue is now empty.
    Clean {
        /// Actions applied in this drain.
        applied: usize,
    },
    /// The drain halted at a failing action; it and everything after it
    /// stay queued.
    Failed {
        /// Actions applied before the halt.
        applied: usize,
    },
    /// A drain was already in progress; this trigger did nothing.
    AlreadyRunning,
}

/// Drains the offline queue against a [`SyncHandler`], in order,
/// stopping at the first failure.
pub struct SyncReconciler<H> {
    queue: ActionQueue,
    handler: H,
    flight: Mutex<()>,
    status: watch::Sender<SyncStatus>,
}

impl<H: SyncHandler> SyncReconciler<H> {
    /// Reconciler over a queue and the server operations to replay into.
    pub fn new(queue: ActionQueue, handler: H) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            queue,
            handler,
            flight: Mutex::new(()),
            status,
        }
    }

    /// Current tri-state status.
    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes (for status banners and tests).
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Drain the queue once. Never panics and never returns an error; the
    /// outcome and the status channel carry everything a caller needs.
    pub async fn sync(&self) -> SyncOutcome {
        // Single-flight: a re-entrant trigger is ignored, never interleaved.
        let Ok(_guard) = self.flight.try_lock() else {
            debug!("sync already in progress, ignoring trigger");
            return SyncOutcome::AlreadyRunning;
        };

        let actions = match self.queue.drain().await {
            Ok(actions) => actions,
            Err(err) => {
                warn!(error = %err, "could not read offline queue, will retry");
                self.status.send_replace(SyncStatus::FailedWillRetry);
                return SyncOutcome::Failed { applied: 0 };
            }
        };

        if actions.is_empty() {
            self.status.send_replace(SyncStatus::Idle);
            return SyncOutcome::Clean { applied: 0 };
        }

        info!(pending = actions.len(), "replaying offline actions");
        self.status.send_replace(SyncStatus::Syncing {
            total: actions.len(),
        });

        let mut applied: Option<i64> = None;
        let mut applied_count = 0;
        for action in &actions {
            match self.apply(action).await {
                Ok(()) => {
                    applied = Some(action.id);
                    applied_count += 1;
                }
                Err(err) => {
                    warn!(
                        action = action.id,
                        kind = action.kind.as_str(),
                        error = %err,
                        "sync failed, will retry"
                    );
                    // Drop the applied prefix so the failing action and
                    // everything after it stay queued for the next attempt.
                    if let Some(last_ok) = applied {
                        if let Err(err) = self.queue.remove_up_to(last_ok).await {
                            warn!(error = %err, "could not trim applied prefix");
                        }
                    }
                    self.status.send_replace(SyncStatus::FailedWillRetry);
                    return SyncOutcome::Failed {
                        applied: applied_count,
                    };
                }
            }
        }

        if let Err(err) = self.queue.clear_all().await {
            // Applied server-side but still queued locally; handlers are
            // at-least-once tolerant so the next drain repeats safely.
            warn!(error = %err, "drain succeeded but queue clear failed");
            self.status.send_replace(SyncStatus::FailedWillRetry);
            return SyncOutcome::Failed {
                applied: applied_count,
            };
        }

        info!(applied = applied_count, "offline actions synced");
        self.status.send_replace(SyncStatus::Idle);
        SyncOutcome::Clean {
            applied: applied_count,
        }
    }

    async fn apply(&self, action: &PendingAction) -> Result<()> {
        match action.kind {
            ActionKind::RecordSale => {
                let payload: RecordSalePayload = serde_json::from_value(action.payload.clone())?;
                self.handler
                    .record_sale(
                        &payload.user_id,
                        &payload.items,
                        payload.total,
                        payload.is_urgent,
                    )
                    .await
            }
            ActionKind::MarkPaidCash => {
                let payload: MarkPaidCashPayload = serde_json::from_value(action.payload.clone())?;
                self.handler.mark_paid_cash(payload.sale_id).await
            }
        }
    }

    /// Drive loop: sync once at startup if online, then on every restored
    /// signal. Runs until the monitor is dropped.
    pub async fn run(&self, monitor: &ConnectivityMonitor) {
        let mut transitions = monitor.subscribe();
        if monitor.is_online() {
            self.sync().await;
        }
        while connectivity::wait_for_restored(&mut transitions).await {
            self.sync().await;
        }
    }
}
