// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connectivity monitor.
//!
//! Reports the device's believed online state and its transitions. Advisory
//! only: a restored signal does not guarantee the server is reachable, and
//! the reconciler treats a failed call identically to "still offline"
//! regardless of what the monitor last reported.

use tokio::sync::watch;

/// Current online state plus a transition stream.
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Monitor starting in the given state.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx }
    }

    /// Whether the device currently believes it is online.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report a state change. Idempotent: repeating the current state emits
    /// no transition.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current != online {
                *current = online;
                true
            } else {
                false
            }
        });
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Wait until the next offline→online transition ("restored").
///
/// Returns false when the monitor has been dropped.
pub async fn wait_for_restored(receiver: &mut watch::Receiver<bool>) -> bool {
    loop {
        if receiver.changed().await.is_err() {
            return false;
        }
        if *receiver.borrow_and_update() {
            return true;
        }
    }
}
