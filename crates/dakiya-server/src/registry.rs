// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory connection registry.
//!
//! Tracks every open realtime channel plus the identity → channel binding
//! established by the identify handshake. The registry is intentionally
//! ephemeral: a process restart loses all registrations and participants
//! reconnect and re-identify.
//!
//! Reconnect race: a driver whose channel drops may identify over a fresh
//! channel before the old channel's close handler runs. Registrations are
//! therefore stamped with a [`ConnectionId`] and [`ConnectionRegistry::unregister`]
//! removes an entry only when the stamp still matches, so a stale close
//! never evicts a newer registration. The check and the removal share one
//! lock scope with no await point between them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dakiya_wire::RealtimeMessage;
use tokio::sync::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Process-unique handle for one realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct RegisteredConnection {
    connection_id: ConnectionId,
    sender: mpsc::Sender<RealtimeMessage>,
}

/// Identity → live channel map with broadcast fan-out.
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    /// Every open channel, identified or not. Broadcasts fan out over this.
    channels: RwLock<HashMap<ConnectionId, mpsc::Sender<RealtimeMessage>>>,
    /// Channels that completed the identify handshake. Targeted sends only.
    identified: RwLock<HashMap<String, RegisteredConnection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            channels: RwLock::new(HashMap::new()),
            identified: RwLock::new(HashMap::new()),
        }
    }

    /// Track a newly opened channel and hand back its id.
    pub async fn connect(&self, sender: mpsc::Sender<RealtimeMessage>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.channels.write().await.insert(id, sender);
        debug!(connection = %id, "channel opened");
        id
    }

    /// Drop a channel from the broadcast set. Call from the close handler
    /// after [`Self::unregister`].
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.channels.write().await.remove(&connection_id);
        debug!(connection = %connection_id, "channel closed");
    }

    /// Bind an identity to a channel. A newer registration replaces any
    /// older one for the same identity.
    ///
    /// Returns false when the channel is no longer open.
    pub async fn register(&self, identity: &str, connection_id: ConnectionId) -> bool {
        let sender = {
            let channels = self.channels.read().await;
            match channels.get(&connection_id) {
                Some(sender) => sender.clone(),
                None => {
                    warn!(connection = %connection_id, identity, "register on closed channel");
                    return false;
                }
            }
        };
        let mut identified = self.identified.write().await;
        if let Some(previous) = identified.insert(
            identity.to_string(),
            RegisteredConnection {
                connection_id,
                sender,
            },
        ) {
            debug!(
                identity,
                old = %previous.connection_id,
                new = %connection_id,
                "identity re-registered, newer connection wins"
            );
        }
        true
    }

    /// Remove an identity binding, but only if `connection_id` is still the
    /// channel on record. A stale close of an already-replaced channel is a
    /// no-op.
    ///
    /// Returns true when this call removed the binding.
    pub async fn unregister(&self, identity: &str, connection_id: ConnectionId) -> bool {
        let mut identified = self.identified.write().await;
        match identified.get(identity) {
            Some(current) if current.connection_id == connection_id => {
                identified.remove(identity);
                debug!(identity, connection = %connection_id, "identity unregistered");
                true
            }
            Some(current) => {
                debug!(
                    identity,
                    stale = %connection_id,
                    current = %current.connection_id,
                    "ignoring stale unregister"
                );
                false
            }
            None => false,
        }
    }

    /// Deliver a message to the channel bound to `identity`.
    ///
    /// Returns false when no live channel exists (caller may fall back to
    /// durable push) or the channel has gone away.
    pub async fn send_to(&self, identity: &str, message: RealtimeMessage) -> bool {
        let sender = {
            let identified = self.identified.read().await;
            match identified.get(identity) {
                Some(entry) => entry.sender.clone(),
                None => return false,
            }
        };
        sender.send(message).await.is_ok()
    }

    /// Fan a message out to every open channel, identified or not.
    ///
    /// Best-effort: channels with a full or closed outbound queue are
    /// skipped. Returns the number of channels the message was handed to.
    pub async fn broadcast(&self, message: RealtimeMessage) -> usize {
        let senders: Vec<_> = {
            let channels = self.channels.read().await;
            channels.values().cloned().collect()
        };
        let mut delivered = 0;
        for sender in senders {
            match sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => debug!(error = %err, "broadcast skipped a channel"),
            }
        }
        delivered
    }

    /// Number of open channels (identified or not).
    pub async fn connection_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Whether `identity` currently has a live registered channel.
    pub async fn is_registered(&self, identity: &str) -> bool {
        self.identified.read().await.contains_key(identity)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
