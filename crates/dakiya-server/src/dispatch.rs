// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Notification dispatch: live fan-out plus durable push.
//!
//! Two independent delivery paths. The *live* path goes through the
//! connection registry: best-effort, no acknowledgment, no retry — a
//! recipient without an open channel is simply skipped. The *durable* path
//! delivers through stored push subscriptions and works while the
//! recipient's process is not running; it is the fallback whenever a
//! targeted live send finds no channel.
//!
//! Push payloads must be idempotent-safe: the push service may redeliver,
//! so a notification carries state ("order 42 accepted"), never an
//! instruction whose repetition would duplicate a side effect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dakiya_wire::{PushSubscription, RealtimeMessage, Sale};
use futures::future::join_all;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::presence::PresenceIndex;
use crate::registry::ConnectionRegistry;
use crate::store::SqliteStore;

/// Why a single push attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The endpoint no longer exists; the subscription must be deleted and
    /// never retried.
    #[error("push endpoint permanently gone")]
    Gone,

    /// Transient failure (timeout, connection refused, 5xx). The
    /// subscription is kept for next time.
    #[error("push delivery failed: {0}")]
    Transient(String),
}

/// Send primitive for one push subscription. The underlying push protocol
/// is a capability, not a design concern here.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Attempt one delivery. Implementations bound their own timeout.
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> std::result::Result<(), PushError>;
}

/// HTTP push transport: POSTs the payload to the subscription endpoint.
pub struct HttpPushTransport {
    client: reqwest::Client,
}

impl HttpPushTransport {
    /// Build a transport whose every attempt times out after `timeout`.
    pub fn new(timeout: Duration) -> std::result::Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> std::result::Result<(), PushError> {
        let response = self
            .client
            .post(&subscription.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|err| PushError::Transient(err.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(PushError::Gone),
            status if status.is_success() => Ok(()),
            status => Err(PushError::Transient(format!("push service returned {status}"))),
        }
    }
}

/// Outcome of a durable push batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Subscriptions a delivery was attempted for.
    pub attempted: usize,
    /// Attempts the push service accepted.
    pub delivered: usize,
    /// Endpoints removed because the service reported them gone.
    pub removed: Vec<String>,
}

/// How a targeted notification reached (or failed to reach) its recipient.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to a live channel.
    Live,
    /// No live channel; went out over durable push.
    Push(PushReport),
    /// No live channel and no stored subscription either.
    NoRoute,
}

enum Attempt {
    Delivered,
    Gone(String),
    Failed,
}

/// Live + durable notification delivery over the registry and the
/// subscription store.
pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
    store: SqliteStore,
    transport: Arc<dyn PushTransport>,
}

impl NotificationDispatcher {
    /// Build a dispatcher over an existing registry and store.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: SqliteStore,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        Self {
            registry,
            store,
            transport,
        }
    }

    /// Live fan-out to every open channel. Best-effort.
    pub async fn broadcast(&self, message: RealtimeMessage) -> usize {
        let delivered = self.registry.broadcast(message).await;
        debug!(channels = delivered, "broadcast fanned out");
        delivered
    }

    /// Targeted delivery: live channel first, durable push as fallback.
    pub async fn notify(&self, identity: &str, message: RealtimeMessage) -> Result<Delivery> {
        if self.registry.send_to(identity, message.clone()).await {
            return Ok(Delivery::Live);
        }

        let subscriptions = self.store.subscriptions_for_owner(identity).await?;
        if subscriptions.is_empty() {
            debug!(identity, kind = message.kind(), "no route for notification");
            return Ok(Delivery::NoRoute);
        }

        let payload = message.to_json().map_err(|err| match err {
            dakiya_wire::WireError::Malformed(inner) => {
                crate::error::ServerError::Serialization(inner)
            }
        })?;
        let report = self.push(&subscriptions, payload.as_bytes()).await;
        Ok(Delivery::Push(report))
    }

    /// Attempt every subscription independently and concurrently. One
    /// failure never aborts the others; endpoints reported permanently gone
    /// are deleted from durable storage.
    pub async fn push(&self, subscriptions: &[PushSubscription], payload: &[u8]) -> PushReport {
        let attempts = subscriptions.iter().map(|subscription| async move {
            match self.transport.deliver(subscription, payload).await {
                Ok(()) => Attempt::Delivered,
                Err(PushError::Gone) => {
                    warn!(endpoint = %subscription.endpoint, "push endpoint gone, dropping subscription");
                    Attempt::Gone(subscription.endpoint.clone())
                }
                Err(PushError::Transient(reason)) => {
                    warn!(endpoint = %subscription.endpoint, reason, "push attempt failed, keeping subscription");
                    Attempt::Failed
                }
            }
        });

        let mut report = PushReport {
            attempted: subscriptions.len(),
            ..PushReport::default()
        };

        for outcome in join_all(attempts).await {
            match outcome {
                Attempt::Delivered => report.delivered += 1,
                Attempt::Gone(endpoint) => {
                    match self.store.remove_subscription(&endpoint).await {
                        Ok(_) => report.removed.push(endpoint),
                        Err(err) => {
                            warn!(endpoint, error = %err, "failed to drop gone subscription")
                        }
                    }
                }
                Attempt::Failed => {}
            }
        }

        report
    }

    /// Urgent-order fan-out: broadcast to every channel (back office and
    /// customers watch these), then target the closest available drivers
    /// within `radius_km` of the depot, falling back to durable push for
    /// drivers whose channel just dropped.
    pub async fn dispatch_urgent_order(
        &self,
        sale: &Sale,
        presence: &PresenceIndex,
        depot: (f64, f64),
        radius_km: f64,
        driver_limit: usize,
    ) -> Result<Vec<(String, Delivery)>> {
        self.broadcast(RealtimeMessage::NewUrgentOrder(sale.clone()))
            .await;

        let (depot_lat, depot_lon) = depot;
        let eligible = presence.query_nearby(depot_lat, depot_lon, radius_km).await;
        if eligible.is_empty() {
            warn!(sale = sale.id, "no available drivers near the depot");
            return Ok(Vec::new());
        }

        let mut notified = Vec::new();
        for driver_id in eligible.into_iter().take(driver_limit) {
            let delivery = self
                .notify(&driver_id, RealtimeMessage::NewUrgentOrder(sale.clone()))
                .await?;
            info!(sale = sale.id, driver = %driver_id, ?delivery, "urgent order offered");
            notified.push((driver_id, delivery));
        }
        Ok(notified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dakiya_wire::{PaymentStatus, SaleItem};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Transport whose outcomes are scripted per endpoint.
    struct FakeTransport {
        gone: HashSet<String>,
        transient: HashSet<String>,
        attempts: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn new() -> Self {
            Self {
                gone: HashSet::new(),
                transient: HashSet::new(),
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn gone(mut self, endpoint: &str) -> Self {
            self.gone.insert(endpoint.to_string());
            self
        }

        fn transient(mut self, endpoint: &str) -> Self {
            self.transient.insert(endpoint.to_string());
            self
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PushTransport for FakeTransport {
        async fn deliver(
            &self,
            subscription: &PushSubscription,
            _payload: &[u8],
        ) -> std::result::Result<(), PushError> {
            self.attempts
                .lock()
                .unwrap()
                .push(subscription.endpoint.clone());
            if self.gone.contains(&subscription.endpoint) {
                Err(PushError::Gone)
            } else if self.transient.contains(&subscription.endpoint) {
                Err(PushError::Transient("timed out".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn subscription(endpoint: &str, owner: &str) -> PushSubscription {
        PushSubscription {
            endpoint: endpoint.to_string(),
            keys: serde_json::json!({"auth": "k"}),
            owner_id: owner.to_string(),
        }
    }

    fn sample_sale() -> Sale {
        Sale {
            id: 1,
            owner_id: "9000000001".to_string(),
            items: vec![SaleItem {
                name: "Tomato".to_string(),
                quantity: "250g".to_string(),
                price: 10.0,
            }],
            total: 10.0,
            is_urgent: true,
            payment_status: PaymentStatus::Unpaid,
            created_at: chrono::Utc::now(),
        }
    }

    async fn dispatcher_with(
        transport: Arc<FakeTransport>,
    ) -> (NotificationDispatcher, Arc<ConnectionRegistry>, SqliteStore) {
        let registry = Arc::new(ConnectionRegistry::new());
        let store = SqliteStore::in_memory().await.unwrap();
        let dispatcher =
            NotificationDispatcher::new(registry.clone(), store.clone(), transport);
        (dispatcher, registry, store)
    }

    #[tokio::test]
    async fn test_push_gone_endpoint_removed_others_attempted() {
        let transport = Arc::new(FakeTransport::new().gone("https://push/2"));
        let (dispatcher, _registry, store) = dispatcher_with(transport.clone()).await;

        let subs = vec![
            subscription("https://push/1", "u"),
            subscription("https://push/2", "u"),
            subscription("https://push/3", "u"),
        ];
        for sub in &subs {
            store.upsert_subscription(sub).await.unwrap();
        }

        let report = dispatcher.push(&subs, b"{}").await;

        // Every subscription was attempted, only the gone one was dropped.
        let mut attempts = transport.attempts();
        attempts.sort();
        assert_eq!(
            attempts,
            vec!["https://push/1", "https://push/2", "https://push/3"]
        );
        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.removed, vec!["https://push/2".to_string()]);

        let remaining: Vec<_> = store
            .all_subscriptions()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.endpoint)
            .collect();
        assert!(!remaining.contains(&"https://push/2".to_string()));
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_push_transient_failure_keeps_subscription() {
        let transport = Arc::new(FakeTransport::new().transient("https://push/1"));
        let (dispatcher, _registry, store) = dispatcher_with(transport).await;

        let sub = subscription("https://push/1", "u");
        store.upsert_subscription(&sub).await.unwrap();

        let report = dispatcher.push(&[sub], b"{}").await;

        assert_eq!(report.attempted, 1);
        assert_eq!(report.delivered, 0);
        assert!(report.removed.is_empty());
        assert_eq!(store.all_subscriptions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_notify_prefers_live_channel() {
        let transport = Arc::new(FakeTransport::new());
        let (dispatcher, registry, store) = dispatcher_with(transport.clone()).await;

        let (tx, mut rx) = mpsc::channel(8);
        let conn = registry.connect(tx).await;
        registry.register("driver-1", conn).await;
        // A stored subscription must not be touched while the channel lives.
        store
            .upsert_subscription(&subscription("https://push/1", "driver-1"))
            .await
            .unwrap();

        let delivery = dispatcher
            .notify("driver-1", RealtimeMessage::WishlistCleared {})
            .await
            .unwrap();

        assert_eq!(delivery, Delivery::Live);
        assert_eq!(rx.recv().await, Some(RealtimeMessage::WishlistCleared {}));
        assert!(transport.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_notify_falls_back_to_push() {
        let transport = Arc::new(FakeTransport::new());
        let (dispatcher, _registry, store) = dispatcher_with(transport.clone()).await;

        store
            .upsert_subscription(&subscription("https://push/1", "driver-1"))
            .await
            .unwrap();

        let delivery = dispatcher
            .notify("driver-1", RealtimeMessage::WishlistCleared {})
            .await
            .unwrap();

        match delivery {
            Delivery::Push(report) => {
                assert_eq!(report.attempted, 1);
                assert_eq!(report.delivered, 1);
            }
            other => panic!("expected push fallback, got {:?}", other),
        }
        assert_eq!(transport.attempts(), vec!["https://push/1"]);
    }

    #[tokio::test]
    async fn test_notify_without_route() {
        let transport = Arc::new(FakeTransport::new());
        let (dispatcher, _registry, _store) = dispatcher_with(transport).await;

        let delivery = dispatcher
            .notify("stranger", RealtimeMessage::WishlistCleared {})
            .await
            .unwrap();

        assert_eq!(delivery, Delivery::NoRoute);
    }

    #[tokio::test]
    async fn test_urgent_order_targets_closest_drivers() {
        let transport = Arc::new(FakeTransport::new());
        let (dispatcher, registry, store) = dispatcher_with(transport).await;
        let presence = PresenceIndex::new();
        let depot = (23.1793, 75.7849);

        // Four available drivers at increasing distance from the depot;
        // "d4" is outside the radius entirely.
        let km_per_deg = 111.194_926_644_558_74;
        for (id, offset_km) in [("d1", 1.0), ("d2", 2.0), ("d3", 3.0), ("d4", 20.0)] {
            presence.set_available(id).await;
            presence
                .update_location(id, depot.0 + offset_km / km_per_deg, depot.1)
                .await;
        }

        // d1 and d2 hold live channels; d3 lost its channel but has a
        // durable subscription.
        let (tx1, mut rx1) = mpsc::channel(8);
        let conn1 = registry.connect(tx1).await;
        registry.register("d1", conn1).await;
        let (tx2, mut rx2) = mpsc::channel(8);
        let conn2 = registry.connect(tx2).await;
        registry.register("d2", conn2).await;
        store
            .upsert_subscription(&subscription("https://push/d3", "d3"))
            .await
            .unwrap();

        let notified = dispatcher
            .dispatch_urgent_order(&sample_sale(), &presence, depot, 10.0, 3)
            .await
            .unwrap();

        let ids: Vec<_> = notified.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec!["d1", "d2", "d3"]);
        assert_eq!(notified[0].1, Delivery::Live);
        assert_eq!(notified[1].1, Delivery::Live);
        assert!(matches!(notified[2].1, Delivery::Push(_)));

        // Live drivers got the broadcast plus their targeted offer.
        assert!(rx1.recv().await.is_some());
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }
}
