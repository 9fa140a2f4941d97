// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Geospatial presence index for available drivers.
//!
//! A driver is *present* while its connection has sent `start_broadcast`
//! and not yet closed; availability is a hard gate on proximity queries,
//! not a staleness heuristic. On top of that, records whose last location
//! update is older than the configured TTL stop matching queries, which
//! bounds the damage of a severed connection the transport has not yet
//! noticed.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates in kilometres.
///
/// Haversine form; the asin argument is clamped so boundary coordinates
/// (poles, antimeridian) and float rounding can never produce NaN.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Last-known position of one available driver.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRecord {
    /// Driver identity.
    pub driver_id: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// When the position was last reported.
    pub last_updated: DateTime<Utc>,
}

#[derive(Default)]
struct PresenceState {
    available: HashSet<String>,
    locations: HashMap<String, (f64, f64, DateTime<Utc>)>,
}

/// Which drivers are available, and where they last were.
pub struct PresenceIndex {
    ttl: Option<Duration>,
    inner: RwLock<PresenceState>,
}

impl PresenceIndex {
    /// Index without a staleness cutoff.
    pub fn new() -> Self {
        Self {
            ttl: None,
            inner: RwLock::new(PresenceState::default()),
        }
    }

    /// Index that excludes records older than `ttl` from proximity queries.
    pub fn with_ttl(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).ok(),
            inner: RwLock::new(PresenceState::default()),
        }
    }

    /// Mark a driver as broadcasting.
    pub async fn set_available(&self, driver_id: &str) {
        let mut state = self.inner.write().await;
        state.available.insert(driver_id.to_string());
        debug!(driver = driver_id, "driver available");
    }

    /// Remove a driver and its presence record. Called from the owning
    /// connection's close handler.
    pub async fn set_unavailable(&self, driver_id: &str) {
        let mut state = self.inner.write().await;
        state.available.remove(driver_id);
        state.locations.remove(driver_id);
        debug!(driver = driver_id, "driver unavailable");
    }

    /// Upsert the last-known coordinates. Meaningful only while the driver
    /// is available; stored regardless so a late `start_broadcast` does not
    /// lose the freshest position.
    pub async fn update_location(&self, driver_id: &str, lat: f64, lon: f64) {
        let mut state = self.inner.write().await;
        state
            .locations
            .insert(driver_id.to_string(), (lat, lon, Utc::now()));
    }

    /// Available drivers with a fresh location within `radius_km` of the
    /// origin, sorted nearest first.
    pub async fn query_nearby(&self, lat: f64, lon: f64, radius_km: f64) -> Vec<String> {
        let now = Utc::now();
        let state = self.inner.read().await;
        let mut hits: Vec<(String, f64)> = state
            .available
            .iter()
            .filter_map(|driver_id| {
                let (d_lat, d_lon, updated) = state.locations.get(driver_id)?;
                if let Some(ttl) = self.ttl {
                    if now - *updated > ttl {
                        return None;
                    }
                }
                let distance = haversine_km(lat, lon, *d_lat, *d_lon);
                (distance <= radius_km).then(|| (driver_id.clone(), distance))
            })
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.into_iter().map(|(driver_id, _)| driver_id).collect()
    }

    /// The presence record for one driver, if it is available and located.
    pub async fn record(&self, driver_id: &str) -> Option<PresenceRecord> {
        let state = self.inner.read().await;
        if !state.available.contains(driver_id) {
            return None;
        }
        let (lat, lon, last_updated) = state.locations.get(driver_id)?;
        Some(PresenceRecord {
            driver_id: driver_id.to_string(),
            lat: *lat,
            lon: *lon,
            last_updated: *last_updated,
        })
    }

    /// Number of drivers currently broadcasting.
    pub async fn available_count(&self) -> usize {
        self.inner.read().await.available.len()
    }
}

impl Default for PresenceIndex {
    fn default() -> Self {
        Self::new()
    }
}
