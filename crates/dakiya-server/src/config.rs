// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Dakiya server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL for durable stores
    pub database_url: String,
    /// HTTP/WebSocket listen address
    pub http_addr: SocketAddr,
    /// Depot latitude used for urgent-order driver assignment
    pub depot_lat: f64,
    /// Depot longitude used for urgent-order driver assignment
    pub depot_lon: f64,
    /// Radius around the depot in which drivers are eligible for urgent orders
    pub dispatch_radius_km: f64,
    /// How many of the closest eligible drivers to notify per urgent order
    pub dispatch_driver_limit: usize,
    /// Presence records older than this are excluded from proximity queries
    pub presence_ttl: Duration,
    /// Per-subscription timeout for durable push attempts
    pub push_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `DAKIYA_DATABASE_URL`: SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `DAKIYA_HTTP_PORT`: listen port (default: 8080)
    /// - `DAKIYA_DEPOT_LAT` / `DAKIYA_DEPOT_LON`: depot coordinates
    ///   (default: 23.1793 / 75.7849)
    /// - `DAKIYA_DISPATCH_RADIUS_KM`: urgent-order radius (default: 10)
    /// - `DAKIYA_DISPATCH_DRIVER_LIMIT`: drivers notified per urgent order
    ///   (default: 3)
    /// - `DAKIYA_PRESENCE_TTL_SECS`: proximity staleness cutoff (default: 300)
    /// - `DAKIYA_PUSH_TIMEOUT_MS`: push attempt timeout (default: 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DAKIYA_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("DAKIYA_DATABASE_URL"))?;

        let http_port: u16 = std::env::var("DAKIYA_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("DAKIYA_HTTP_PORT", "must be a valid port number")
            })?;

        let depot_lat: f64 = std::env::var("DAKIYA_DEPOT_LAT")
            .unwrap_or_else(|_| "23.1793".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("DAKIYA_DEPOT_LAT", "must be a latitude"))?;

        let depot_lon: f64 = std::env::var("DAKIYA_DEPOT_LON")
            .unwrap_or_else(|_| "75.7849".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("DAKIYA_DEPOT_LON", "must be a longitude"))?;

        let dispatch_radius_km: f64 = std::env::var("DAKIYA_DISPATCH_RADIUS_KM")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("DAKIYA_DISPATCH_RADIUS_KM", "must be a distance in km")
            })?;

        let dispatch_driver_limit: usize = std::env::var("DAKIYA_DISPATCH_DRIVER_LIMIT")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("DAKIYA_DISPATCH_DRIVER_LIMIT", "must be a positive integer")
            })?;

        let presence_ttl_secs: u64 = std::env::var("DAKIYA_PRESENCE_TTL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("DAKIYA_PRESENCE_TTL_SECS", "must be a duration in seconds")
            })?;

        let push_timeout_ms: u64 = std::env::var("DAKIYA_PUSH_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("DAKIYA_PUSH_TIMEOUT_MS", "must be a duration in ms")
            })?;

        if !(-90.0..=90.0).contains(&depot_lat) {
            return Err(ConfigError::Invalid(
                "DAKIYA_DEPOT_LAT",
                "must be between -90 and 90",
            ));
        }
        if !(-180.0..=180.0).contains(&depot_lon) {
            return Err(ConfigError::Invalid(
                "DAKIYA_DEPOT_LON",
                "must be between -180 and 180",
            ));
        }

        Ok(Self {
            database_url,
            http_addr: SocketAddr::from(([0, 0, 0, 0], http_port)),
            depot_lat,
            depot_lon,
            dispatch_radius_km,
            dispatch_driver_limit,
            presence_ttl: Duration::from_secs(presence_ttl_secs),
            push_timeout: Duration::from_millis(push_timeout_ms),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    fn clear_optional(guard: &mut EnvGuard) {
        for key in [
            "DAKIYA_HTTP_PORT",
            "DAKIYA_DEPOT_LAT",
            "DAKIYA_DEPOT_LON",
            "DAKIYA_DISPATCH_RADIUS_KM",
            "DAKIYA_DISPATCH_DRIVER_LIMIT",
            "DAKIYA_PRESENCE_TTL_SECS",
            "DAKIYA_PUSH_TIMEOUT_MS",
        ] {
            guard.remove(key);
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("DAKIYA_DATABASE_URL", "sqlite:dakiya.db");
        clear_optional(&mut guard);

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "sqlite:dakiya.db");
        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(config.dispatch_driver_limit, 3);
        assert_eq!(config.presence_ttl, Duration::from_secs(300));
        assert_eq!(config.push_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn test_config_from_env_custom_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("DAKIYA_DATABASE_URL", "sqlite::memory:");
        clear_optional(&mut guard);
        guard.set("DAKIYA_HTTP_PORT", "9090");
        guard.set("DAKIYA_DISPATCH_RADIUS_KM", "2.5");
        guard.set("DAKIYA_PRESENCE_TTL_SECS", "60");

        let config = Config::from_env().unwrap();

        assert_eq!(config.http_addr.port(), 9090);
        assert_eq!(config.dispatch_radius_km, 2.5);
        assert_eq!(config.presence_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("DAKIYA_DATABASE_URL");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::Missing("DAKIYA_DATABASE_URL")
        ));
    }

    #[test]
    fn test_config_invalid_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("DAKIYA_DATABASE_URL", "sqlite::memory:");
        clear_optional(&mut guard);
        guard.set("DAKIYA_HTTP_PORT", "not_a_port");

        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("DAKIYA_HTTP_PORT", _)
        ));
    }

    #[test]
    fn test_config_depot_out_of_range() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("DAKIYA_DATABASE_URL", "sqlite::memory:");
        clear_optional(&mut guard);
        guard.set("DAKIYA_DEPOT_LAT", "123.0");

        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("DAKIYA_DEPOT_LAT", _)
        ));
    }
}
