// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Control plane configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Database connection pool size.
    pub db_max_connections: u32,
    /// S3-compatible object store endpoint.
    pub s3_endpoint: String,
    /// Object store access key.
    pub s3_access_key: String,
    /// Object store secret key.
    pub s3_secret_key: String,
    /// Bucket holding function artifacts.
    pub s3_bucket: String,
    /// Region passed to the S3 client (MinIO ignores it).
    pub s3_region: String,
    /// NATS server URL. `None` disables the event bus.
    pub nats_url: Option<String>,
    /// A node with no heartbeat for this long is marked offline.
    pub heartbeat_stale_after: Duration,
    /// How often the status sweeper runs.
    pub sweep_interval: Duration,
    /// Lifetime of presigned artifact download URLs.
    pub signed_url_ttl: Duration,
    /// An `in_progress` sync record older than this is abandoned.
    pub sync_stale_after: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All variables have defaults suitable for local development:
    ///
    /// - `SERVER_PORT` (default: 8000)
    /// - `DATABASE_URL` (default: `postgres://localhost:5432/edgebase`)
    /// - `DB_MAX_CONNECTIONS` (default: 25)
    /// - `S3_ENDPOINT` (default: `http://localhost:9000`)
    /// - `S3_ACCESS_KEY` / `S3_SECRET_KEY` (default: `admin` / `password`)
    /// - `S3_BUCKET` (default: `wasm-functions`)
    /// - `S3_REGION` (default: `us-east-1`)
    /// - `NATS_URL` (unset: event bus disabled)
    /// - `HEARTBEAT_STALE_SECS` (default: 90)
    /// - `SWEEP_INTERVAL_SECS` (default: 10)
    /// - `SIGNED_URL_TTL_SECS` (default: 900)
    /// - `SYNC_STALE_SECS` (default: 600)
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = std::env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("SERVER_PORT", "must be a valid port number"))?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost:5432/edgebase".to_string());

        let db_max_connections = parse_env("DB_MAX_CONNECTIONS", 25)?;

        let s3_endpoint =
            std::env::var("S3_ENDPOINT").unwrap_or_else(|_| "http://localhost:9000".to_string());
        let s3_access_key = std::env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "admin".to_string());
        let s3_secret_key =
            std::env::var("S3_SECRET_KEY").unwrap_or_else(|_| "password".to_string());
        let s3_bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "wasm-functions".to_string());
        let s3_region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());

        let nats_url = std::env::var("NATS_URL").ok().filter(|v| !v.is_empty());

        let heartbeat_stale_after = Duration::from_secs(parse_env("HEARTBEAT_STALE_SECS", 90)?);
        let sweep_interval = Duration::from_secs(parse_env("SWEEP_INTERVAL_SECS", 10)?);
        let signed_url_ttl = Duration::from_secs(parse_env("SIGNED_URL_TTL_SECS", 900)?);
        let sync_stale_after = Duration::from_secs(parse_env("SYNC_STALE_SECS", 600)?);

        Ok(Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            database_url,
            db_max_connections,
            s3_endpoint,
            s3_access_key,
            s3_secret_key,
            s3_bucket,
            s3_region,
            nats_url,
            heartbeat_stale_after,
            sweep_interval,
            signed_url_ttl,
            sync_stale_after,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(key, "must be a positive integer")),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {0}: {1}")]
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

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        for key in [
            "SERVER_PORT",
            "DATABASE_URL",
            "DB_MAX_CONNECTIONS",
            "S3_ENDPOINT",
            "S3_BUCKET",
            "NATS_URL",
            "HEARTBEAT_STALE_SECS",
            "SWEEP_INTERVAL_SECS",
            "SIGNED_URL_TTL_SECS",
            "SYNC_STALE_SECS",
        ] {
            guard.remove(key);
        }

        let config = Config::from_env().unwrap();

        assert_eq!(config.listen_addr.port(), 8000);
        assert_eq!(config.database_url, "postgres://localhost:5432/edgebase");
        assert_eq!(config.db_max_connections, 25);
        assert_eq!(config.s3_bucket, "wasm-functions");
        assert!(config.nats_url.is_none());
        assert_eq!(config.heartbeat_stale_after, Duration::from_secs(90));
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.signed_url_ttl, Duration::from_secs(900));
        assert_eq!(config.sync_stale_after, Duration::from_secs(600));
    }

    #[test]
    fn test_config_custom_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("SERVER_PORT", "9090");
        guard.set("DATABASE_URL", "postgres://db:5432/prod");
        guard.set("NATS_URL", "nats://localhost:4222");
        guard.set("HEARTBEAT_STALE_SECS", "120");
        guard.set("SIGNED_URL_TTL_SECS", "300");

        let config = Config::from_env().unwrap();

        assert_eq!(config.listen_addr.port(), 9090);
        assert_eq!(config.database_url, "postgres://db:5432/prod");
        assert_eq!(config.nats_url.as_deref(), Some("nats://localhost:4222"));
        assert_eq!(config.heartbeat_stale_after, Duration::from_secs(120));
        assert_eq!(config.signed_url_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_config_invalid_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("SERVER_PORT", "not_a_number");

        let result = Config::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid("SERVER_PORT", _))
        ));
    }

    #[test]
    fn test_config_empty_nats_url_disables_bus() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("NATS_URL", "");

        let config = Config::from_env().unwrap();
        assert!(config.nats_url.is_none());
    }
}
