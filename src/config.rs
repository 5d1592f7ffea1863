//! Configuration Module
//!
//! Handles loading the client, retry and gateway settings from environment
//! variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, StoreError};

// == Retry Config ==
/// Retry policy for transient command failures.
///
/// Loaded once at startup and read-only for the lifetime of an executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Enable the retry loop; when false commands run exactly once
    pub enabled: bool,
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Growth factor applied to the delay after every retry
    pub backoff_multiplier: f64,
    /// Treat command timeouts as retryable
    pub retry_on_timeout: bool,
}

impl RetryConfig {
    /// Checks the policy invariants.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 1 {
            return Err(StoreError::InvalidArgument(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(StoreError::InvalidArgument(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(StoreError::InvalidArgument(format!(
                "initial_backoff ({:?}) must not exceed max_backoff ({:?})",
                self.initial_backoff, self.max_backoff
            )));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            retry_on_timeout: false,
        }
    }
}

// == Store Config ==
/// Connection settings for the Redis server.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Logical database index
    pub database: i64,
    /// Per-command timeout
    pub timeout: Duration,
    /// Upper bound for establishing the connection
    pub connect_timeout: Duration,
    /// Accepted for compatibility; the multiplexed connection is shared instead
    pub pool_enabled: bool,
    pub retry: RetryConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            database: 0,
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            pool_enabled: true,
            retry: RetryConfig::default(),
        }
    }
}

// == Backend ==
/// Store implementation used by the gateway binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Remote Redis server
    Redis,
    /// In-process store, useful for local runs without Redis
    Memory,
}

impl FromStr for Backend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Backend::Redis),
            "memory" => Ok(Backend::Memory),
            other => Err(StoreError::InvalidArgument(format!(
                "unknown store backend '{}'",
                other
            ))),
        }
    }
}

// == Config ==
/// Top-level configuration for the gateway.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub store: StoreConfig,
    /// HTTP server port
    pub server_port: u16,
    /// Interval between background health checks
    pub health_check_interval: Duration,
    pub backend: Backend,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`, `REDIS_DATABASE`
    /// - `REDIS_TIMEOUT_MS`, `REDIS_CONNECT_TIMEOUT_MS`, `REDIS_POOL_ENABLED`
    /// - `REDIS_RETRY_ENABLED`, `REDIS_RETRY_MAX_ATTEMPTS`,
    ///   `REDIS_RETRY_INITIAL_BACKOFF_MS`, `REDIS_RETRY_MAX_BACKOFF_MS`,
    ///   `REDIS_RETRY_BACKOFF_MULTIPLIER`, `REDIS_RETRY_ON_TIMEOUT`
    /// - `SERVER_PORT` (default: 3000)
    /// - `HEALTH_CHECK_INTERVAL` in seconds (default: 30)
    /// - `STORE_BACKEND` - `redis` or `memory` (default: redis)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from an arbitrary variable lookup.
    ///
    /// Missing or unparsable values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let store = defaults.store;
        let retry = store.retry;

        let parse = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |name: &str, default: Duration| {
            parse(name).map(Duration::from_millis).unwrap_or(default)
        };
        let flag = |name: &str, default: bool| {
            lookup(name)
                .and_then(|v| v.trim().parse::<bool>().ok())
                .unwrap_or(default)
        };

        Self {
            store: StoreConfig {
                host: lookup("REDIS_HOST").unwrap_or(store.host),
                port: lookup("REDIS_PORT")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(store.port),
                password: lookup("REDIS_PASSWORD").filter(|v| !v.is_empty()),
                database: lookup("REDIS_DATABASE")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(store.database),
                timeout: millis("REDIS_TIMEOUT_MS", store.timeout),
                connect_timeout: millis("REDIS_CONNECT_TIMEOUT_MS", store.connect_timeout),
                pool_enabled: flag("REDIS_POOL_ENABLED", store.pool_enabled),
                retry: RetryConfig {
                    enabled: flag("REDIS_RETRY_ENABLED", retry.enabled),
                    max_attempts: lookup("REDIS_RETRY_MAX_ATTEMPTS")
                        .and_then(|v| v.trim().parse().ok())
                        .unwrap_or(retry.max_attempts),
                    initial_backoff: millis("REDIS_RETRY_INITIAL_BACKOFF_MS", retry.initial_backoff),
                    max_backoff: millis("REDIS_RETRY_MAX_BACKOFF_MS", retry.max_backoff),
                    backoff_multiplier: lookup("REDIS_RETRY_BACKOFF_MULTIPLIER")
                        .and_then(|v| v.trim().parse().ok())
                        .unwrap_or(retry.backoff_multiplier),
                    retry_on_timeout: flag("REDIS_RETRY_ON_TIMEOUT", retry.retry_on_timeout),
                },
            },
            server_port: lookup("SERVER_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.server_port),
            health_check_interval: parse("HEALTH_CHECK_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.health_check_interval),
            backend: lookup("STORE_BACKEND")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.backend),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            server_port: 3000,
            health_check_interval: Duration::from_secs(30),
            backend: Backend::Redis,
        }
    }
}
