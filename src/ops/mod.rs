//! Operations Module
//!
//! Key/value commands on top of the connection manager and executor.
//!
//! # Components
//! - `ValueCommands`: raw string commands a transport must support
//! - `ValueSerializer`: converts typed values to and from stored text
//! - `ValueOperations`: retried, typed operations keyed by `KeyWithExpiration`
//! - `HashCommands` / `HashOperations`: the same for hash fields

mod hashes;
mod serializer;
mod values;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::connection::{ConnectionFactory, ConnectionManager, Transport};
use crate::error::Result as StoreResult;
use crate::executor::CommandExecutor;

// Re-export public types
pub use hashes::HashOperations;
pub use serializer::{JsonSerializer, ValueSerializer};
pub use values::ValueOperations;

type ConnError<F> = <<F as ConnectionFactory>::Connection as Transport>::Error;

/// Whole milliseconds sent as a `PX` / `PEXPIRE` argument.
///
/// `None` when the duration exceeds the server's signed 64-bit range.
/// Sub-millisecond durations truncate to zero.
pub fn expire_millis(ttl: Duration) -> Option<u64> {
    u64::try_from(ttl.as_millis())
        .ok()
        .filter(|millis| i64::try_from(*millis).is_ok())
}

/// Runs `command` on the manager's current connection under the executor's
/// retry policy, classifying transport errors for `operation`.
async fn run_command<F, R, C, Fut>(
    manager: &ConnectionManager<F>,
    executor: &CommandExecutor,
    operation: &str,
    command: C,
) -> StoreResult<R>
where
    F: ConnectionFactory,
    C: Fn(Arc<F::Connection>) -> Fut,
    Fut: Future<Output = Result<R, ConnError<F>>>,
{
    let classifier = executor.classifier();
    let command = &command;

    executor
        .execute(operation, move || async move {
            let connection = manager.get_connection().await?;
            command(connection)
                .await
                .map_err(|err| classifier.classify::<R, _>(operation, err))
        })
        .await
}

// == Key TTL ==
/// Remaining lifetime of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist
    Missing,
    /// The key exists and never expires
    NoExpiry,
    /// The key expires after the given duration
    ExpiresIn(Duration),
}

impl KeyTtl {
    /// Decodes a `PTTL` reply: `-2` missing, `-1` persistent, otherwise millis.
    pub fn from_pttl(millis: i64) -> Self {
        match millis {
            -2 => KeyTtl::Missing,
            m if m < 0 => KeyTtl::NoExpiry,
            m => KeyTtl::ExpiresIn(Duration::from_millis(m as u64)),
        }
    }
}

// == Value Commands ==
/// String-valued commands issued over a live connection.
#[async_trait]
pub trait ValueCommands: Transport {
    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Stores `value`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>)
        -> Result<(), Self::Error>;

    /// Stores `value` only when `key` is absent; returns true if stored.
    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<bool, Self::Error>;

    /// Returns true if a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, Self::Error>;

    async fn exists(&self, key: &str) -> Result<bool, Self::Error>;

    /// Adds `delta` to the integer stored at `key`, starting from zero.
    async fn increment_by(&self, key: &str, delta: i64) -> Result<i64, Self::Error>;

    /// Sets a TTL on an existing key; returns false if the key is missing.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, Self::Error>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl, Self::Error>;

    /// Removes the TTL; returns true if one was removed.
    async fn persist(&self, key: &str) -> Result<bool, Self::Error>;

    /// Removes every listed key; returns how many existed.
    async fn delete_many(&self, keys: &[String]) -> Result<u64, Self::Error>;

    /// Lists the keys matching a glob-style `pattern` (`*`, `?`, `[a-z]`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Self::Error>;
}

// == Hash Commands ==
/// Hash-field commands issued over a live connection.
///
/// A hash whose last field is deleted stops existing.
#[async_trait]
pub trait HashCommands: Transport {
    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), Self::Error>;

    /// Stores several fields at once. `entries` must not be empty.
    async fn hset_all(&self, key: &str, entries: Vec<(String, String)>)
        -> Result<(), Self::Error>;

    /// Stores the field only when absent; returns true if stored.
    async fn hset_if_absent(&self, key: &str, field: &str, value: String)
        -> Result<bool, Self::Error>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, Self::Error>;

    /// One slot per requested field, in request order. `fields` must not be empty.
    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>, Self::Error>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, Self::Error>;

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, Self::Error>;

    /// Returns how many of `fields` were removed. `fields` must not be empty.
    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, Self::Error>;

    async fn hlen(&self, key: &str) -> Result<u64, Self::Error>;

    /// Adds `delta` to an integer field, starting from zero.
    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64, Self::Error>;

    /// Adds `delta` to a float field, starting from zero.
    async fn hincr_by_float(&self, key: &str, field: &str, delta: f64)
        -> Result<f64, Self::Error>;
}
