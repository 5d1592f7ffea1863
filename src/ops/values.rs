//! Value Operations
//!
//! Typed get/set/counter/expiry operations. Each one runs through the
//! command executor, so transient connection failures are retried and a
//! lost connection is re-established between attempts.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{run_command, ConnError, JsonSerializer, KeyTtl, ValueCommands, ValueSerializer};
use crate::connection::{ConnectionFactory, ConnectionManager};
use crate::error::{Result, StoreError};
use crate::executor::CommandExecutor;
use crate::key::KeyWithExpiration;

// == Value Operations ==
/// Typed key/value access over a managed connection.
pub struct ValueOperations<F, S = JsonSerializer>
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
    S: ValueSerializer,
{
    manager: Arc<ConnectionManager<F>>,
    executor: CommandExecutor,
    serializer: S,
}

impl<F> ValueOperations<F, JsonSerializer>
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
{
    /// Creates operations storing values as JSON.
    pub fn new(manager: Arc<ConnectionManager<F>>, executor: CommandExecutor) -> Self {
        Self::with_serializer(manager, executor, JsonSerializer)
    }
}

impl<F, S> ValueOperations<F, S>
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
    S: ValueSerializer,
{
    pub fn with_serializer(
        manager: Arc<ConnectionManager<F>>,
        executor: CommandExecutor,
        serializer: S,
    ) -> Self {
        Self {
            manager,
            executor,
            serializer,
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager<F>> {
        &self.manager
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Runs `command` on the current connection under the retry policy.
    async fn run<R, C, Fut>(&self, operation: &str, command: C) -> Result<R>
    where
        C: Fn(Arc<F::Connection>) -> Fut,
        Fut: Future<Output = std::result::Result<R, ConnError<F>>>,
    {
        run_command(&self.manager, &self.executor, operation, command).await
    }

    // == Writes ==
    /// Stores `value` under the key, applying the key's TTL if it has one.
    pub async fn set<V>(&self, key: &KeyWithExpiration, value: &V) -> Result<()>
    where
        V: Serialize + ?Sized,
    {
        let raw = self.serializer.serialize(value)?;
        let ttl = key.ttl();
        self.run("set", |conn| {
            let raw = raw.clone();
            async move { conn.set(key.key(), raw, ttl).await }
        })
        .await?;
        debug!("Stored {}", key);
        Ok(())
    }

    /// Stores `value` only when the key does not exist yet.
    ///
    /// Returns true if the value was stored.
    pub async fn set_if_absent<V>(&self, key: &KeyWithExpiration, value: &V) -> Result<bool>
    where
        V: Serialize + ?Sized,
    {
        let raw = self.serializer.serialize(value)?;
        let ttl = key.ttl();
        self.run("setIfAbsent", |conn| {
            let raw = raw.clone();
            async move { conn.set_if_absent(key.key(), raw, ttl).await }
        })
        .await
    }

    /// Removes the key. Returns true if it existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.run("delete", |conn| async move { conn.delete(key).await })
            .await
    }

    /// Removes every listed key. Returns how many existed.
    ///
    /// Duplicates count once; an empty list issues no command.
    pub async fn delete_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<u64> {
        let keys: Vec<String> = keys
            .iter()
            .map(|key| key.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }

        let keys = &keys;
        let removed = self
            .run("deleteMany", |conn| async move { conn.delete_many(keys).await })
            .await?;
        debug!("Deleted {} of {} keys", removed, keys.len());
        Ok(removed)
    }

    // == Reads ==
    /// Loads and decodes the value stored under `key`.
    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        let raw = self
            .run("get", |conn| async move { conn.get(key).await })
            .await?;
        raw.map(|raw| self.serializer.deserialize(&raw)).transpose()
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.run("exists", |conn| async move { conn.exists(key).await })
            .await
    }

    /// Returns the keys matching a glob-style `pattern`.
    ///
    /// Scans the whole keyspace on the server; keep it off hot paths.
    pub async fn keys(&self, pattern: &str) -> Result<BTreeSet<String>> {
        let keys = self
            .run("keys", |conn| async move { conn.keys(pattern).await })
            .await?;
        Ok(keys.into_iter().collect())
    }

    // == Counters ==
    pub async fn increment(&self, key: &str) -> Result<i64> {
        self.increment_by(key, 1).await
    }

    /// Adds `delta` to the counter at `key`; a missing key starts at zero.
    pub async fn increment_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.run("increment", |conn| async move {
            conn.increment_by(key, delta).await
        })
        .await
    }

    // == Expiry ==
    /// Applies the key's TTL to an existing entry.
    ///
    /// Returns false if the entry does not exist.
    ///
    /// # Errors
    /// `InvalidArgument` when the key carries no TTL.
    pub async fn expire(&self, key: &KeyWithExpiration) -> Result<bool> {
        let ttl = key.ttl().ok_or_else(|| {
            StoreError::InvalidArgument(format!("{} has no expiration to apply", key))
        })?;
        self.run("expire", |conn| async move {
            conn.expire(key.key(), ttl).await
        })
        .await
    }

    pub async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        self.run("ttl", |conn| async move { conn.ttl(key).await })
            .await
    }

    /// Removes the TTL from `key`. Returns true if one was removed.
    pub async fn persist(&self, key: &str) -> Result<bool> {
        self.run("persist", |conn| async move { conn.persist(key).await })
            .await
    }
}
