//! Hash Operations
//!
//! Typed access to the fields of a hash stored under one key. Runs through
//! the command executor exactly like the value operations.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{run_command, ConnError, HashCommands, JsonSerializer, ValueSerializer};
use crate::connection::{ConnectionFactory, ConnectionManager};
use crate::error::Result;
use crate::executor::CommandExecutor;

// == Hash Operations ==
/// Typed hash-field access over a managed connection.
pub struct HashOperations<F, S = JsonSerializer>
where
    F: ConnectionFactory,
    F::Connection: HashCommands,
    S: ValueSerializer,
{
    manager: Arc<ConnectionManager<F>>,
    executor: CommandExecutor,
    serializer: S,
}

impl<F> HashOperations<F, JsonSerializer>
where
    F: ConnectionFactory,
    F::Connection: HashCommands,
{
    /// Creates operations storing field values as JSON.
    pub fn new(manager: Arc<ConnectionManager<F>>, executor: CommandExecutor) -> Self {
        Self::with_serializer(manager, executor, JsonSerializer)
    }
}

impl<F, S> HashOperations<F, S>
where
    F: ConnectionFactory,
    F::Connection: HashCommands,
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

    async fn run<R, C, Fut>(&self, operation: &str, command: C) -> Result<R>
    where
        C: Fn(Arc<F::Connection>) -> Fut,
        Fut: Future<Output = std::result::Result<R, ConnError<F>>>,
    {
        run_command(&self.manager, &self.executor, operation, command).await
    }

    // == Writes ==
    pub async fn put<V>(&self, key: &str, field: &str, value: &V) -> Result<()>
    where
        V: Serialize + ?Sized,
    {
        let raw = self.serializer.serialize(value)?;
        self.run("hashPut", |conn| {
            let raw = raw.clone();
            async move { conn.hset(key, field, raw).await }
        })
        .await?;
        debug!("Stored field {} of hash {}", field, key);
        Ok(())
    }

    /// Stores every entry in one command. An empty map issues no command.
    pub async fn put_all<V: Serialize>(&self, key: &str, values: &HashMap<String, V>) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let entries = values
            .iter()
            .map(|(field, value)| -> Result<(String, String)> {
                Ok((field.clone(), self.serializer.serialize(value)?))
            })
            .collect::<Result<Vec<_>>>()?;

        self.run("hashPutAll", |conn| {
            let entries = entries.clone();
            async move { conn.hset_all(key, entries).await }
        })
        .await
    }

    /// Stores the field only when absent. Returns true if stored.
    pub async fn put_if_absent<V>(&self, key: &str, field: &str, value: &V) -> Result<bool>
    where
        V: Serialize + ?Sized,
    {
        let raw = self.serializer.serialize(value)?;
        self.run("hashPutIfAbsent", |conn| {
            let raw = raw.clone();
            async move { conn.hset_if_absent(key, field, raw).await }
        })
        .await
    }

    /// Removes the listed fields. Returns how many existed.
    pub async fn delete<K: AsRef<str>>(&self, key: &str, fields: &[K]) -> Result<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let fields = owned(fields);
        let fields = &fields;
        self.run("hashDelete", |conn| async move { conn.hdel(key, fields).await })
            .await
    }

    // == Reads ==
    pub async fn get<V: DeserializeOwned>(&self, key: &str, field: &str) -> Result<Option<V>> {
        let raw = self
            .run("hashGet", |conn| async move { conn.hget(key, field).await })
            .await?;
        raw.map(|raw| self.serializer.deserialize(&raw)).transpose()
    }

    /// Loads the requested fields. Missing fields map to `None`.
    pub async fn multi_get<V, K>(&self, key: &str, fields: &[K]) -> Result<HashMap<String, Option<V>>>
    where
        V: DeserializeOwned,
        K: AsRef<str>,
    {
        if fields.is_empty() {
            return Ok(HashMap::new());
        }
        let fields = owned(fields);
        let requested = &fields;
        let values = self
            .run("hashMultiGet", |conn| async move { conn.hmget(key, requested).await })
            .await?;

        fields
            .into_iter()
            .zip(values)
            .map(|(field, raw)| -> Result<(String, Option<V>)> {
                let value = raw.map(|raw| self.serializer.deserialize(&raw)).transpose()?;
                Ok((field, value))
            })
            .collect()
    }

    /// Loads every field. A missing hash yields an empty map.
    pub async fn entries<V: DeserializeOwned>(&self, key: &str) -> Result<HashMap<String, V>> {
        let raw = self
            .run("hashEntries", |conn| async move { conn.hgetall(key).await })
            .await?;
        raw.into_iter()
            .map(|(field, raw)| -> Result<(String, V)> {
                Ok((field, self.serializer.deserialize(&raw)?))
            })
            .collect()
    }

    /// Names of the fields in the hash.
    pub async fn fields(&self, key: &str) -> Result<BTreeSet<String>> {
        let raw = self
            .run("hashKeys", |conn| async move { conn.hgetall(key).await })
            .await?;
        Ok(raw.into_keys().collect())
    }

    pub async fn values<V: DeserializeOwned>(&self, key: &str) -> Result<Vec<V>> {
        Ok(self.entries(key).await?.into_values().collect())
    }

    pub async fn has_key(&self, key: &str, field: &str) -> Result<bool> {
        self.run("hashHasKey", |conn| async move { conn.hexists(key, field).await })
            .await
    }

    /// Number of fields; zero for a missing hash.
    pub async fn size(&self, key: &str) -> Result<u64> {
        self.run("hashSize", |conn| async move { conn.hlen(key).await })
            .await
    }

    // == Counters ==
    /// Adds `delta` to an integer field; a missing field starts at zero.
    pub async fn increment(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.run("hashIncrement", |conn| async move {
            conn.hincr_by(key, field, delta).await
        })
        .await
    }

    pub async fn increment_float(&self, key: &str, field: &str, delta: f64) -> Result<f64> {
        self.run("hashIncrementFloat", |conn| async move {
            conn.hincr_by_float(key, field, delta).await
        })
        .await
    }
}

fn owned<K: AsRef<str>>(fields: &[K]) -> Vec<String> {
    fields.iter().map(|field| field.as_ref().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::connection::{MemoryConnectionFactory, MemoryError};
    use crate::error::{FailureKind, StoreError};
    use crate::key::KeyWithExpiration;
    use crate::ops::ValueOperations;
    use serde::Deserialize;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Address {
        city: String,
        zip: u32,
    }

    fn operations(max_attempts: u32) -> (MemoryConnectionFactory, HashOperations<MemoryConnectionFactory>) {
        let factory = MemoryConnectionFactory::new();
        let manager = Arc::new(ConnectionManager::new(factory.clone()));
        let retry = RetryConfig {
            max_attempts,
            ..RetryConfig::default()
        };
        let executor = CommandExecutor::with_policy(retry, Duration::from_secs(1)).unwrap();
        (factory, HashOperations::new(manager, executor))
    }

    #[tokio::test]
    async fn test_put_and_get_typed_field() {
        let (_, hashes) = operations(3);
        let home = Address {
            city: "Oslo".to_string(),
            zip: 150,
        };

        assert_ok!(hashes.put("user:1", "home", &home).await);
        assert_eq!(hashes.get::<Address>("user:1", "home").await.unwrap(), Some(home));
        assert_eq!(hashes.get::<Address>("user:1", "work").await.unwrap(), None);
        assert_eq!(hashes.get::<Address>("user:2", "home").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_all_entries_and_fields() {
        let (factory, hashes) = operations(3);
        let scores: HashMap<String, u32> =
            [("ada".to_string(), 3), ("bob".to_string(), 5)].into_iter().collect();

        hashes.put_all("scores", &scores).await.unwrap();

        assert_eq!(hashes.entries::<u32>("scores").await.unwrap(), scores);
        assert_eq!(
            hashes.fields("scores").await.unwrap().into_iter().collect::<Vec<_>>(),
            vec!["ada".to_string(), "bob".to_string()]
        );
        let mut values = hashes.values::<u32>("scores").await.unwrap();
        values.sort();
        assert_eq!(values, vec![3, 5]);
        assert_eq!(hashes.size("scores").await.unwrap(), 2);

        let before = factory.command_count();
        hashes.put_all::<u32>("scores", &HashMap::new()).await.unwrap();
        assert_eq!(factory.command_count(), before);
    }

    #[tokio::test]
    async fn test_multi_get_keeps_missing_fields() {
        let (_, hashes) = operations(3);
        hashes.put("h", "a", &1).await.unwrap();
        hashes.put("h", "b", &2).await.unwrap();

        let values = hashes.multi_get::<i64, _>("h", &["a", "missing", "b"]).await.unwrap();

        assert_eq!(values.len(), 3);
        assert_eq!(values["a"], Some(1));
        assert_eq!(values["missing"], None);
        assert_eq!(values["b"], Some(2));
        assert!(hashes.multi_get::<i64, &str>("h", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_if_absent_has_key_and_delete() {
        let (_, hashes) = operations(3);

        assert!(hashes.put_if_absent("h", "f", "first").await.unwrap());
        assert!(!hashes.put_if_absent("h", "f", "second").await.unwrap());
        assert_eq!(hashes.get::<String>("h", "f").await.unwrap().as_deref(), Some("first"));
        assert!(hashes.has_key("h", "f").await.unwrap());

        assert_eq!(hashes.delete("h", &["f", "nope"]).await.unwrap(), 1);
        assert!(!hashes.has_key("h", "f").await.unwrap());
        assert_eq!(hashes.size("h").await.unwrap(), 0);
        assert_eq!(hashes.delete::<&str>("h", &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_field_counters() {
        let (_, hashes) = operations(3);
        assert_eq!(hashes.increment("stats", "views", 2).await.unwrap(), 2);
        assert_eq!(hashes.increment("stats", "views", 3).await.unwrap(), 5);
        assert_eq!(hashes.get::<i64>("stats", "views").await.unwrap(), Some(5));
        assert_eq!(hashes.increment_float("stats", "ratio", 0.5).await.unwrap(), 0.5);
    }

    #[tokio::test]
    async fn test_wrong_type_is_not_retried() {
        let (factory, hashes) = operations(3);
        let executor =
            CommandExecutor::with_policy(RetryConfig::default(), Duration::from_secs(1)).unwrap();
        let values = ValueOperations::new(hashes.manager().clone(), executor);
        values.set(&KeyWithExpiration::new("plain").unwrap(), "text").await.unwrap();
        let before = factory.command_count();

        let err = assert_err!(hashes.put("plain", "f", &1).await);

        assert_eq!(err.kind(), Some(FailureKind::Operation));
        assert_eq!(factory.command_count() - before, 1);
    }

    #[tokio::test]
    async fn test_decode_mismatch_is_serialization() {
        let (_, hashes) = operations(3);
        hashes.put("h", "name", "ada").await.unwrap();

        let err = assert_err!(hashes.get::<u32>("h", "name").await);
        assert!(matches!(err, StoreError::Serialization { .. }));
        let err = assert_err!(hashes.entries::<u32>("h").await);
        assert_eq!(err.kind(), Some(FailureKind::Serialization));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_between_attempts() {
        let (factory, hashes) = operations(3);
        hashes.put("h", "f", &7).await.unwrap();
        factory.fail_next(MemoryError::ConnectionLost, 1).await;

        assert_eq!(hashes.get::<i64>("h", "f").await.unwrap(), Some(7));
        assert_eq!(factory.connect_count(), 2);
    }
}
