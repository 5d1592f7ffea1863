//! Redis Transport
//!
//! Multiplexed tokio connection to a Redis server. Every command is bounded
//! by the configured command timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Cmd, ConnectionAddr, ConnectionInfo, FromRedisValue, RedisConnectionInfo};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{ConnectionFactory, Transport};
use crate::config::StoreConfig;
use crate::error::{FailureKind, Result, StoreError};
use crate::executor::Classify;
use crate::ops::{expire_millis, HashCommands, KeyTtl, ValueCommands};

// == Transport Error ==
/// Failures raised by the Redis transport.
#[derive(Error, Debug)]
pub enum RedisTransportError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("no reply within {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("connection is closed")]
    Closed,

    #[error("invalid expire time {0:?}")]
    InvalidExpireTime(Duration),
}

impl Classify for RedisTransportError {
    fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            RedisTransportError::Redis(err) => err.failure_kind(),
            RedisTransportError::TimedOut(_) => Some(FailureKind::Timeout),
            RedisTransportError::Closed => Some(FailureKind::Connection),
            RedisTransportError::InvalidExpireTime(_) => Some(FailureKind::Operation),
        }
    }
}

// == Connection Factory ==
/// Opens multiplexed connections to the configured server.
pub struct RedisConnectionFactory {
    client: Client,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl RedisConnectionFactory {
    /// Builds the client from `config`. No connection is opened yet.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                db: config.database,
                password: config.password.clone(),
                ..Default::default()
            },
        };
        let client = Client::open(info).map_err(|err| StoreError::Connection {
            message: format!(
                "Invalid Redis address {}:{}",
                config.host, config.port
            ),
            source: Some(Box::new(err)),
        })?;

        Ok(Self {
            client,
            connect_timeout: config.connect_timeout,
            command_timeout: config.timeout,
        })
    }
}

#[async_trait]
impl ConnectionFactory for RedisConnectionFactory {
    type Connection = RedisTransport;

    async fn connect(&self) -> std::result::Result<RedisTransport, RedisTransportError> {
        let pending = self.client.get_multiplexed_async_connection();
        let connection = tokio::time::timeout(self.connect_timeout, pending)
            .await
            .map_err(|_| RedisTransportError::TimedOut(self.connect_timeout))??;

        debug!("Opened multiplexed Redis connection");
        Ok(RedisTransport {
            connection: RwLock::new(Some(connection)),
            open: AtomicBool::new(true),
            command_timeout: self.command_timeout,
        })
    }
}

// == Redis Transport ==
/// One multiplexed connection, shared by all concurrent callers.
pub struct RedisTransport {
    connection: RwLock<Option<MultiplexedConnection>>,
    open: AtomicBool,
    command_timeout: Duration,
}

impl RedisTransport {
    /// Runs `cmd` with the command timeout applied.
    ///
    /// A connection-class failure marks the transport closed so the
    /// manager replaces it on the next request.
    async fn query<T>(&self, cmd: &Cmd) -> std::result::Result<T, RedisTransportError>
    where
        T: FromRedisValue + Send,
    {
        let mut connection = self
            .connection
            .read()
            .await
            .clone()
            .ok_or(RedisTransportError::Closed)?;

        let result = match tokio::time::timeout(
            self.command_timeout,
            cmd.query_async::<_, T>(&mut connection),
        )
        .await
        {
            Ok(reply) => reply.map_err(RedisTransportError::from),
            Err(_) => Err(RedisTransportError::TimedOut(self.command_timeout)),
        };

        if let Err(err) = &result {
            if err.failure_kind() == Some(FailureKind::Connection) {
                warn!("Redis connection broken: {}", err);
                self.open.store(false, Ordering::SeqCst);
            }
        }
        result
    }
}

fn ttl_millis(ttl: Duration) -> std::result::Result<u64, RedisTransportError> {
    expire_millis(ttl).ok_or(RedisTransportError::InvalidExpireTime(ttl))
}

fn set_command(
    key: &str,
    value: String,
    ttl: Option<Duration>,
) -> std::result::Result<Cmd, RedisTransportError> {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    if let Some(ttl) = ttl {
        cmd.arg("PX").arg(ttl_millis(ttl)?);
    }
    Ok(cmd)
}

fn pexpire_command(key: &str, ttl: Duration) -> std::result::Result<Cmd, RedisTransportError> {
    let mut cmd = redis::cmd("PEXPIRE");
    cmd.arg(key).arg(ttl_millis(ttl)?);
    Ok(cmd)
}

#[async_trait]
impl Transport for RedisTransport {
    type Error = RedisTransportError;

    async fn ping(&self) -> std::result::Result<String, RedisTransportError> {
        self.query(&redis::cmd("PING")).await
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> std::result::Result<(), RedisTransportError> {
        self.open.store(false, Ordering::SeqCst);
        // The socket closes once the last clone of the handle is dropped.
        drop(self.connection.write().await.take());
        Ok(())
    }
}

#[async_trait]
impl ValueCommands for RedisTransport {
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, RedisTransportError> {
        self.query(redis::cmd("GET").arg(key)).await
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> std::result::Result<(), RedisTransportError> {
        self.query(&set_command(key, value, ttl)?).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> std::result::Result<bool, RedisTransportError> {
        let mut cmd = set_command(key, value, ttl)?;
        cmd.arg("NX");
        let reply: Option<String> = self.query(&cmd).await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> std::result::Result<bool, RedisTransportError> {
        let removed: i64 = self.query(redis::cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> std::result::Result<bool, RedisTransportError> {
        let count: i64 = self.query(redis::cmd("EXISTS").arg(key)).await?;
        Ok(count > 0)
    }

    async fn increment_by(
        &self,
        key: &str,
        delta: i64,
    ) -> std::result::Result<i64, RedisTransportError> {
        self.query(redis::cmd("INCRBY").arg(key).arg(delta)).await
    }

    async fn expire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> std::result::Result<bool, RedisTransportError> {
        let applied: i64 = self.query(&pexpire_command(key, ttl)?).await?;
        Ok(applied == 1)
    }

    async fn ttl(&self, key: &str) -> std::result::Result<KeyTtl, RedisTransportError> {
        let millis: i64 = self.query(redis::cmd("PTTL").arg(key)).await?;
        Ok(KeyTtl::from_pttl(millis))
    }

    async fn persist(&self, key: &str) -> std::result::Result<bool, RedisTransportError> {
        let removed: i64 = self.query(redis::cmd("PERSIST").arg(key)).await?;
        Ok(removed == 1)
    }

    async fn delete_many(&self, keys: &[String]) -> std::result::Result<u64, RedisTransportError> {
        self.query(redis::cmd("DEL").arg(keys)).await
    }

    async fn keys(&self, pattern: &str) -> std::result::Result<Vec<String>, RedisTransportError> {
        self.query(redis::cmd("KEYS").arg(pattern)).await
    }
}

#[async_trait]
impl HashCommands for RedisTransport {
    async fn hset(
        &self,
        key: &str,
        field: &str,
        value: String,
    ) -> std::result::Result<(), RedisTransportError> {
        let _: i64 = self
            .query(redis::cmd("HSET").arg(key).arg(field).arg(value))
            .await?;
        Ok(())
    }

    async fn hset_all(
        &self,
        key: &str,
        entries: Vec<(String, String)>,
    ) -> std::result::Result<(), RedisTransportError> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in &entries {
            cmd.arg(field).arg(value);
        }
        let _: i64 = self.query(&cmd).await?;
        Ok(())
    }

    async fn hset_if_absent(
        &self,
        key: &str,
        field: &str,
        value: String,
    ) -> std::result::Result<bool, RedisTransportError> {
        self.query(redis::cmd("HSETNX").arg(key).arg(field).arg(value))
            .await
    }

    async fn hget(
        &self,
        key: &str,
        field: &str,
    ) -> std::result::Result<Option<String>, RedisTransportError> {
        self.query(redis::cmd("HGET").arg(key).arg(field)).await
    }

    async fn hmget(
        &self,
        key: &str,
        fields: &[String],
    ) -> std::result::Result<Vec<Option<String>>, RedisTransportError> {
        self.query(redis::cmd("HMGET").arg(key).arg(fields)).await
    }

    async fn hgetall(
        &self,
        key: &str,
    ) -> std::result::Result<HashMap<String, String>, RedisTransportError> {
        self.query(redis::cmd("HGETALL").arg(key)).await
    }

    async fn hexists(&self, key: &str, field: &str) -> std::result::Result<bool, RedisTransportError> {
        self.query(redis::cmd("HEXISTS").arg(key).arg(field)).await
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> std::result::Result<u64, RedisTransportError> {
        self.query(redis::cmd("HDEL").arg(key).arg(fields)).await
    }

    async fn hlen(&self, key: &str) -> std::result::Result<u64, RedisTransportError> {
        self.query(redis::cmd("HLEN").arg(key)).await
    }

    async fn hincr_by(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> std::result::Result<i64, RedisTransportError> {
        self.query(redis::cmd("HINCRBY").arg(key).arg(field).arg(delta))
            .await
    }

    async fn hincr_by_float(
        &self,
        key: &str,
        field: &str,
        delta: f64,
    ) -> std::result::Result<f64, RedisTransportError> {
        self.query(redis::cmd("HINCRBYFLOAT").arg(key).arg(field).arg(delta))
            .await
    }
}
