//! In-Memory Transport
//!
//! A process-local store speaking the same commands as the Redis
//! transport. Faults can be scheduled to exercise retry and reconnect
//! paths without a server.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use glob_match::glob_match;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{ConnectionFactory, Transport};
use crate::error::FailureKind;
use crate::executor::Classify;
use crate::ops::{expire_millis, HashCommands, KeyTtl, ValueCommands};

// == Memory Error ==
/// Failures raised by the in-memory transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("connection refused")]
    Refused,

    #[error("connection lost")]
    ConnectionLost,

    #[error("connection is closed")]
    Closed,

    #[error("command timed out")]
    TimedOut,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR value is not a valid float")]
    NotAFloat,

    #[error("ERR invalid expire time")]
    InvalidExpireTime,

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
}

impl Classify for MemoryError {
    fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            MemoryError::Refused | MemoryError::ConnectionLost | MemoryError::Closed => {
                Some(FailureKind::Connection)
            }
            MemoryError::TimedOut => Some(FailureKind::Timeout),
            MemoryError::NotAnInteger
            | MemoryError::NotAFloat
            | MemoryError::InvalidExpireTime
            | MemoryError::WrongType => Some(FailureKind::Operation),
        }
    }
}

// == Shared State ==
#[derive(Debug)]
enum Stored {
    Text(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug)]
struct Entry {
    value: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn text(value: String, expires_at: Option<Instant>) -> Self {
        Self {
            value: Stored::Text(value),
            expires_at,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn as_text(&mut self) -> Result<&mut String, MemoryError> {
        match &mut self.value {
            Stored::Text(value) => Ok(value),
            Stored::Hash(_) => Err(MemoryError::WrongType),
        }
    }

    fn as_hash(&mut self) -> Result<&mut HashMap<String, String>, MemoryError> {
        match &mut self.value {
            Stored::Hash(fields) => Ok(fields),
            Stored::Text(_) => Err(MemoryError::WrongType),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    entries: Mutex<HashMap<String, Entry>>,
    faults: Mutex<VecDeque<MemoryError>>,
    refuse: AtomicBool,
    fail_close: AtomicBool,
    connect_delay: Option<Duration>,
    connects: AtomicU64,
    closes: AtomicU64,
    shutdowns: AtomicU64,
    commands: AtomicU64,
}

// == Memory Connection Factory ==
/// Creates connections to one shared in-memory keyspace.
///
/// Clones share the keyspace, scheduled faults and counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnectionFactory {
    shared: Arc<Shared>,
}

impl MemoryConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every connect by `delay`. Must be called before cloning.
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        let shared = Shared {
            connect_delay: Some(delay),
            ..Shared::default()
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Makes subsequent connects fail with [`MemoryError::Refused`].
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Makes subsequent closes report a failure (the transport still closes).
    pub fn fail_close(&self, fail: bool) {
        self.shared.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Fails the next `times` commands, including pings, with `error`.
    pub async fn fail_next(&self, error: MemoryError, times: usize) {
        let mut faults = self.shared.faults.lock().await;
        faults.extend(std::iter::repeat(error).take(times));
    }

    pub fn connect_count(&self) -> u64 {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u64 {
        self.shared.closes.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> u64 {
        self.shared.shutdowns.load(Ordering::SeqCst)
    }

    /// Commands attempted over any connection, failed ones included.
    pub fn command_count(&self) -> u64 {
        self.shared.commands.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    type Connection = MemoryTransport;

    async fn connect(&self) -> Result<MemoryTransport, MemoryError> {
        if let Some(delay) = self.shared.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(MemoryError::Refused);
        }
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        debug!("Opened in-memory connection");
        Ok(MemoryTransport {
            shared: Arc::clone(&self.shared),
            open: AtomicBool::new(true),
        })
    }

    async fn shutdown(&self) -> Result<(), MemoryError> {
        self.shared.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// == Memory Transport ==
/// One connection to the in-memory keyspace.
#[derive(Debug)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
    open: AtomicBool,
}

impl MemoryTransport {
    /// Simulates the server dropping this connection.
    pub fn sever(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Counts the command, then applies any scheduled fault.
    async fn begin(&self) -> Result<(), MemoryError> {
        self.shared.commands.fetch_add(1, Ordering::SeqCst);
        if !self.is_open() {
            return Err(MemoryError::Closed);
        }
        let fault = self.shared.faults.lock().await.pop_front();
        match fault {
            Some(MemoryError::ConnectionLost) => {
                self.sever();
                Err(MemoryError::ConnectionLost)
            }
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Drops `key` if its TTL has passed, then returns the live entry.
fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

/// Returns the live hash at `key`, creating an empty one if absent.
fn hash_entry<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> Result<&'a mut HashMap<String, String>, MemoryError> {
    if live(entries, key).is_none() {
        entries.insert(
            key.to_string(),
            Entry {
                value: Stored::Hash(HashMap::new()),
                expires_at: None,
            },
        );
    }
    match entries.get_mut(key) {
        Some(entry) => entry.as_hash(),
        None => Err(MemoryError::WrongType),
    }
}

/// Removes `key` when its hash has no fields left.
fn drop_if_empty(entries: &mut HashMap<String, Entry>, key: &str) {
    let empty = matches!(
        entries.get(key),
        Some(Entry { value: Stored::Hash(fields), .. }) if fields.is_empty()
    );
    if empty {
        entries.remove(key);
    }
}

/// Expiry for `SET ... PX`, truncated to whole milliseconds.
///
/// Zero, sub-millisecond and out-of-range durations are rejected.
fn deadline(ttl: Option<Duration>) -> Result<Option<Instant>, MemoryError> {
    let ttl = match ttl {
        Some(ttl) => ttl,
        None => return Ok(None),
    };
    match expire_millis(ttl) {
        Some(millis) if millis > 0 => after_millis(millis).map(Some),
        _ => Err(MemoryError::InvalidExpireTime),
    }
}

fn after_millis(millis: u64) -> Result<Instant, MemoryError> {
    Instant::now()
        .checked_add(Duration::from_millis(millis))
        .ok_or(MemoryError::InvalidExpireTime)
}

fn increment(current: Option<&str>, delta: i64) -> Result<i64, MemoryError> {
    let current: i64 = match current {
        Some(raw) => raw.parse().map_err(|_| MemoryError::NotAnInteger)?,
        None => 0,
    };
    current.checked_add(delta).ok_or(MemoryError::NotAnInteger)
}

#[async_trait]
impl Transport for MemoryTransport {
    type Error = MemoryError;

    async fn ping(&self) -> Result<String, MemoryError> {
        self.begin().await?;
        Ok("PONG".to_string())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), MemoryError> {
        self.open.store(false, Ordering::SeqCst);
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_close.load(Ordering::SeqCst) {
            return Err(MemoryError::ConnectionLost);
        }
        Ok(())
    }
}

#[async_trait]
impl ValueCommands for MemoryTransport {
    async fn get(&self, key: &str) -> Result<Option<String>, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        match live(&mut entries, key) {
            Some(entry) => Ok(Some(entry.as_text()?.clone())),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), MemoryError> {
        self.begin().await?;
        let expires_at = deadline(ttl)?;
        let mut entries = self.shared.entries.lock().await;
        entries.insert(key.to_string(), Entry::text(value, expires_at));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<bool, MemoryError> {
        self.begin().await?;
        let expires_at = deadline(ttl)?;
        let mut entries = self.shared.entries.lock().await;
        if live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::text(value, expires_at));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        let present = live(&mut entries, key).is_some();
        entries.remove(key);
        Ok(present)
    }

    async fn exists(&self, key: &str) -> Result<bool, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        Ok(live(&mut entries, key).is_some())
    }

    async fn increment_by(&self, key: &str, delta: i64) -> Result<i64, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        match live(&mut entries, key) {
            Some(entry) => {
                let value = entry.as_text()?;
                let next = increment(Some(value.as_str()), delta)?;
                *value = next.to_string();
                Ok(next)
            }
            None => {
                entries.insert(key.to_string(), Entry::text(delta.to_string(), None));
                Ok(delta)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, MemoryError> {
        self.begin().await?;
        let millis = expire_millis(ttl).ok_or(MemoryError::InvalidExpireTime)?;
        let mut entries = self.shared.entries.lock().await;
        if live(&mut entries, key).is_none() {
            return Ok(false);
        }
        if millis == 0 {
            entries.remove(key);
        } else if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(after_millis(millis)?);
        }
        Ok(true)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        let ttl = match live(&mut entries, key) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::NoExpiry,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => KeyTtl::ExpiresIn(at.saturating_duration_since(Instant::now())),
        };
        Ok(ttl)
    }

    async fn persist(&self, key: &str) -> Result<bool, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        Ok(live(&mut entries, key)
            .and_then(|entry| entry.expires_at.take())
            .is_some())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        let mut removed = 0;
        for key in keys {
            if live(&mut entries, key).is_some() {
                entries.remove(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HashCommands for MemoryTransport {
    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), MemoryError> {
        self.hset_all(key, vec![(field.to_string(), value)]).await
    }

    async fn hset_all(
        &self,
        key: &str,
        entries: Vec<(String, String)>,
    ) -> Result<(), MemoryError> {
        self.begin().await?;
        let mut store = self.shared.entries.lock().await;
        hash_entry(&mut store, key)?.extend(entries);
        drop_if_empty(&mut store, key);
        Ok(())
    }

    async fn hset_if_absent(
        &self,
        key: &str,
        field: &str,
        value: String,
    ) -> Result<bool, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        let fields = hash_entry(&mut entries, key)?;
        if fields.contains_key(field) {
            return Ok(false);
        }
        fields.insert(field.to_string(), value);
        Ok(true)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        match live(&mut entries, key) {
            Some(entry) => Ok(entry.as_hash()?.get(field).cloned()),
            None => Ok(None),
        }
    }

    async fn hmget(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        match live(&mut entries, key) {
            Some(entry) => {
                let hash = entry.as_hash()?;
                Ok(fields.iter().map(|field| hash.get(field).cloned()).collect())
            }
            None => Ok(vec![None; fields.len()]),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        match live(&mut entries, key) {
            Some(entry) => Ok(entry.as_hash()?.clone()),
            None => Ok(HashMap::new()),
        }
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        match live(&mut entries, key) {
            Some(entry) => Ok(entry.as_hash()?.contains_key(field)),
            None => Ok(false),
        }
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        let removed = match live(&mut entries, key) {
            Some(entry) => {
                let hash = entry.as_hash()?;
                fields
                    .iter()
                    .filter(|field| hash.remove(field.as_str()).is_some())
                    .count() as u64
            }
            None => 0,
        };
        drop_if_empty(&mut entries, key);
        Ok(removed)
    }

    async fn hlen(&self, key: &str) -> Result<u64, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        match live(&mut entries, key) {
            Some(entry) => Ok(entry.as_hash()?.len() as u64),
            None => Ok(0),
        }
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64, MemoryError> {
        self.begin().await?;
        let mut entries = self.shared.entries.lock().await;
        let fields = hash_entry(&mut entries, key)?;
        let next = increment(fields.get(field).map(String::as_str), delta)?;
        fields.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn hincr_by_float(
        &self,
        key: &str,
        field: &str,
        delta: f64,
    ) -> Result<f64, MemoryError> {
        self.begin().await?;
        if !delta.is_finite() {
            return Err(MemoryError::NotAFloat);
        }
        let mut entries = self.shared.entries.lock().await;
        let fields = hash_entry(&mut entries, key)?;
        let current: f64 = match fields.get(field) {
            Some(raw) => raw.parse().map_err(|_| MemoryError::NotAFloat)?,
            None => 0.0,
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err(MemoryError::NotAFloat);
        }
        fields.insert(field.to_string(), next.to_string());
        Ok(next)
    }
}
