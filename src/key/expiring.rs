//! Expiring Key Module
//!
//! Defines the key value object that carries an optional time-to-live to
//! write commands.

use std::fmt;
use std::time::Duration;

use crate::error::{Result, StoreError};

// == Time Unit ==
/// Unit used when building or reading a key's TTL as a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Converts `amount` of this unit to whole milliseconds.
    ///
    /// Sub-millisecond units truncate toward zero; coarse units saturate.
    pub fn to_millis(self, amount: u64) -> u64 {
        match self {
            TimeUnit::Nanoseconds => amount / 1_000_000,
            TimeUnit::Microseconds => amount / 1_000,
            TimeUnit::Milliseconds => amount,
            TimeUnit::Seconds => amount.saturating_mul(1_000),
            TimeUnit::Minutes => amount.saturating_mul(60_000),
            TimeUnit::Hours => amount.saturating_mul(3_600_000),
            TimeUnit::Days => amount.saturating_mul(86_400_000),
        }
    }

    /// Expresses `duration` in this unit, truncating any remainder.
    pub fn convert(self, duration: Duration) -> u64 {
        let clamp = |value: u128| u64::try_from(value).unwrap_or(u64::MAX);
        match self {
            TimeUnit::Nanoseconds => clamp(duration.as_nanos()),
            TimeUnit::Microseconds => clamp(duration.as_micros()),
            TimeUnit::Milliseconds => clamp(duration.as_millis()),
            TimeUnit::Seconds => duration.as_secs(),
            TimeUnit::Minutes => duration.as_secs() / 60,
            TimeUnit::Hours => duration.as_secs() / 3_600,
            TimeUnit::Days => duration.as_secs() / 86_400,
        }
    }
}

// == Key With Expiration ==
/// Immutable key with an optional time-to-live.
///
/// Equality is structural: the same key with a different (or absent) TTL is
/// a different value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyWithExpiration {
    key: String,
    ttl: Option<Duration>,
}

impl KeyWithExpiration {
    // == Constructors ==
    /// Creates a key without expiration.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        Self::build(key.into(), None)
    }

    /// Creates a key with an optional TTL; `None` means no expiration.
    pub fn with_ttl(key: impl Into<String>, ttl: Option<Duration>) -> Result<Self> {
        Self::build(key.into(), ttl)
    }

    /// Creates a key from a signed duration, rejecting negative values.
    pub fn with_signed_ttl(key: impl Into<String>, ttl: chrono::Duration) -> Result<Self> {
        let ttl = ttl
            .to_std()
            .map_err(|_| StoreError::InvalidArgument("TTL must not be negative".to_string()))?;
        Self::build(key.into(), Some(ttl))
    }

    /// Creates a key whose TTL is `amount` of `unit`, kept at millisecond precision.
    pub fn with_timeout(key: impl Into<String>, amount: i64, unit: TimeUnit) -> Result<Self> {
        let amount = u64::try_from(amount)
            .map_err(|_| StoreError::InvalidArgument("timeout must not be negative".to_string()))?;
        let millis = unit.to_millis(amount);
        Self::build(key.into(), Some(Duration::from_millis(millis)))
    }

    pub fn with_seconds(key: impl Into<String>, seconds: u64) -> Result<Self> {
        Self::with_ttl(key, Some(Duration::from_secs(seconds)))
    }

    pub fn with_minutes(key: impl Into<String>, minutes: u64) -> Result<Self> {
        Self::with_ttl(key, Some(Duration::from_secs(minutes.saturating_mul(60))))
    }

    pub fn with_hours(key: impl Into<String>, hours: u64) -> Result<Self> {
        Self::with_ttl(key, Some(Duration::from_secs(hours.saturating_mul(3_600))))
    }

    pub fn with_days(key: impl Into<String>, days: u64) -> Result<Self> {
        Self::with_ttl(key, Some(Duration::from_secs(days.saturating_mul(86_400))))
    }

    fn build(key: String, ttl: Option<Duration>) -> Result<Self> {
        if key.is_empty() {
            return Err(StoreError::InvalidArgument(
                "key must not be empty".to_string(),
            ));
        }
        Ok(Self { key, ttl })
    }

    // == Accessors ==
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Returns true when a TTL is attached.
    pub fn has_expiration(&self) -> bool {
        self.ttl.is_some()
    }

    /// Returns the TTL expressed in `unit`.
    ///
    /// Fails with `IllegalState` when the key has no expiration.
    pub fn timeout(&self, unit: TimeUnit) -> Result<u64> {
        match self.ttl {
            Some(ttl) => Ok(unit.convert(ttl)),
            None => Err(StoreError::IllegalState(
                "key has no expiration".to_string(),
            )),
        }
    }
}

impl fmt::Display for KeyWithExpiration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ttl {
            Some(ttl) => write!(f, "RedisKey{{key='{}', ttl={:?}}}", self.key, ttl),
            None => write!(f, "RedisKey{{key='{}'}}", self.key),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_key_without_expiration() {
        let key = KeyWithExpiration::new("user:1").unwrap();

        assert_eq!(key.key(), "user:1");
        assert!(key.ttl().is_none());
        assert!(!key.has_expiration());
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = KeyWithExpiration::new("");
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));

        let result = KeyWithExpiration::with_seconds("", 10);
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_with_ttl_absent_means_no_expiration() {
        let key = KeyWithExpiration::with_ttl("session", None).unwrap();
        assert!(!key.has_expiration());
    }

    #[test]
    fn test_zero_ttl_is_allowed() {
        let key = KeyWithExpiration::with_ttl("session", Some(Duration::ZERO)).unwrap();
        assert!(key.has_expiration());
        assert_eq!(key.timeout(TimeUnit::Milliseconds).unwrap(), 0);
    }

    #[test]
    fn test_negative_signed_ttl_rejected() {
        let result = KeyWithExpiration::with_signed_ttl("k", chrono::Duration::seconds(-1));
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));

        let key = assert_ok!(KeyWithExpiration::with_signed_ttl(
            "k",
            chrono::Duration::milliseconds(1500)
        ));
        assert_eq!(key.ttl(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_with_timeout_units() {
        let key = KeyWithExpiration::with_timeout("k", 2, TimeUnit::Minutes).unwrap();
        assert_eq!(key.ttl(), Some(Duration::from_secs(120)));

        let key = KeyWithExpiration::with_timeout("k", 1_500, TimeUnit::Microseconds).unwrap();
        assert_eq!(key.ttl(), Some(Duration::from_millis(1)));

        let key = KeyWithExpiration::with_timeout("k", 999_999, TimeUnit::Nanoseconds).unwrap();
        assert_eq!(key.ttl(), Some(Duration::ZERO));
    }

    #[test]
    fn test_with_timeout_negative_rejected() {
        let result = KeyWithExpiration::with_timeout("k", -5, TimeUnit::Seconds);
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_named_helpers() {
        assert_eq!(
            KeyWithExpiration::with_seconds("k", 30).unwrap().ttl(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            KeyWithExpiration::with_minutes("k", 5).unwrap().ttl(),
            Some(Duration::from_secs(300))
        );
        assert_eq!(
            KeyWithExpiration::with_hours("k", 2).unwrap().ttl(),
            Some(Duration::from_secs(7_200))
        );
        assert_eq!(
            KeyWithExpiration::with_days("k", 1).unwrap().ttl(),
            Some(Duration::from_secs(86_400))
        );
    }

    #[test]
    fn test_timeout_conversion_truncates() {
        let key = KeyWithExpiration::with_ttl("k", Some(Duration::from_millis(90_500))).unwrap();

        assert_eq!(key.timeout(TimeUnit::Seconds).unwrap(), 90);
        assert_eq!(key.timeout(TimeUnit::Minutes).unwrap(), 1);
        assert_eq!(key.timeout(TimeUnit::Hours).unwrap(), 0);
        assert_eq!(key.timeout(TimeUnit::Milliseconds).unwrap(), 90_500);
        assert_eq!(key.timeout(TimeUnit::Microseconds).unwrap(), 90_500_000);
    }

    #[test]
    fn test_timeout_without_ttl_is_illegal_state() {
        let key = KeyWithExpiration::new("k").unwrap();
        let err = assert_err!(key.timeout(TimeUnit::Seconds));
        assert!(matches!(err, StoreError::IllegalState(_)));
    }

    #[test]
    fn test_structural_equality() {
        let a = KeyWithExpiration::with_seconds("k", 10).unwrap();
        let b = KeyWithExpiration::with_timeout("k", 10_000, TimeUnit::Milliseconds).unwrap();
        let c = KeyWithExpiration::new("k").unwrap();
        let d = KeyWithExpiration::with_seconds("k", 11).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_display() {
        let plain = KeyWithExpiration::new("k").unwrap();
        assert_eq!(plain.to_string(), "RedisKey{key='k'}");

        let expiring = KeyWithExpiration::with_seconds("k", 5).unwrap();
        assert_eq!(expiring.to_string(), "RedisKey{key='k', ttl=5s}");
    }

    #[test]
    fn test_large_units_saturate() {
        let key = KeyWithExpiration::with_timeout("k", i64::MAX, TimeUnit::Days).unwrap();
        assert_eq!(key.ttl(), Some(Duration::from_millis(u64::MAX)));
    }
}
