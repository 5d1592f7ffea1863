//! Request DTOs for the gateway API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;
use serde_json::Value;

/// Longest key accepted by the gateway
pub const MAX_KEY_LEN: usize = 512;

/// Request body for PUT /set
///
/// # Fields
/// - `key`: The key to store the value under
/// - `value`: Any JSON value
/// - `ttl`: Optional TTL in seconds; omitted means the key never expires
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if let Some(error) = validate_key(&self.key) {
            return Some(error);
        }
        if self.ttl == Some(0) {
            return Some("TTL must be at least one second".to_string());
        }
        None
    }
}

/// Query string for POST /incr/:key
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncrementParams {
    /// Amount to add; defaults to 1
    #[serde(default)]
    pub by: Option<i64>,
}

/// Checks a key taken from a path or body.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LEN {
        return Some(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LEN
        ));
    }
    None
}
