//! Value Serialization
//!
//! Converts typed values to the text stored under a key.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};

/// Encodes and decodes stored values.
pub trait ValueSerializer: Send + Sync + 'static {
    fn serialize<V: Serialize + ?Sized>(&self, value: &V) -> Result<String>;

    fn deserialize<V: DeserializeOwned>(&self, raw: &str) -> Result<V>;
}

/// Stores values as JSON text.
///
/// Integers encode as plain digits, so counters written with `set` can be
/// incremented afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl ValueSerializer for JsonSerializer {
    fn serialize<V: Serialize + ?Sized>(&self, value: &V) -> Result<String> {
        serde_json::to_string(value).map_err(|err| StoreError::Serialization {
            target_type: std::any::type_name::<V>(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }

    fn deserialize<V: DeserializeOwned>(&self, raw: &str) -> Result<V> {
        serde_json::from_str(raw).map_err(|err| StoreError::Serialization {
            target_type: std::any::type_name::<V>(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}
