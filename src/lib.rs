//! Redis Utils - resilient Redis client core
//!
//! Provides expiring keys, failure classification, a retrying command
//! executor and a lazily connecting, thread-safe connection manager, plus
//! typed value and hash operations and a small HTTP gateway built on them.

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod key;
pub mod models;
pub mod ops;
pub mod tasks;

pub use api::AppState;
pub use config::{Backend, Config, RetryConfig, StoreConfig};
pub use connection::{ConnectionFactory, ConnectionManager, Transport};
pub use error::{FailureKind, Result, StoreError};
pub use executor::{CommandExecutor, FailureClassifier};
pub use key::{KeyWithExpiration, TimeUnit};
pub use ops::{HashOperations, KeyTtl, ValueOperations};
pub use tasks::spawn_health_monitor;
