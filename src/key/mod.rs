//! Key Module
//!
//! Provides the TTL-carrying key value object passed to write commands.

mod expiring;


// Re-export public types
pub use expiring::{KeyWithExpiration, TimeUnit};
