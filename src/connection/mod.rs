//! Connection Module
//!
//! Transport capabilities, the connection lifecycle manager and the
//! available transports.
//!
//! # Transports
//! - `RedisConnectionFactory`: multiplexed connection to a Redis server
//! - `MemoryConnectionFactory`: in-process store with fault injection

mod manager;
mod memory;
mod redis_transport;

use async_trait::async_trait;

use crate::executor::Classify;

// Re-export public types
pub use self::manager::ConnectionManager;
pub use self::memory::{MemoryConnectionFactory, MemoryError, MemoryTransport};
pub use self::redis_transport::{RedisConnectionFactory, RedisTransport, RedisTransportError};

// == Transport ==
/// A live connection to the store.
///
/// Implementations must be safe to share between concurrent callers.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Error: Classify;

    /// Lightweight round-trip probe; a healthy server answers `PONG`.
    async fn ping(&self) -> Result<String, Self::Error>;

    /// Returns false once the connection was closed or found broken.
    fn is_open(&self) -> bool;

    async fn close(&self) -> Result<(), Self::Error>;
}

// == Connection Factory ==
/// Materializes transport connections for a [`ConnectionManager`].
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Transport;

    async fn connect(
        &self,
    ) -> Result<Self::Connection, <Self::Connection as Transport>::Error>;

    /// Releases auxiliary resources owned by the factory.
    async fn shutdown(&self) -> Result<(), <Self::Connection as Transport>::Error> {
        Ok(())
    }
}
