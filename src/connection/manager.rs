//! Connection Lifecycle Manager
//!
//! Owns the single shared transport connection: lazy creation, health
//! checks and idempotent shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ConnectionFactory, Transport};
use crate::error::{Result, StoreError};

// == Connection Manager ==
/// Produces and monitors the shared connection created by `F`.
///
/// At most one live connection exists per manager. A connection found
/// closed is replaced on the next [`get_connection`](Self::get_connection);
/// once [`destroy`](Self::destroy) ran, the manager never connects again.
///
/// Connecting is serialized on its own lock, so readers of the current
/// connection (health checks included) never wait for a slow connect.
pub struct ConnectionManager<F: ConnectionFactory> {
    factory: F,
    connection: RwLock<Option<Arc<F::Connection>>>,
    connecting: Mutex<()>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl<F: ConnectionFactory> ConnectionManager<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            connection: RwLock::new(None),
            connecting: Mutex::new(()),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Returns true once [`destroy`](Self::destroy) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Token cancelled when the manager shuts down.
    ///
    /// Hand it to executors so pending retry waits abort on shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    // == Get Connection ==
    /// Returns the live connection, creating it if absent or closed.
    ///
    /// Concurrent first callers wait on the same connect lock, so only one
    /// underlying connection is created.
    ///
    /// # Errors
    /// `IllegalState` when the manager was shut down, `Connection` when the
    /// factory fails.
    pub async fn get_connection(&self) -> Result<Arc<F::Connection>> {
        if self.is_closed() {
            return Err(shut_down());
        }
        if let Some(connection) = self.current().await {
            return Ok(connection);
        }

        let _connecting = self.connecting.lock().await;
        if self.is_closed() {
            return Err(shut_down());
        }
        if let Some(connection) = self.connection.read().await.as_ref() {
            if connection.is_open() {
                return Ok(Arc::clone(connection));
            }
            debug!("Redis connection is no longer open, reconnecting");
        }

        let connection = match self.factory.connect().await {
            Ok(connection) => Arc::new(connection),
            Err(err) => {
                error!("Failed to create Redis connection: {}", err);
                return Err(StoreError::Connection {
                    message: "Failed to create Redis connection".to_string(),
                    source: Some(Box::new(err)),
                });
            }
        };

        let mut slot = self.connection.write().await;
        if self.is_closed() {
            // destroy() ran while connecting and will not see this one
            drop(slot);
            if let Err(err) = connection.close().await {
                warn!("Error closing Redis connection opened during shutdown: {}", err);
            }
            return Err(shut_down());
        }

        info!("Redis connection established");
        *slot = Some(Arc::clone(&connection));
        Ok(connection)
    }

    async fn current(&self) -> Option<Arc<F::Connection>> {
        self.connection
            .read()
            .await
            .as_ref()
            .filter(|connection| connection.is_open())
            .cloned()
    }

    // == Health Check ==
    /// Pings the current connection.
    ///
    /// Returns false, never an error, when not connected or the ping fails.
    /// Never waits for a connect in progress.
    pub async fn is_healthy(&self) -> bool {
        if self.is_closed() {
            return false;
        }

        let connection = match self.current().await {
            Some(connection) => connection,
            None => return false,
        };

        match connection.ping().await {
            Ok(reply) => reply.eq_ignore_ascii_case("PONG"),
            Err(err) => {
                warn!("Health check failed: {}", err);
                false
            }
        }
    }

    // == Destroy ==
    /// Closes the connection and releases the factory's resources.
    ///
    /// Only the first call has any effect. Failures are logged and
    /// swallowed so shutdown always completes.
    pub async fn destroy(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Redis connection manager already shut down");
            return;
        }

        info!("Shutting down Redis connection manager");
        self.shutdown.cancel();

        let connection = self.connection.write().await.take();
        if let Some(connection) = connection {
            match connection.close().await {
                Ok(()) => info!("Redis connection closed"),
                Err(err) => error!("Error closing Redis connection: {}", err),
            }
        }

        match self.factory.shutdown().await {
            Ok(()) => info!("Redis client resources released"),
            Err(err) => error!("Error releasing Redis client resources: {}", err),
        }
    }
}

/// Carries no failure kind, so executors never retry it.
fn shut_down() -> StoreError {
    StoreError::IllegalState("Redis connection manager has been shut down".to_string())
}
