//! Health Monitor Task
//!
//! Background task that periodically probes the managed connection and
//! logs state changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionFactory, ConnectionManager};

/// Spawns a task that checks `manager.is_healthy()` every `interval`.
///
/// The probe never opens a connection. The task ends on its own once the
/// manager is destroyed; the handle may also be aborted.
///
/// # Example
/// ```ignore
/// let monitor = spawn_health_monitor(manager.clone(), Duration::from_secs(30));
/// // Later, during shutdown:
/// manager.destroy().await;
/// monitor.await?;
/// ```
pub fn spawn_health_monitor<F: ConnectionFactory>(
    manager: Arc<ConnectionManager<F>>,
    interval: Duration,
) -> JoinHandle<()> {
    let shutdown = manager.shutdown_token();

    tokio::spawn(async move {
        info!(
            "Starting health monitor with interval of {}ms",
            interval.as_millis()
        );
        let mut last_healthy: Option<bool> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let healthy = manager.is_healthy().await;
            match (last_healthy, healthy) {
                (Some(false), true) => info!("Redis connection recovered"),
                (Some(true), false) => warn!("Redis connection became unhealthy"),
                _ => debug!("Health check: healthy={}", healthy),
            }
            last_healthy = Some(healthy);
        }

        info!("Health monitor stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryConnectionFactory;

    #[tokio::test(start_paused = true)]
    async fn test_monitor_pings_without_connecting() {
        let factory = MemoryConnectionFactory::new();
        let manager = Arc::new(ConnectionManager::new(factory.clone()));

        let handle = spawn_health_monitor(manager.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(3500)).await;

        // Nothing connected, so no probe reached the store
        assert_eq!(factory.connect_count(), 0);
        assert_eq!(factory.command_count(), 0);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_probes_live_connection() {
        let factory = MemoryConnectionFactory::new();
        let manager = Arc::new(ConnectionManager::new(factory.clone()));
        manager.get_connection().await.unwrap();

        let handle = spawn_health_monitor(manager.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(factory.command_count(), 3);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_on_destroy() {
        let manager = Arc::new(ConnectionManager::new(MemoryConnectionFactory::new()));
        let handle = spawn_health_monitor(manager.clone(), Duration::from_secs(30));

        manager.destroy().await;

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor should stop after destroy")
            .unwrap();
    }
}
