//! Redis Utils Gateway - HTTP front end for the Redis client core
//!
//! Serves get/set/counter/TTL endpoints backed by Redis, or by the
//! in-process store when `STORE_BACKEND=memory`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use redis_utils::api::create_router;
use redis_utils::config::{Backend, Config};
use redis_utils::connection::{
    ConnectionFactory, ConnectionManager, MemoryConnectionFactory, RedisConnectionFactory,
};
use redis_utils::executor::CommandExecutor;
use redis_utils::ops::{ValueCommands, ValueOperations};
use redis_utils::{spawn_health_monitor, AppState};

/// Main entry point for the gateway.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the selected backend and connection manager
/// 4. Start the background health monitor
/// 5. Serve HTTP until SIGINT/SIGTERM, then shut the connection down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "redis_utils=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Redis Utils Gateway");

    let config = Config::from_env();
    info!(
        "Configuration loaded: backend={:?}, redis={}:{}, port={}, max_attempts={}",
        config.backend,
        config.store.host,
        config.store.port,
        config.server_port,
        config.store.retry.max_attempts
    );
    if !config.store.pool_enabled {
        info!("Connection pooling disabled; a single multiplexed connection is always used");
    }

    match config.backend {
        Backend::Redis => {
            let factory = RedisConnectionFactory::new(&config.store)?;
            serve(factory, &config).await
        }
        Backend::Memory => serve(MemoryConnectionFactory::new(), &config).await,
    }
}

async fn serve<F>(factory: F, config: &Config) -> anyhow::Result<()>
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
{
    let manager = Arc::new(ConnectionManager::new(factory));
    let executor =
        CommandExecutor::new(&config.store)?.with_cancellation(manager.shutdown_token());

    // Connect eagerly so misconfiguration shows up in the startup logs
    if let Err(err) = manager.get_connection().await {
        warn!("Initial connection failed, will retry on demand: {}", err);
    }

    let monitor = spawn_health_monitor(manager.clone(), config.health_check_interval);
    let app = create_router(AppState::new(ValueOperations::new(manager.clone(), executor)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    manager.destroy().await;
    if let Err(err) = monitor.await {
        warn!("Health monitor ended abnormally: {}", err);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
