//! End-to-end resilience tests
//!
//! Drives the executor, connection manager and value operations together
//! against the in-memory transport with injected faults.

use std::sync::Arc;
use std::time::Duration;

use redis_utils::connection::{ConnectionManager, MemoryConnectionFactory, MemoryError};
use redis_utils::{
    CommandExecutor, FailureKind, HashOperations, KeyTtl, KeyWithExpiration, RetryConfig,
    StoreError, TimeUnit, ValueOperations,
};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

// == Helper Functions ==

fn policy(max_attempts: u32, retry_on_timeout: bool) -> RetryConfig {
    RetryConfig {
        enabled: true,
        max_attempts,
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_secs(2),
        backoff_multiplier: 2.0,
        retry_on_timeout,
    }
}

fn setup(
    retry: RetryConfig,
) -> (
    MemoryConnectionFactory,
    Arc<ConnectionManager<MemoryConnectionFactory>>,
    ValueOperations<MemoryConnectionFactory>,
) {
    let factory = MemoryConnectionFactory::new();
    let manager = Arc::new(ConnectionManager::new(factory.clone()));
    let executor = CommandExecutor::with_policy(retry, Duration::from_millis(250))
        .unwrap()
        .with_cancellation(manager.shutdown_token());
    let ops = ValueOperations::new(manager.clone(), executor);
    (factory, manager, ops)
}

async fn seed(ops: &ValueOperations<MemoryConnectionFactory>, key: &str, value: &str) {
    ops.set(&KeyWithExpiration::new(key).unwrap(), value)
        .await
        .unwrap();
}

// == Retry Properties ==

#[tokio::test(start_paused = true)]
async fn test_documented_scenario_succeeds_on_third_attempt() {
    let (factory, _manager, ops) = setup(policy(3, false));
    seed(&ops, "greeting", "SUCCESS").await;
    let before = factory.command_count();
    factory.fail_next(MemoryError::ConnectionLost, 2).await;

    let start = Instant::now();
    let value: Option<String> = ops.get("greeting").await.unwrap();

    assert_eq!(value.as_deref(), Some("SUCCESS"));
    assert_eq!(factory.command_count() - before, 3);
    assert!(start.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_persistent_connection_failure_exhausts_after_n_attempts() {
    let (factory, _manager, ops) = setup(policy(5, false));
    seed(&ops, "k", "v").await;
    let before = factory.command_count();
    factory.fail_next(MemoryError::Closed, 100).await;

    let start = Instant::now();
    let err = assert_err!(ops.exists("k").await);

    match err {
        StoreError::RetriesExhausted {
            operation,
            attempts,
            source,
        } => {
            assert_eq!(operation, "exists");
            assert_eq!(attempts, 5);
            assert_eq!(source.kind(), Some(FailureKind::Connection));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(factory.command_count() - before, 5);
    // 100 + 200 + 400 + 800
    assert!(start.elapsed() >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_retried_only_when_enabled() {
    let (factory, _manager, ops) = setup(policy(4, false));
    factory.fail_next(MemoryError::TimedOut, 1).await;
    let err = assert_err!(ops.get::<String>("k").await);
    assert_eq!(err.kind(), Some(FailureKind::Timeout));
    assert_eq!(err.timeout(), Some(Duration::from_millis(250)));
    assert_eq!(factory.command_count(), 1);

    let (factory, _manager, ops) = setup(policy(4, true));
    factory.fail_next(MemoryError::TimedOut, 1).await;
    assert_ok!(ops.get::<String>("k").await);
    assert_eq!(factory.command_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_operation_error_never_retried() {
    let (factory, _manager, ops) = setup(policy(10, true));
    seed(&ops, "name", "ada").await;
    let before = factory.command_count();

    let err = assert_err!(ops.increment("name").await);

    assert_eq!(err.kind(), Some(FailureKind::Operation));
    assert_eq!(factory.command_count() - before, 1);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_retry_runs_once() {
    let retry = RetryConfig {
        enabled: false,
        ..policy(5, true)
    };
    let (factory, _manager, ops) = setup(retry);
    factory.fail_next(MemoryError::Refused, 1).await;

    let err = assert_err!(ops.exists("k").await);

    assert_eq!(err.kind(), Some(FailureKind::Connection));
    assert_eq!(factory.command_count(), 1);
}

// == Lifecycle ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_creates_one_connection() {
    let factory = MemoryConnectionFactory::new().with_connect_delay(Duration::from_millis(25));
    let manager = Arc::new(ConnectionManager::new(factory.clone()));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move {
                let connection = manager.get_connection().await?;
                Ok::<_, StoreError>(Arc::as_ptr(&connection) as usize)
            })
        })
        .collect();

    let mut handles_seen = Vec::new();
    for handle in handles {
        handles_seen.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(factory.connect_count(), 1);
    assert!(handles_seen.iter().all(|p| *p == handles_seen[0]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_destroy_is_idempotent() {
    let (factory, manager, ops) = setup(policy(3, false));
    seed(&ops, "k", "v").await;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.destroy().await })
        })
        .collect();
    for handle in handles {
        assert_ok!(handle.await);
    }

    assert_eq!(factory.close_count(), 1);
    assert!(!manager.is_healthy().await);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_interrupts_pending_retry() {
    let retry = RetryConfig {
        initial_backoff: Duration::from_secs(2),
        ..policy(3, false)
    };
    let (factory, manager, ops) = setup(retry);
    factory.refuse_connections(true);

    let pending = tokio::spawn(async move { ops.exists("k").await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    manager.destroy().await;

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, StoreError::Interrupted { .. }));
    assert_eq!(err.kind(), None);
}

#[tokio::test(start_paused = true)]
async fn test_calls_after_destroy_fail_fast_without_retry() {
    let (factory, manager, ops) = setup(policy(5, false));
    seed(&ops, "k", "v").await;
    manager.destroy().await;
    let commands = factory.command_count();

    let start = Instant::now();
    let err = assert_err!(ops.exists("k").await);

    assert!(matches!(err, StoreError::IllegalState(_)));
    assert_eq!(err.kind(), None);
    assert_eq!(factory.command_count(), commands);
    assert_eq!(factory.connect_count(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

// == Keys ==

#[tokio::test]
async fn test_unbounded_ttl_fails_as_operation_error() {
    let (factory, _manager, ops) = setup(policy(3, false));
    let key = KeyWithExpiration::with_days("archive", u64::MAX).unwrap();

    let err = assert_err!(ops.set(&key, "v").await);

    assert_eq!(err.kind(), Some(FailureKind::Operation));
    assert_eq!(factory.command_count(), 1);
    assert_eq!(ops.ttl("archive").await.unwrap(), KeyTtl::Missing);
}

#[tokio::test(start_paused = true)]
async fn test_hash_and_value_operations_share_connection() {
    let (factory, manager, ops) = setup(policy(3, false));
    let executor = CommandExecutor::with_policy(policy(3, false), Duration::from_millis(250))
        .unwrap()
        .with_cancellation(manager.shutdown_token());
    let hashes = HashOperations::new(manager.clone(), executor);

    hashes.put("cart:1", "apples", &3).await.unwrap();
    assert_eq!(hashes.increment("cart:1", "apples", 2).await.unwrap(), 5);
    assert!(ops.exists("cart:1").await.unwrap());
    assert_eq!(
        ops.keys("cart:*").await.unwrap().into_iter().collect::<Vec<_>>(),
        vec!["cart:1".to_string()]
    );

    factory.fail_next(MemoryError::ConnectionLost, 1).await;
    assert_eq!(hashes.get::<i64>("cart:1", "apples").await.unwrap(), Some(5));
    assert_eq!(factory.connect_count(), 2);

    assert_eq!(ops.delete_many(&["cart:1"]).await.unwrap(), 1);
    assert_eq!(hashes.size("cart:1").await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_key_ttl_round_trips_through_store() {
    let (_factory, _manager, ops) = setup(policy(3, false));
    let key = KeyWithExpiration::with_timeout("session", 1500, TimeUnit::Milliseconds).unwrap();
    assert_eq!(key.timeout(TimeUnit::Seconds).unwrap(), 1);

    ops.set(&key, &"token").await.unwrap();
    assert!(ops.exists("session").await.unwrap());

    tokio::time::advance(Duration::from_millis(1500)).await;
    assert!(!ops.exists("session").await.unwrap());
}
