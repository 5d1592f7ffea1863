//! API Handlers
//!
//! HTTP request handlers for each gateway endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use super::error::{ApiError, Result};
use crate::connection::{ConnectionFactory, ConnectionManager};
use crate::key::KeyWithExpiration;
use crate::models::requests::validate_key;
use crate::models::{
    DeleteResponse, GetResponse, HealthResponse, IncrementParams, IncrementResponse, SetRequest,
    SetResponse, TtlResponse,
};
use crate::ops::{ValueCommands, ValueOperations};

/// Application state shared across all handlers.
pub struct AppState<F>
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
{
    pub values: Arc<ValueOperations<F>>,
}

impl<F> AppState<F>
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
{
    pub fn new(values: ValueOperations<F>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager<F>> {
        self.values.manager()
    }
}

// Derived Clone would require `F: Clone`.
impl<F> Clone for AppState<F>
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
{
    fn clone(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
        }
    }
}

fn checked_key(key: &str) -> Result<()> {
    match validate_key(key) {
        Some(error) => Err(ApiError::InvalidRequest(error)),
        None => Ok(()),
    }
}

/// Handler for PUT /set
pub async fn set_handler<F>(
    State(state): State<AppState<F>>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>>
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
{
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let key = KeyWithExpiration::with_ttl(req.key, req.ttl.map(Duration::from_secs))?;
    state.values.set(&key, &req.value).await?;

    Ok(Json(SetResponse::new(key.key(), req.ttl)))
}

/// Handler for GET /get/:key
pub async fn get_handler<F>(
    State(state): State<AppState<F>>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>>
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
{
    checked_key(&key)?;
    match state.values.get::<Value>(&key).await? {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(ApiError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
pub async fn delete_handler<F>(
    State(state): State<AppState<F>>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>>
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
{
    checked_key(&key)?;
    if !state.values.delete(&key).await? {
        return Err(ApiError::NotFound(key));
    }

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /incr/:key
///
/// Accepts an optional `?by=N` query; a missing counter starts at zero.
pub async fn increment_handler<F>(
    State(state): State<AppState<F>>,
    Path(key): Path<String>,
    Query(params): Query<IncrementParams>,
) -> Result<Json<IncrementResponse>>
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
{
    checked_key(&key)?;
    let value = state
        .values
        .increment_by(&key, params.by.unwrap_or(1))
        .await?;

    Ok(Json(IncrementResponse { key, value }))
}

/// Handler for GET /ttl/:key
pub async fn ttl_handler<F>(
    State(state): State<AppState<F>>,
    Path(key): Path<String>,
) -> Result<Json<TtlResponse>>
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
{
    checked_key(&key)?;
    let ttl = state.values.ttl(&key).await?;
    match TtlResponse::from_ttl(key.as_str(), ttl) {
        Some(response) => Ok(Json(response)),
        None => Err(ApiError::NotFound(key)),
    }
}

/// Handler for GET /health
///
/// Responds 503 while the store connection is absent or failing.
pub async fn health_handler<F>(
    State(state): State<AppState<F>>,
) -> (StatusCode, Json<HealthResponse>)
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
{
    let response = HealthResponse::new(state.manager().is_healthy().await);
    let status = if response.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::connection::MemoryConnectionFactory;
    use crate::executor::CommandExecutor;
    use serde_json::json;

    fn create_state() -> (MemoryConnectionFactory, AppState<MemoryConnectionFactory>) {
        let factory = MemoryConnectionFactory::new();
        let manager = Arc::new(ConnectionManager::new(factory.clone()));
        let executor =
            CommandExecutor::with_policy(RetryConfig::default(), Duration::from_secs(1)).unwrap();
        (factory, AppState::new(ValueOperations::new(manager, executor)))
    }

    fn set_request(key: &str, value: Value, ttl: Option<u64>) -> SetRequest {
        SetRequest {
            key: key.to_string(),
            value,
            ttl,
        }
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let (_, state) = create_state();

        let req = set_request("test_key", json!({"n": 1}), None);
        let result = set_handler(State(state.clone()), Json(req)).await;
        assert!(result.is_ok());

        let response = get_handler(State(state.clone()), Path("test_key".to_string()))
            .await
            .unwrap();
        assert_eq!(response.value, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let (_, state) = create_state();

        let result = get_handler(State(state), Path("nonexistent".to_string())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let (_, state) = create_state();
        set_handler(State(state.clone()), Json(set_request("to_delete", json!("v"), None)))
            .await
            .unwrap();

        let result = delete_handler(State(state.clone()), Path("to_delete".to_string())).await;
        assert!(result.is_ok());

        let result = delete_handler(State(state), Path("to_delete".to_string())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_increment_handler() {
        let (_, state) = create_state();

        let first = increment_handler(
            State(state.clone()),
            Path("hits".to_string()),
            Query(IncrementParams::default()),
        )
        .await
        .unwrap();
        assert_eq!(first.value, 1);

        let second = increment_handler(
            State(state),
            Path("hits".to_string()),
            Query(IncrementParams { by: Some(10) }),
        )
        .await
        .unwrap();
        assert_eq!(second.value, 11);
    }

    #[tokio::test]
    async fn test_ttl_handler() {
        let (_, state) = create_state();
        set_handler(State(state.clone()), Json(set_request("session", json!("t"), Some(60))))
            .await
            .unwrap();

        let response = ttl_handler(State(state.clone()), Path("session".to_string()))
            .await
            .unwrap();
        assert!(!response.persistent);
        assert!(response.ttl_ms.unwrap() <= 60_000);

        let result = ttl_handler(State(state), Path("missing".to_string())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let (_, state) = create_state();

        let (status, _) = health_handler(State(state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.manager().get_connection().await.unwrap();
        let (status, response) = health_handler(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let (factory, state) = create_state();

        let result = set_handler(State(state), Json(set_request("", json!(1), None))).await;
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
        assert_eq!(factory.command_count(), 0);
    }
}
