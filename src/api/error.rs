//! Gateway error type
//!
//! Maps store failures onto HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::error::{FailureKind, StoreError};
use crate::models::ErrorResponse;

// == Api Error Enum ==
/// Errors returned by the gateway handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Key does not exist
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Request body or path failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Store command failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(err) => store_status(err),
        }
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        StoreError::RetriesExhausted { .. } | StoreError::Interrupted { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => match err.kind() {
            Some(FailureKind::Connection) => StatusCode::SERVICE_UNAVAILABLE,
            Some(FailureKind::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            Some(FailureKind::Serialization) | Some(FailureKind::Operation) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            None => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the gateway handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
