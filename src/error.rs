//! Error types for Redis operations
//!
//! Provides the semantic failure taxonomy surfaced to callers using thiserror.

use std::time::Duration;

use thiserror::Error;

/// Boxed underlying cause carried by wrapped failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// == Failure Kind ==
/// Semantic class of a failed command, used to decide retry eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Network or transport-level failure
    Connection,
    /// The command exceeded the configured timeout
    Timeout,
    /// Non-transient error reported by the store (wrong type, bad arguments)
    Operation,
    /// Payload could not be encoded or decoded
    Serialization,
}

impl FailureKind {
    /// Returns true when a failure of this kind may be retried.
    ///
    /// Connection failures are always transient; timeouts only when the
    /// retry policy opts in.
    pub fn is_retryable(self, retry_on_timeout: bool) -> bool {
        match self {
            FailureKind::Connection => true,
            FailureKind::Timeout => retry_on_timeout,
            FailureKind::Operation | FailureKind::Serialization => false,
        }
    }
}

// == Store Error Enum ==
/// Unified error type for every Redis utility operation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection could not be established or was lost
    #[error("{message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Command exceeded the configured timeout
    #[error("Redis operation '{operation}' timed out after {}ms", timeout.as_millis())]
    Timeout {
        operation: String,
        timeout: Duration,
        #[source]
        source: Option<BoxError>,
    },

    /// Value could not be converted to or from its stored form
    #[error("Failed to convert value of type {target_type}: {message}")]
    Serialization {
        target_type: &'static str,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Store rejected the command
    #[error("Redis operation '{operation}' failed: {message}")]
    Operation {
        operation: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Unrecognized failure wrapping its original cause
    #[error("{message}")]
    Failure {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Every attempt allowed by the retry policy failed
    #[error("Operation '{operation}' failed after {attempts} attempts")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<StoreError>,
    },

    /// Cancelled while waiting between attempts
    #[error("Interrupted while waiting to retry operation '{operation}'")]
    Interrupted { operation: String },

    /// Caller supplied an invalid value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation is not valid for the current state
    #[error("Illegal state: {0}")]
    IllegalState(String),
}

impl StoreError {
    /// Builds a connection failure without an underlying cause.
    pub fn connection(message: impl Into<String>) -> Self {
        StoreError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Returns the semantic kind of this error, if it has one.
    ///
    /// Generic, exhausted, interrupted and argument errors have no kind and
    /// are never retried.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            StoreError::Connection { .. } => Some(FailureKind::Connection),
            StoreError::Timeout { .. } => Some(FailureKind::Timeout),
            StoreError::Serialization { .. } => Some(FailureKind::Serialization),
            StoreError::Operation { .. } => Some(FailureKind::Operation),
            _ => None,
        }
    }

    /// Returns the configured timeout carried by a timeout failure.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            StoreError::Timeout { timeout, .. } => Some(*timeout),
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for Redis utility operations.
pub type Result<T> = std::result::Result<T, StoreError>;
