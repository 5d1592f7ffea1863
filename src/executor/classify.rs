//! Failure Classification Module
//!
//! Maps raw transport errors onto the semantic failure kinds the executor
//! uses to decide retry eligibility.

use std::io;
use std::time::Duration;

use crate::error::{FailureKind, StoreError};

// == Classify Trait ==
/// Errors that can be sorted into a [`FailureKind`].
///
/// Returning `None` marks the error as unrecognized; it is then wrapped as
/// a generic failure and never retried.
pub trait Classify: std::error::Error + Send + Sync + Sized + 'static {
    fn failure_kind(&self) -> Option<FailureKind>;

    /// Hands back errors that are already a [`StoreError`] so they are not
    /// wrapped a second time.
    fn into_classified(self) -> Result<StoreError, Self> {
        Err(self)
    }
}

impl Classify for StoreError {
    fn failure_kind(&self) -> Option<FailureKind> {
        self.kind()
    }

    fn into_classified(self) -> Result<StoreError, Self> {
        Ok(self)
    }
}

impl Classify for redis::RedisError {
    fn failure_kind(&self) -> Option<FailureKind> {
        if self.is_timeout() {
            Some(FailureKind::Timeout)
        } else if self.is_io_error()
            || self.is_connection_dropped()
            || self.is_connection_refusal()
            || self.kind() == redis::ErrorKind::AuthenticationFailed
        {
            Some(FailureKind::Connection)
        } else if self.kind() == redis::ErrorKind::TypeError {
            Some(FailureKind::Serialization)
        } else {
            Some(FailureKind::Operation)
        }
    }
}

impl Classify for io::Error {
    fn failure_kind(&self) -> Option<FailureKind> {
        match self.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Some(FailureKind::Timeout),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Some(FailureKind::Connection),
            io::ErrorKind::InvalidData => Some(FailureKind::Serialization),
            _ => None,
        }
    }
}

impl Classify for serde_json::Error {
    fn failure_kind(&self) -> Option<FailureKind> {
        Some(FailureKind::Serialization)
    }
}

// == Failure Classifier ==
/// Converts raw command errors into [`StoreError`] values with operation context.
#[derive(Debug, Clone, Copy)]
pub struct FailureClassifier {
    command_timeout: Duration,
}

impl FailureClassifier {
    /// Creates a classifier that reports `command_timeout` on timeout failures.
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Classifies `error` raised by `operation`, whose result type is `T`.
    ///
    /// Serialization failures report `T` as their target type.
    pub fn classify<T, E: Classify>(&self, operation: &str, error: E) -> StoreError {
        let error = match error.into_classified() {
            Ok(classified) => return classified,
            Err(raw) => raw,
        };
        let message = error.to_string();
        let kind = error.failure_kind();
        let source = Some(Box::new(error) as crate::error::BoxError);

        match kind {
            Some(FailureKind::Connection) => StoreError::Connection {
                message: format!("Failed to connect to Redis for operation: {}", operation),
                source,
            },
            Some(FailureKind::Timeout) => StoreError::Timeout {
                operation: operation.to_string(),
                timeout: self.command_timeout,
                source,
            },
            Some(FailureKind::Serialization) => StoreError::Serialization {
                target_type: std::any::type_name::<T>(),
                message,
                source,
            },
            Some(FailureKind::Operation) => StoreError::Operation {
                operation: operation.to_string(),
                message,
                source,
            },
            None => StoreError::Failure {
                message: format!("Redis operation '{}' failed: {}", operation, message),
                source,
            },
        }
    }
}
