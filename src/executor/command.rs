//! Command Executor
//!
//! Runs store commands under the configured retry policy.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::{RetryConfig, StoreConfig};
use crate::error::{FailureKind, Result, StoreError};
use crate::executor::{Backoff, Classify, FailureClassifier};

// == Command Executor ==
/// Executes commands with failure classification and exponential backoff.
///
/// Per invocation the executor moves through
/// `Attempting -> {Succeeded | RetryWait -> Attempting | Failed}`.
/// Connection failures are retried while attempts remain, timeouts only when
/// `retry_on_timeout` is set; operation, serialization and unrecognized
/// failures are returned immediately. Panics raised by a command are never
/// caught.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    retry: RetryConfig,
    classifier: FailureClassifier,
    cancel: CancellationToken,
}

impl CommandExecutor {
    /// Creates an executor from the store configuration.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        Self::with_policy(config.retry.clone(), config.timeout)
    }

    /// Creates an executor from an explicit policy and command timeout.
    ///
    /// Fails with `InvalidArgument` when the policy is inconsistent.
    pub fn with_policy(retry: RetryConfig, command_timeout: Duration) -> Result<Self> {
        retry.validate()?;
        Ok(Self {
            retry,
            classifier: FailureClassifier::new(command_timeout),
            cancel: CancellationToken::new(),
        })
    }

    /// Aborts pending backoff waits when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn classifier(&self) -> &FailureClassifier {
        &self.classifier
    }

    // == Execute ==
    /// Runs `command` for `operation`, retrying transient failures.
    ///
    /// # Errors
    /// - The classified failure when it is not retryable or retry is disabled
    /// - `RetriesExhausted` wrapping the last failure once every attempt failed
    /// - `Interrupted` when cancelled during a backoff wait
    pub async fn execute<T, E, F, Fut>(&self, operation: &str, mut command: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Classify,
    {
        if !self.retry.enabled {
            return self.execute_once(operation, &mut command).await;
        }

        let max_attempts = self.retry.max_attempts;
        let mut backoff = Backoff::new(&self.retry);
        let mut attempts: u32 = 0;

        let last_error = loop {
            attempts += 1;
            let err = match self.execute_once(operation, &mut command).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match err.kind() {
                Some(FailureKind::Timeout) if !self.retry.retry_on_timeout => return Err(err),
                Some(FailureKind::Timeout) => {
                    warn!(
                        "Redis operation '{}' timed out (attempt {}/{})",
                        operation, attempts, max_attempts
                    );
                }
                Some(FailureKind::Connection) => {
                    warn!(
                        "Redis connection error on operation '{}' (attempt {}/{}): {}",
                        operation, attempts, max_attempts, err
                    );
                }
                _ => return Err(err),
            }

            if attempts >= max_attempts {
                break err;
            }

            let delay = backoff.next().unwrap_or(self.retry.max_backoff);
            self.pause(operation, delay).await?;
        };

        error!(
            "Redis operation '{}' failed after {} attempts",
            operation, attempts
        );
        Err(StoreError::RetriesExhausted {
            operation: operation.to_string(),
            attempts,
            source: Box::new(last_error),
        })
    }

    async fn execute_once<T, E, F, Fut>(&self, operation: &str, command: &mut F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Classify,
    {
        command()
            .await
            .map_err(|err| self.classifier.classify::<T, E>(operation, err))
    }

    async fn pause(&self, operation: &str, delay: Duration) -> Result<()> {
        debug!("Retrying '{}' in {:?}", operation, delay);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StoreError::Interrupted {
                operation: operation.to_string(),
            }),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
