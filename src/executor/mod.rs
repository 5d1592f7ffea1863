//! Executor Module
//!
//! Resilient command execution: failure classification, backoff schedule
//! and the retrying executor.

mod backoff;
mod classify;
mod command;

// Re-export public types
pub use backoff::Backoff;
pub use classify::{Classify, FailureClassifier};
pub use command::CommandExecutor;
