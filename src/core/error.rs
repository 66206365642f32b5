//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The stored `(module, name)` pair has no registered unit of work.
    #[error("cannot resolve task {module}.{name}")]
    Resolution {
        /// Namespace the task was submitted under.
        module: String,
        /// Name of the unit of work inside the namespace.
        name: String,
    },
    /// Task arguments could not be encoded for storage or decoded at claim time.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The unit of work itself failed.
    #[error("execution fault: {0}")]
    Execution(String),
    /// Transient loss of the store connection; the next iteration retries.
    #[error("store connectivity lost: {0}")]
    StoreConnectivity(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// Whether this error is the recoverable infrastructure class that is
    /// handled by resetting the store connection.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::StoreConnectivity(_))
    }

    pub(crate) fn resolution(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Resolution {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
