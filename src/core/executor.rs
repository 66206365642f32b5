//! Unit-of-work trait and per-worker outcome.

use async_trait::async_trait;

use super::AppResult;

/// A resolved, argument-bound unit of work.
///
/// Instances are produced by the [`TaskRegistry`](super::TaskRegistry) from a
/// stored descriptor and moved onto a dedicated worker thread, where
/// `execute` is driven to completion on that thread's own runtime.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use task_manager::core::{AppResult, Task};
///
/// struct SendMail {
///     to: String,
/// }
///
/// #[async_trait]
/// impl Task for SendMail {
///     async fn execute(&mut self) -> AppResult<()> {
///         tracing::info!(to = %self.to, "sending mail");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + 'static {
    /// Run the unit of work.
    ///
    /// Any error returned here (or any panic) is contained by the worker
    /// and reported as [`WorkerOutcome::Fault`]; it never reaches the loop.
    async fn execute(&mut self) -> AppResult<()>;
}

/// How a worker's unit of work ended. Consumed only by the reap step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// `execute` returned `Ok`.
    Success,
    /// `execute` returned an error, panicked, or could not be started.
    Fault(String),
}

impl WorkerOutcome {
    /// Whether the unit of work succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<AppResult<()>> for WorkerOutcome {
    fn from(result: AppResult<()>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(e) => Self::Fault(format!("{e:#}")),
        }
    }
}
