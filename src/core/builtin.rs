//! Diagnostic tasks shipped with the daemon.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{AppResult, SchedulerError, Task, TaskRegistry};

/// Namespace of the built-in tasks.
pub const BUILTIN_MODULE: &str = "builtin";

/// Logs its keyword arguments.
#[derive(Debug, Deserialize)]
pub struct EchoTask {
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

#[async_trait]
impl Task for EchoTask {
    async fn execute(&mut self) -> AppResult<()> {
        tracing::info!(fields = ?self.fields, "echo");
        Ok(())
    }
}

/// Sleeps for `seconds` (fractional allowed).
#[derive(Debug, Deserialize)]
pub struct SleepTask {
    seconds: f64,
}

#[async_trait]
impl Task for SleepTask {
    async fn execute(&mut self) -> AppResult<()> {
        let duration = Duration::try_from_secs_f64(self.seconds)
            .map_err(|e| anyhow::anyhow!("invalid sleep duration {}: {e}", self.seconds))?;
        tokio::time::sleep(duration).await;
        tracing::debug!(seconds = self.seconds, "sleep finished");
        Ok(())
    }
}

/// Register `builtin.echo` and `builtin.sleep`.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidConfig`] if either key is already taken.
pub fn register_builtin(registry: &mut TaskRegistry) -> Result<(), SchedulerError> {
    registry
        .register_kwargs::<EchoTask>(BUILTIN_MODULE, "echo")?
        .register_kwargs::<SleepTask>(BUILTIN_MODULE, "sleep")?;
    Ok(())
}
