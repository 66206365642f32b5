//! `task-manager` daemon: runs the executor loop until SIGINT/SIGTERM.

use anyhow::Context;
use task_manager::builders::ExecutorBuilder;
use task_manager::config::ExecutorConfig;
use task_manager::core::{register_builtin, AppResult, TaskRegistry};
use task_manager::runtime::run_until_shutdown;
use task_manager::util::init_tracing;

#[tokio::main]
async fn main() -> AppResult<()> {
    init_tracing();

    let config = ExecutorConfig::from_env()
        .map_err(anyhow::Error::msg)
        .context("loading task manager configuration")?;
    tracing::info!(store = ?config.store, "starting task manager");

    let mut registry = TaskRegistry::new();
    register_builtin(&mut registry)?;

    let (task_loop, _store) = ExecutorBuilder::new(config)
        .registry(registry)
        .build()
        .context("building executor")?;
    let handle = task_loop.spawn()?;

    let stats = run_until_shutdown(handle).await?;
    tracing::info!(
        launched = stats.launched,
        succeeded = stats.succeeded,
        faulted = stats.faulted,
        dropped = stats.dropped,
        "task manager exited"
    );
    Ok(())
}
