//! Process control: run the executor until a termination signal arrives.

use std::future::Future;

use anyhow::Context;
use tracing::info;

use crate::core::{AppResult, ExecutorHandle, LoopStats};

/// Wait for Ctrl-C (or SIGTERM on Unix), then stop the loop and wait for
/// it to drain.
///
/// # Errors
///
/// Fails if signal handlers cannot be installed or the control thread panicked.
pub async fn run_until_shutdown(handle: ExecutorHandle) -> AppResult<LoopStats> {
    run_until(handle, wait_for_signal()).await
}

/// Stop the loop once `shutdown` resolves, then join its control thread off
/// the async runtime.
///
/// # Errors
///
/// Fails if `shutdown` fails or the control thread panicked.
pub async fn run_until<F>(handle: ExecutorHandle, shutdown: F) -> AppResult<LoopStats>
where
    F: Future<Output = AppResult<()>>,
{
    shutdown.await?;
    info!("shutdown requested, draining executor");
    handle.stop();
    let stats = tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("joining executor control thread")??;
    Ok(stats)
}

async fn wait_for_signal() -> AppResult<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("waiting for ctrl-c")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    Ok(())
}
