//! Set of in-flight workers, one dedicated OS thread per unit of work.
//!
//! Every worker owns a single-threaded tokio runtime, so a blocking or
//! long-running task never stalls the executor loop or its siblings.
//! Completion is observed by polling [`JoinHandle::is_finished`]; panics
//! surface through `join` and are turned into [`WorkerOutcome::Fault`].

use std::any::Any;
use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, error};

use super::{ClaimedTask, SchedulerError, Task, TaskHash, TaskKey, TaskKind, WorkerOutcome};

struct InFlightTask {
    key: TaskKey,
    kind: TaskKind,
    previous_executed_at: Option<NaiveDate>,
    started: Instant,
    handle: JoinHandle<WorkerOutcome>,
}

/// A worker that has exited and been joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedTask {
    /// Descriptor hash.
    pub hash: TaskHash,
    /// Registry key.
    pub key: TaskKey,
    /// Persisted variant.
    pub kind: TaskKind,
    /// `executed_at` captured at claim time (daily only).
    pub previous_executed_at: Option<NaiveDate>,
    /// How the unit of work ended.
    pub outcome: WorkerOutcome,
    /// Wall time between launch and reap.
    pub elapsed: Duration,
}

/// In-flight workers keyed by descriptor hash.
#[derive(Default)]
pub struct WorkerGroup {
    workers: HashMap<TaskHash, InFlightTask>,
}

impl WorkerGroup {
    /// Create an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a worker for `hash` is still in flight.
    #[must_use]
    pub fn contains(&self, hash: &TaskHash) -> bool {
        self.workers.contains_key(hash)
    }

    /// Number of workers in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no worker is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Start `task` on a new worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Execution`] if the OS refuses to spawn the
    /// thread; nothing is added to the group in that case.
    pub fn launch(&mut self, claimed: &ClaimedTask, mut task: Box<dyn Task>) -> Result<(), SchedulerError> {
        let label = claimed.key.to_string();
        let handle = thread::Builder::new()
            .name(format!("task-worker-{}", claimed.hash.short()))
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!(task = %label, error = %e, "failed to create worker runtime");
                        return WorkerOutcome::Fault(format!("worker runtime: {e}"));
                    }
                };
                debug!(task = %label, "worker executing task");
                WorkerOutcome::from(rt.block_on(task.execute()))
            })
            .map_err(|e| SchedulerError::Execution(format!("spawning worker thread: {e}")))?;

        self.workers.insert(
            claimed.hash.clone(),
            InFlightTask {
                key: claimed.key.clone(),
                kind: claimed.kind,
                previous_executed_at: claimed.previous_executed_at,
                started: Instant::now(),
                handle,
            },
        );
        Ok(())
    }

    /// Join and remove every worker whose thread has exited.
    pub fn reap_finished(&mut self) -> Vec<FinishedTask> {
        let done: Vec<TaskHash> = self
            .workers
            .iter()
            .filter(|(_, w)| w.handle.is_finished())
            .map(|(hash, _)| hash.clone())
            .collect();
        done.into_iter()
            .filter_map(|hash| self.workers.remove(&hash).map(|w| Self::join(hash, w)))
            .collect()
    }

    /// Block until every in-flight worker has exited, then reap them all.
    pub fn join_all(&mut self) -> Vec<FinishedTask> {
        self.workers
            .drain()
            .map(|(hash, worker)| Self::join(hash, worker))
            .collect()
    }

    fn join(hash: TaskHash, worker: InFlightTask) -> FinishedTask {
        let outcome = worker
            .handle
            .join()
            .unwrap_or_else(|payload| WorkerOutcome::Fault(panic_message(payload.as_ref())));
        FinishedTask {
            hash,
            key: worker.key,
            kind: worker.kind,
            previous_executed_at: worker.previous_executed_at,
            outcome,
            elapsed: worker.started.elapsed(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("worker panicked: {message}")
}
