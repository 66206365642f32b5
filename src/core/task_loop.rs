//! The executor loop: poll, claim, dispatch, launch, reap.
//!
//! One control thread owns the loop. Each iteration either backs off
//! (saturated) or scans the store, claims runnable descriptors into the
//! [`DispatchQueue`], launches at most one worker and reaps finished ones.
//! The only blocking points are the bounded pop wait and the saturated
//! sleep, so a stop request is observed within one of those intervals.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::audit::{build_audit_event, AuditAction, AuditSink};
use super::daily::is_due;
use super::dispatch::{DispatchQueue, QueueWaker};
use super::stats::{LoopCounters, LoopStats};
use super::worker_group::{FinishedTask, WorkerGroup};
use super::{ClaimedTask, SchedulerError, TaskArguments, TaskHash, TaskKey, TaskKind, TaskRegistry, WorkerOutcome};
use crate::infra::store::TaskStore;
use crate::util::clock::{Clock, SystemClock};

/// Phase of the executor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// No work claimed, capacity available.
    Idle,
    /// Scanning the store.
    Polling,
    /// A claimed descriptor was popped and handled.
    Dispatching,
    /// In-flight workers reached the ceiling; no claims this iteration.
    Saturated,
    /// Checking worker liveness.
    Reaping,
    /// Shut down. Terminal.
    Stopped,
}

/// Tuning knobs read once when the loop is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSettings {
    /// Concurrency ceiling on in-flight workers.
    pub max_workers: usize,
    /// Time of day from which daily tasks become due.
    pub daily_execution_time: NaiveTime,
    /// Bounded wait when the dispatch queue is empty.
    pub poll_wait: Duration,
    /// Back-off when saturated.
    pub saturated_sleep: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_workers: 4,
            daily_execution_time: NaiveTime::MIN,
            poll_wait: Duration::from_secs(1),
            saturated_sleep: Duration::from_millis(100),
        }
    }
}

/// Cloneable stop request for a running loop.
#[derive(Clone)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    waker: QueueWaker,
}

impl StopSignal {
    /// Ask the loop to stop. A pending queue wait returns immediately.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
        self.waker.wake();
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Post-completion store mutation, kept until it succeeds.
#[derive(Debug, Clone)]
enum Cleanup {
    /// Worker reaped or descriptor dropped: delete a single, reset a daily.
    Finish { hash: TaskHash, kind: TaskKind },
    /// Claimed but never launched: hand the claim back.
    Release {
        hash: TaskHash,
        kind: TaskKind,
        previous_executed_at: Option<NaiveDate>,
    },
}

/// Single-threaded executor loop. See the module docs.
pub struct TaskLoop {
    store: Arc<dyn TaskStore>,
    registry: TaskRegistry,
    clock: Arc<dyn Clock>,
    audit: Option<Arc<dyn AuditSink>>,
    settings: LoopSettings,
    queue: DispatchQueue,
    workers: WorkerGroup,
    pending_cleanup: Vec<Cleanup>,
    counters: Arc<LoopCounters>,
    state: Arc<Mutex<LoopState>>,
    stop: StopSignal,
}

impl TaskLoop {
    /// Create a loop over `store` resolving tasks through `registry`.
    #[must_use]
    pub fn new(store: Arc<dyn TaskStore>, registry: TaskRegistry, settings: LoopSettings) -> Self {
        let queue = DispatchQueue::new();
        let stop = StopSignal {
            flag: Arc::new(AtomicBool::new(false)),
            waker: queue.waker(),
        };
        Self {
            store,
            registry,
            clock: Arc::new(SystemClock),
            audit: None,
            settings,
            queue,
            workers: WorkerGroup::new(),
            pending_cleanup: Vec::new(),
            counters: Arc::new(LoopCounters::default()),
            state: Arc::new(Mutex::new(LoopState::Idle)),
            stop,
        }
    }

    /// Replace the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report lifecycle events to `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Settings the loop was built with.
    #[must_use]
    pub const fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Handle that stops this loop from another thread.
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Snapshot of the loop counters.
    #[must_use]
    pub fn stats(&self) -> LoopStats {
        self.counters.snapshot()
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> LoopState {
        *self.state.lock()
    }

    /// Number of workers in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.workers.len()
    }

    /// Claimed descriptors waiting for a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn set_state(&self, state: LoopState) {
        *self.state.lock() = state;
    }

    /// Run one iteration and return the phase it ended in:
    /// `Saturated` (backed off), `Dispatching` (a descriptor was handled),
    /// `Idle` (nothing to dispatch) or `Stopped` (stop requested, no claims).
    pub fn run_once(&mut self) -> LoopState {
        self.retry_cleanups();

        if self.workers.len() >= self.settings.max_workers {
            self.set_state(LoopState::Saturated);
            thread::sleep(self.settings.saturated_sleep);
            self.reap();
            return LoopState::Saturated;
        }

        if self.stop.is_stopped() {
            self.reap();
            self.set_state(LoopState::Stopped);
            return LoopState::Stopped;
        }

        self.set_state(LoopState::Polling);
        if let Err(e) = self.poll() {
            self.store_fault(&e, "poll");
        }

        let phase = match self.queue.pop(self.settings.poll_wait) {
            Some(claimed) => {
                self.set_state(LoopState::Dispatching);
                self.dispatch(claimed);
                LoopState::Dispatching
            }
            None => LoopState::Idle,
        };

        self.set_state(LoopState::Reaping);
        self.reap();
        self.set_state(if self.workers.len() >= self.settings.max_workers {
            LoopState::Saturated
        } else {
            LoopState::Idle
        });
        phase
    }

    /// Iterate until stopped, then drain. Blocks the calling thread.
    pub fn run(&mut self) -> LoopStats {
        info!(
            max_workers = self.settings.max_workers,
            daily_execution_time = %self.settings.daily_execution_time,
            "executor loop started"
        );
        while !self.stop.is_stopped() {
            self.run_once();
        }
        self.shutdown();
        let stats = self.stats();
        info!(
            launched = stats.launched,
            succeeded = stats.succeeded,
            faulted = stats.faulted,
            "executor loop stopped"
        );
        stats
    }

    /// Run the loop on its own named control thread.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Execution`] if the thread cannot be spawned.
    pub fn spawn(mut self) -> Result<ExecutorHandle, SchedulerError> {
        let stop = self.stop_signal();
        let counters = Arc::clone(&self.counters);
        let state = Arc::clone(&self.state);
        let thread = thread::Builder::new()
            .name("task-manager-loop".into())
            .spawn(move || self.run())
            .map_err(|e| SchedulerError::Execution(format!("spawning control thread: {e}")))?;
        Ok(ExecutorHandle {
            stop,
            counters,
            state,
            thread: Some(thread),
        })
    }

    /// Stop claiming, hand queued claims back, and wait for every in-flight
    /// worker to be reaped.
    pub fn shutdown(&mut self) {
        self.stop.stop();
        self.set_state(LoopState::Reaping);

        for claimed in self.queue.drain() {
            self.record(&claimed.hash, &claimed.key, AuditAction::Released, None);
            self.cleanup(Cleanup::Release {
                hash: claimed.hash,
                kind: claimed.kind,
                previous_executed_at: claimed.previous_executed_at,
            });
        }

        if !self.workers.is_empty() {
            info!(in_flight = self.workers.len(), "waiting for in-flight workers");
        }
        for finished in self.workers.join_all() {
            self.finish(finished);
        }
        self.counters.set_in_flight(0);

        self.retry_cleanups();
        if !self.pending_cleanup.is_empty() {
            warn!(
                remaining = self.pending_cleanup.len(),
                "cleanup incomplete at shutdown; stale claims are released on next start"
            );
        }
        self.set_state(LoopState::Stopped);
    }

    fn poll(&self) -> Result<(), SchedulerError> {
        let now = self.clock.now();

        for task in self.store.pending_singles()? {
            if self.store.claim_single(&task.descriptor.hash, now)? {
                self.enqueue(ClaimedTask::single(&task));
            }
        }

        let (today, time) = (now.date(), now.time());
        for task in self.store.daily_tasks()? {
            let due = is_due(
                task.executed_at,
                today,
                time,
                self.settings.daily_execution_time,
                task.enabled,
            );
            if due && !task.descriptor.running && self.store.claim_daily(&task.descriptor.hash, now)? {
                self.enqueue(ClaimedTask::daily(&task));
            }
        }
        Ok(())
    }

    fn enqueue(&self, claimed: ClaimedTask) {
        LoopCounters::incr(&self.counters.claimed);
        debug!(
            hash = claimed.hash.short(),
            task = %claimed.key,
            priority = %claimed.priority,
            "claimed task"
        );
        self.record(&claimed.hash, &claimed.key, AuditAction::Claimed, None);
        self.queue.push(claimed);
    }

    fn dispatch(&mut self, claimed: ClaimedTask) {
        if !self.registry.contains(&claimed.key) {
            let err = SchedulerError::resolution(&claimed.key.module, &claimed.key.name);
            self.drop_task(claimed, &err);
            return;
        }

        let arguments = match TaskArguments::from_json(&claimed.arguments) {
            Ok(arguments) => arguments,
            Err(e) => {
                self.drop_task(claimed, &e);
                return;
            }
        };

        if self.workers.contains(&claimed.hash) {
            LoopCounters::incr(&self.counters.duplicates_skipped);
            debug!(hash = claimed.hash.short(), "task already in flight, skipping");
            return;
        }

        let task = match self.registry.instantiate(&claimed.key, arguments) {
            Ok(task) => task,
            Err(e) => {
                self.drop_task(claimed, &e);
                return;
            }
        };

        match self.workers.launch(&claimed, task) {
            Ok(()) => {
                LoopCounters::incr(&self.counters.launched);
                self.counters.set_in_flight(self.workers.len());
                info!(hash = claimed.hash.short(), task = %claimed.key, "launched worker");
                self.record(&claimed.hash, &claimed.key, AuditAction::Launched, None);
            }
            Err(e) => {
                error!(task = %claimed.key, error = %e, "worker launch failed, releasing claim");
                self.record(&claimed.hash, &claimed.key, AuditAction::Released, Some(e.to_string()));
                self.cleanup(Cleanup::Release {
                    hash: claimed.hash,
                    kind: claimed.kind,
                    previous_executed_at: claimed.previous_executed_at,
                });
            }
        }
    }

    /// Discard a descriptor that can never run: delete a single, reset a
    /// daily so it comes back on its next due date.
    fn drop_task(&mut self, claimed: ClaimedTask, err: &SchedulerError) {
        LoopCounters::incr(&self.counters.dropped);
        error!(
            hash = claimed.hash.short(),
            task = %claimed.key,
            kind = ?claimed.kind,
            error = %err,
            "dropping task without execution"
        );
        self.record(&claimed.hash, &claimed.key, AuditAction::Dropped, Some(err.to_string()));
        self.cleanup(Cleanup::Finish {
            hash: claimed.hash,
            kind: claimed.kind,
        });
    }

    fn reap(&mut self) {
        for finished in self.workers.reap_finished() {
            self.finish(finished);
        }
        self.counters.set_in_flight(self.workers.len());
    }

    fn finish(&mut self, finished: FinishedTask) {
        let elapsed_ms = u64::try_from(finished.elapsed.as_millis()).unwrap_or(u64::MAX);
        match &finished.outcome {
            WorkerOutcome::Success => {
                LoopCounters::incr(&self.counters.succeeded);
                info!(hash = finished.hash.short(), task = %finished.key, elapsed_ms, "task completed");
                self.record(&finished.hash, &finished.key, AuditAction::Completed, None);
            }
            WorkerOutcome::Fault(detail) => {
                LoopCounters::incr(&self.counters.faulted);
                error!(
                    hash = finished.hash.short(),
                    task = %finished.key,
                    elapsed_ms,
                    fault = %detail,
                    "task faulted"
                );
                self.record(&finished.hash, &finished.key, AuditAction::Faulted, Some(detail.clone()));
            }
        }
        self.cleanup(Cleanup::Finish {
            hash: finished.hash,
            kind: finished.kind,
        });
    }

    fn cleanup(&mut self, cleanup: Cleanup) {
        if let Err(e) = self.apply(&cleanup) {
            warn!(error = %e, ?cleanup, "task cleanup failed, will retry");
            self.store_fault(&e, "cleanup");
            self.pending_cleanup.push(cleanup);
        }
    }

    fn retry_cleanups(&mut self) {
        for cleanup in mem::take(&mut self.pending_cleanup) {
            self.cleanup(cleanup);
        }
    }

    fn apply(&self, cleanup: &Cleanup) -> Result<(), SchedulerError> {
        let now = self.clock.now();
        match cleanup {
            Cleanup::Finish {
                hash,
                kind: TaskKind::Single,
            } => {
                self.store.delete_single(hash)?;
            }
            Cleanup::Finish {
                hash,
                kind: TaskKind::Daily,
            } => {
                self.store.release_daily(hash, now)?;
            }
            Cleanup::Release {
                hash,
                kind: TaskKind::Single,
                ..
            } => {
                self.store.release_single(hash, now)?;
            }
            Cleanup::Release {
                hash,
                kind: TaskKind::Daily,
                previous_executed_at,
            } => {
                self.store.set_daily_executed_at(hash, *previous_executed_at, now)?;
                self.store.release_daily(hash, now)?;
            }
        }
        Ok(())
    }

    fn store_fault(&self, err: &SchedulerError, during: &str) {
        if !err.is_connectivity() {
            error!(error = %err, during, "store operation failed");
            return;
        }
        LoopCounters::incr(&self.counters.connectivity_faults);
        warn!(error = %err, during, "store connectivity lost, resetting connection");
        if let Err(e) = self.store.reset_connection() {
            error!(error = %e, "store connection reset failed, retrying next iteration");
        }
    }

    fn record(&self, hash: &TaskHash, key: &TaskKey, action: AuditAction, detail: Option<String>) {
        if let Some(sink) = &self.audit {
            sink.record(build_audit_event(hash, key, action, detail));
        }
    }
}

/// Handle to a loop running on its control thread.
///
/// Dropping the handle requests a stop but does not wait; use
/// [`ExecutorHandle::stop_and_join`] to wait for in-flight workers.
pub struct ExecutorHandle {
    stop: StopSignal,
    counters: Arc<LoopCounters>,
    state: Arc<Mutex<LoopState>>,
    thread: Option<JoinHandle<LoopStats>>,
}

impl ExecutorHandle {
    /// Request a graceful stop without waiting.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Cloneable stop request, e.g. for a signal handler.
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Live statistics.
    #[must_use]
    pub fn stats(&self) -> LoopStats {
        self.counters.snapshot()
    }

    /// Current loop phase.
    #[must_use]
    pub fn state(&self) -> LoopState {
        *self.state.lock()
    }

    /// Whether the control thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the control thread to exit.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Execution`] if the control thread panicked.
    pub fn join(mut self) -> Result<LoopStats, SchedulerError> {
        let Some(thread) = self.thread.take() else {
            return Ok(self.counters.snapshot());
        };
        thread
            .join()
            .map_err(|_| SchedulerError::Execution("executor control thread panicked".into()))
    }

    /// Stop and wait: the control thread exits only after every in-flight
    /// worker has been reaped.
    ///
    /// # Errors
    ///
    /// See [`ExecutorHandle::join`].
    pub fn stop_and_join(self) -> Result<LoopStats, SchedulerError> {
        self.stop();
        self.join()
    }
}

impl Drop for ExecutorHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop.stop();
        }
    }
}
