//! Submission and administration API used by application code.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::core::{
    build_audit_event, AuditAction, AuditSink, SchedulerError, TaskHash, TaskKey, TaskRequest,
};
use crate::infra::store::TaskStore;
use crate::util::clock::{Clock, SystemClock};

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Hash of the stored row.
    pub hash: TaskHash,
    /// `false` when an equivalent row already existed.
    pub created: bool,
}

/// Front door to the task store for producers and administrators.
#[derive(Clone)]
pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl TaskManager {
    /// Create a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            audit: None,
        }
    }

    /// Replace the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report submissions to `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Queue a single task. Fire-and-forget: failures are logged, and a
    /// request equal to a pending one is absorbed by it.
    pub fn submit(&self, request: TaskRequest) {
        let task = request.key().to_string();
        if let Err(e) = self.try_submit(request) {
            error!(task = %task, error = %e, "task submission rejected");
        }
    }

    /// Queue a single task and report whether a new row was created.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::Serialization`] if an argument was not
    ///   representable; nothing is written.
    /// - Store errors from the get-or-create.
    pub fn try_submit(&self, request: TaskRequest) -> Result<SubmitReceipt, SchedulerError> {
        let new = request.into_new_task()?;
        let (row, created) = self.store.get_or_create_single(&new, self.clock.now())?;
        let hash = row.descriptor.hash;
        debug!(hash = hash.short(), task = %new.key, created, "task submitted");
        self.record(&hash, &new.key, created);
        Ok(SubmitReceipt { hash, created })
    }

    /// Register a recurring daily task (enabled, never executed).
    /// Registering the same task again returns the existing row.
    ///
    /// # Errors
    ///
    /// Same as [`TaskManager::try_submit`].
    pub fn register_daily(&self, request: TaskRequest) -> Result<SubmitReceipt, SchedulerError> {
        let new = request.into_new_task()?;
        let (row, created) = self.store.get_or_create_daily(&new, self.clock.now())?;
        let hash = row.descriptor.hash;
        if created {
            info!(hash = hash.short(), task = %new.key, "daily task registered");
        }
        self.record(&hash, &new.key, created);
        Ok(SubmitReceipt { hash, created })
    }

    /// Enable or disable a daily task. `false` if no such task exists.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub fn set_daily_enabled(&self, hash: &TaskHash, enabled: bool) -> Result<bool, SchedulerError> {
        let found = self.store.set_daily_enabled(hash, enabled, self.clock.now())?;
        info!(hash = hash.short(), enabled, found, "daily task toggled");
        Ok(found)
    }

    /// Make a daily task due again today by moving `executed_at` to yesterday.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub fn force_daily(&self, hash: &TaskHash) -> Result<bool, SchedulerError> {
        let now = self.clock.now();
        let yesterday = now
            .date()
            .pred_opt()
            .ok_or_else(|| SchedulerError::Backend(format!("no date before {}", now.date())))?;
        let found = self.store.set_daily_executed_at(hash, Some(yesterday), now)?;
        info!(hash = hash.short(), found, "daily task forced");
        Ok(found)
    }

    /// Clear every claim. For use when no executor is running.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub fn release_stale_claims(&self) -> Result<usize, SchedulerError> {
        self.store.release_stale_claims(self.clock.now())
    }

    fn record(&self, hash: &TaskHash, key: &TaskKey, created: bool) {
        if let Some(sink) = &self.audit {
            let detail = (!created).then(|| "deduplicated".to_string());
            sink.record(build_audit_event(hash, key, AuditAction::Submitted, detail));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InMemoryAuditSink, Priority};
    use crate::infra::store::InMemoryTaskStore;
    use crate::util::clock::FixedClock;
    use chrono::NaiveDate;

    fn manager() -> (TaskManager, Arc<InMemoryTaskStore>, Arc<FixedClock>) {
        let store = Arc::new(InMemoryTaskStore::new());
        let clock = Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        ));
        let manager = TaskManager::new(store.clone()).with_clock(clock.clone());
        (manager, store, clock)
    }

    #[test]
    fn duplicate_submission_is_absorbed() {
        let (manager, store, _) = manager();
        let sink = Arc::new(InMemoryAuditSink::new(16));
        let manager = manager.with_audit(sink.clone());

        let first = manager
            .try_submit(TaskRequest::new("mail", "send").kwarg("to", "ops"))
            .unwrap();
        let second = manager
            .try_submit(
                TaskRequest::new("mail", "send")
                    .kwarg("to", "ops")
                    .priority(Priority::High),
            )
            .unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.hash, second.hash);
        assert_eq!(store.single_count().unwrap(), 1);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].detail.as_deref(), Some("deduplicated"));
    }

    #[test]
    fn force_daily_moves_execution_to_yesterday() {
        let (manager, store, _) = manager();
        let receipt = manager
            .register_daily(TaskRequest::new("report", "nightly"))
            .unwrap();
        assert!(manager.force_daily(&receipt.hash).unwrap());
        assert_eq!(
            store.daily(&receipt.hash).unwrap().unwrap().executed_at,
            NaiveDate::from_ymd_opt(2024, 5, 31)
        );

        assert!(manager.set_daily_enabled(&receipt.hash, false).unwrap());
        assert!(!store.daily(&receipt.hash).unwrap().unwrap().enabled);
        assert!(!manager.force_daily(&TaskHash::from_hex("nope")).unwrap());
    }

    #[test]
    fn submit_swallows_store_faults() {
        let (manager, store, _) = manager();
        store.inject_connectivity_faults(1);
        manager.submit(TaskRequest::new("mail", "send"));
        assert_eq!(store.single_count().unwrap(), 0);
        manager.submit(TaskRequest::new("mail", "send"));
        assert_eq!(store.single_count().unwrap(), 1);
    }
}
