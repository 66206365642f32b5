//! In-memory task store for development/testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;

use super::TaskStore;
use crate::core::{DailyTask, NewTask, SchedulerError, SingleTask, TaskDescriptor, TaskHash};

#[derive(Default)]
struct Tables {
    singles: Vec<SingleTask>,
    dailies: Vec<DailyTask>,
    settings: HashMap<String, String>,
}

impl Tables {
    fn single_mut(&mut self, hash: &TaskHash) -> Option<&mut SingleTask> {
        self.singles.iter_mut().find(|t| &t.descriptor.hash == hash)
    }

    fn daily_mut(&mut self, hash: &TaskHash) -> Option<&mut DailyTask> {
        self.dailies.iter_mut().find(|t| &t.descriptor.hash == hash)
    }
}

/// Task store kept in process memory, in insertion order.
///
/// Rows do not survive a restart. Connectivity faults can be injected to
/// exercise the executor loop's recovery path.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tables: Mutex<Tables>,
    pending_faults: AtomicUsize,
    resets: AtomicUsize,
}

impl InMemoryTaskStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` store calls fail with [`SchedulerError::StoreConnectivity`].
    pub fn inject_connectivity_faults(&self, n: usize) {
        self.pending_faults.store(n, Ordering::SeqCst);
    }

    /// How many times [`TaskStore::reset_connection`] was called.
    #[must_use]
    pub fn connection_resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    fn check_connection(&self) -> Result<(), SchedulerError> {
        let faulted = self
            .pending_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if faulted {
            return Err(SchedulerError::StoreConnectivity(
                "in-memory store: injected connectivity fault".into(),
            ));
        }
        Ok(())
    }
}

impl TaskStore for InMemoryTaskStore {
    fn get_or_create_single(
        &self,
        task: &NewTask,
        now: NaiveDateTime,
    ) -> Result<(SingleTask, bool), SchedulerError> {
        self.check_connection()?;
        let mut tables = self.tables.lock();
        if let Some(existing) = tables.single_mut(&task.hash) {
            return Ok((existing.clone(), false));
        }
        let row = SingleTask {
            descriptor: TaskDescriptor::from_new(task, now),
        };
        tables.singles.push(row.clone());
        Ok((row, true))
    }

    fn get_or_create_daily(
        &self,
        task: &NewTask,
        now: NaiveDateTime,
    ) -> Result<(DailyTask, bool), SchedulerError> {
        self.check_connection()?;
        let mut tables = self.tables.lock();
        if let Some(existing) = tables.daily_mut(&task.hash) {
            return Ok((existing.clone(), false));
        }
        let row = DailyTask {
            descriptor: TaskDescriptor::from_new(task, now),
            executed_at: None,
            enabled: true,
        };
        tables.dailies.push(row.clone());
        Ok((row, true))
    }

    fn pending_singles(&self) -> Result<Vec<SingleTask>, SchedulerError> {
        self.check_connection()?;
        Ok(self
            .tables
            .lock()
            .singles
            .iter()
            .filter(|t| !t.descriptor.running)
            .cloned()
            .collect())
    }

    fn daily_tasks(&self) -> Result<Vec<DailyTask>, SchedulerError> {
        self.check_connection()?;
        Ok(self.tables.lock().dailies.clone())
    }

    fn single_count(&self) -> Result<usize, SchedulerError> {
        self.check_connection()?;
        Ok(self.tables.lock().singles.len())
    }

    fn single(&self, hash: &TaskHash) -> Result<Option<SingleTask>, SchedulerError> {
        self.check_connection()?;
        Ok(self.tables.lock().single_mut(hash).cloned())
    }

    fn daily(&self, hash: &TaskHash) -> Result<Option<DailyTask>, SchedulerError> {
        self.check_connection()?;
        Ok(self.tables.lock().daily_mut(hash).cloned())
    }

    fn claim_single(&self, hash: &TaskHash, now: NaiveDateTime) -> Result<bool, SchedulerError> {
        self.check_connection()?;
        let mut tables = self.tables.lock();
        match tables.single_mut(hash) {
            Some(task) if !task.descriptor.running => {
                task.descriptor.running = true;
                task.descriptor.updated = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn claim_daily(&self, hash: &TaskHash, now: NaiveDateTime) -> Result<bool, SchedulerError> {
        self.check_connection()?;
        let mut tables = self.tables.lock();
        match tables.daily_mut(hash) {
            Some(task) if task.enabled && !task.descriptor.running => {
                task.descriptor.running = true;
                task.descriptor.updated = now;
                task.executed_at = Some(now.date());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn release_single(&self, hash: &TaskHash, now: NaiveDateTime) -> Result<bool, SchedulerError> {
        self.check_connection()?;
        let mut tables = self.tables.lock();
        Ok(tables.single_mut(hash).is_some_and(|task| {
            task.descriptor.running = false;
            task.descriptor.updated = now;
            true
        }))
    }

    fn delete_single(&self, hash: &TaskHash) -> Result<bool, SchedulerError> {
        self.check_connection()?;
        let mut tables = self.tables.lock();
        let before = tables.singles.len();
        tables.singles.retain(|t| &t.descriptor.hash != hash);
        Ok(tables.singles.len() < before)
    }

    fn release_daily(&self, hash: &TaskHash, now: NaiveDateTime) -> Result<bool, SchedulerError> {
        self.check_connection()?;
        let mut tables = self.tables.lock();
        Ok(tables.daily_mut(hash).is_some_and(|task| {
            task.descriptor.running = false;
            task.descriptor.updated = now;
            true
        }))
    }

    fn set_daily_executed_at(
        &self,
        hash: &TaskHash,
        executed_at: Option<NaiveDate>,
        now: NaiveDateTime,
    ) -> Result<bool, SchedulerError> {
        self.check_connection()?;
        let mut tables = self.tables.lock();
        Ok(tables.daily_mut(hash).is_some_and(|task| {
            task.executed_at = executed_at;
            task.descriptor.updated = now;
            true
        }))
    }

    fn set_daily_enabled(
        &self,
        hash: &TaskHash,
        enabled: bool,
        now: NaiveDateTime,
    ) -> Result<bool, SchedulerError> {
        self.check_connection()?;
        let mut tables = self.tables.lock();
        Ok(tables.daily_mut(hash).is_some_and(|task| {
            task.enabled = enabled;
            task.descriptor.updated = now;
            true
        }))
    }

    fn release_stale_claims(&self, now: NaiveDateTime) -> Result<usize, SchedulerError> {
        self.check_connection()?;
        let mut guard = self.tables.lock();
        let tables = &mut *guard;
        let mut released = 0;
        let descriptors = tables
            .singles
            .iter_mut()
            .map(|t| &mut t.descriptor)
            .chain(tables.dailies.iter_mut().map(|t| &mut t.descriptor));
        for descriptor in descriptors.filter(|d| d.running) {
            descriptor.running = false;
            descriptor.updated = now;
            released += 1;
        }
        Ok(released)
    }

    fn setting(&self, key: &str) -> Result<Option<String>, SchedulerError> {
        self.check_connection()?;
        Ok(self.tables.lock().settings.get(key).cloned())
    }

    fn put_setting(&self, key: &str, value: &str) -> Result<(), SchedulerError> {
        self.check_connection()?;
        self.tables
            .lock()
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn reset_connection(&self) -> Result<(), SchedulerError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
