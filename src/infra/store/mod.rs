//! Durable task record store.
//!
//! The executor loop needs only single-row operations from a store. Claims
//! are compare-and-set on the `running` flag, so the store alone decides
//! which caller wins a race for the same row.

pub mod memory;
pub mod sqlite;

use chrono::{NaiveDate, NaiveDateTime};

use crate::core::{DailyTask, NewTask, SchedulerError, SingleTask, TaskHash};

pub use memory::InMemoryTaskStore;
pub use sqlite::SqliteTaskStore;

/// Abstraction for task record backends.
///
/// Every `now` argument stamps the row's `updated` (and, on insert,
/// `created`) column.
pub trait TaskStore: Send + Sync {
    /// Insert a single task unless a row with the same hash exists.
    /// Returns the stored row and whether it was created by this call.
    fn get_or_create_single(
        &self,
        task: &NewTask,
        now: NaiveDateTime,
    ) -> Result<(SingleTask, bool), SchedulerError>;

    /// Insert a daily task (enabled, never executed) unless it exists.
    fn get_or_create_daily(
        &self,
        task: &NewTask,
        now: NaiveDateTime,
    ) -> Result<(DailyTask, bool), SchedulerError>;

    /// Single tasks with `running = false`, oldest first.
    fn pending_singles(&self) -> Result<Vec<SingleTask>, SchedulerError>;

    /// All daily tasks, oldest first.
    fn daily_tasks(&self) -> Result<Vec<DailyTask>, SchedulerError>;

    /// Number of stored single tasks, claimed or not.
    fn single_count(&self) -> Result<usize, SchedulerError>;

    /// Look up a single task.
    fn single(&self, hash: &TaskHash) -> Result<Option<SingleTask>, SchedulerError>;

    /// Look up a daily task.
    fn daily(&self, hash: &TaskHash) -> Result<Option<DailyTask>, SchedulerError>;

    /// Set `running` on an unclaimed single task. `false` if the claim was lost.
    fn claim_single(&self, hash: &TaskHash, now: NaiveDateTime) -> Result<bool, SchedulerError>;

    /// Set `running` and `executed_at = now.date()` on an unclaimed, enabled
    /// daily task. `false` if the claim was lost.
    fn claim_daily(&self, hash: &TaskHash, now: NaiveDateTime) -> Result<bool, SchedulerError>;

    /// Give a claimed single task back (`running = false`).
    fn release_single(&self, hash: &TaskHash, now: NaiveDateTime) -> Result<bool, SchedulerError>;

    /// Remove a single task.
    fn delete_single(&self, hash: &TaskHash) -> Result<bool, SchedulerError>;

    /// Reset a daily task after its run (`running = false`).
    fn release_daily(&self, hash: &TaskHash, now: NaiveDateTime) -> Result<bool, SchedulerError>;

    /// Overwrite `executed_at` of a daily task.
    fn set_daily_executed_at(
        &self,
        hash: &TaskHash,
        executed_at: Option<NaiveDate>,
        now: NaiveDateTime,
    ) -> Result<bool, SchedulerError>;

    /// Enable or disable a daily task.
    fn set_daily_enabled(
        &self,
        hash: &TaskHash,
        enabled: bool,
        now: NaiveDateTime,
    ) -> Result<bool, SchedulerError>;

    /// Clear every `running` flag. Returns the number of rows touched.
    fn release_stale_claims(&self, now: NaiveDateTime) -> Result<usize, SchedulerError>;

    /// Read a persisted configuration value.
    fn setting(&self, key: &str) -> Result<Option<String>, SchedulerError>;

    /// Write a persisted configuration value.
    fn put_setting(&self, key: &str, value: &str) -> Result<(), SchedulerError>;

    /// Drop and re-establish the backend connection after a connectivity fault.
    fn reset_connection(&self) -> Result<(), SchedulerError> {
        Ok(())
    }
}
