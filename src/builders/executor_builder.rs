//! Builders to construct the store and executor loop from configuration.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{parse_daily_time, ExecutorConfig, StoreBackendConfig};
use crate::core::{AuditSink, LoopSettings, SchedulerError, TaskLoop, TaskRegistry};
use crate::infra::store::{InMemoryTaskStore, SqliteTaskStore, TaskStore};
use crate::util::clock::{Clock, SystemClock};

/// Persisted override for the concurrency ceiling.
pub const SETTING_MAX_WORKERS: &str = "task_manager.max_workers";
/// Persisted override for the daily execution time.
pub const SETTING_DAILY_TIME: &str = "task_manager.daily_execution_time";

/// Open the configured store backend.
///
/// # Errors
///
/// Propagates backend open failures.
pub fn build_store(cfg: &StoreBackendConfig) -> Result<Arc<dyn TaskStore>, SchedulerError> {
    match cfg {
        StoreBackendConfig::InMemory => Ok(Arc::new(InMemoryTaskStore::new())),
        StoreBackendConfig::Sqlite { path } => Ok(Arc::new(SqliteTaskStore::open(path)?)),
    }
}

/// Assembles a [`TaskLoop`] from configuration, a registry and a store.
pub struct ExecutorBuilder {
    config: ExecutorConfig,
    registry: TaskRegistry,
    store: Option<Arc<dyn TaskStore>>,
    clock: Arc<dyn Clock>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl ExecutorBuilder {
    /// Start from `config` with an empty registry and the system clock.
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            registry: TaskRegistry::new(),
            store: None,
            clock: Arc::new(SystemClock),
            audit: None,
        }
    }

    /// Units of work the loop can resolve.
    #[must_use]
    pub fn registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use an already opened store instead of the configured backend.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the wall clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report lifecycle events to `sink`.
    #[must_use]
    pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Validate, open the store, apply persisted settings, release stale
    /// claims if configured, and return the loop with its store.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::InvalidConfig`] if validation fails.
    /// - Store errors from opening, reading settings or releasing claims.
    pub fn build(self) -> Result<(TaskLoop, Arc<dyn TaskStore>), SchedulerError> {
        self.config.validate().map_err(SchedulerError::InvalidConfig)?;
        let store = match self.store {
            Some(store) => store,
            None => build_store(&self.config.store)?,
        };

        let settings = resolve_settings(&self.config, store.as_ref())?;
        if self.config.release_stale_claims_on_start {
            let released = store.release_stale_claims(self.clock.now())?;
            if released > 0 {
                warn!(released, "released claims left by a previous run");
            }
        }

        info!(
            max_workers = settings.max_workers,
            daily_execution_time = %settings.daily_execution_time,
            registered = self.registry.len(),
            "executor built"
        );
        let mut task_loop = TaskLoop::new(Arc::clone(&store), self.registry, settings)
            .with_clock(self.clock);
        if let Some(sink) = self.audit {
            task_loop = task_loop.with_audit(sink);
        }
        Ok((task_loop, store))
    }
}

/// Loop settings from config, overridden by values persisted in the store.
fn resolve_settings(
    cfg: &ExecutorConfig,
    store: &dyn TaskStore,
) -> Result<LoopSettings, SchedulerError> {
    let mut settings = LoopSettings {
        max_workers: cfg.max_workers,
        daily_execution_time: cfg.daily_time().map_err(SchedulerError::InvalidConfig)?,
        poll_wait: cfg.poll_wait(),
        saturated_sleep: cfg.saturated_sleep(),
    };

    if let Some(raw) = store.setting(SETTING_MAX_WORKERS)? {
        match raw.trim().parse::<usize>() {
            Ok(n) if n > 0 => settings.max_workers = n,
            _ => warn!(key = SETTING_MAX_WORKERS, value = %raw, "ignoring invalid persisted setting"),
        }
    }
    if let Some(raw) = store.setting(SETTING_DAILY_TIME)? {
        match parse_daily_time(&raw) {
            Ok(time) => settings.daily_execution_time = time,
            Err(e) => warn!(key = SETTING_DAILY_TIME, error = %e, "ignoring invalid persisted setting"),
        }
    }
    Ok(settings)
}
