//! Executor configuration: concurrency ceiling, daily gate time, timings
//! and store backend selection.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Environment variable naming a JSON config file.
pub const ENV_CONFIG: &str = "TASK_MANAGER_CONFIG";
/// Environment override for `max_workers`.
pub const ENV_MAX_WORKERS: &str = "TASK_MANAGER_MAX_WORKERS";
/// Environment override for `daily_execution_time`.
pub const ENV_DAILY_TIME: &str = "TASK_MANAGER_DAILY_TIME";
/// Environment override that switches the store to SQLite at this path.
pub const ENV_DB: &str = "TASK_MANAGER_DB";

/// Store backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-memory store for development/testing.
    #[default]
    InMemory,
    /// SQLite database file.
    Sqlite {
        /// Database file path; parent directories are created.
        path: PathBuf,
    },
}

/// Executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Concurrency ceiling on in-flight workers.
    pub max_workers: usize,
    /// `HH:MM[:SS]` time of day from which daily tasks are due.
    pub daily_execution_time: String,
    /// Bounded wait on an empty dispatch queue, in milliseconds.
    pub poll_wait_ms: u64,
    /// Back-off while saturated, in milliseconds.
    pub saturated_sleep_ms: u64,
    /// Clear claims left behind by a previous process on start.
    pub release_stale_claims_on_start: bool,
    /// Store backend.
    pub store: StoreBackendConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            daily_execution_time: "00:00".into(),
            poll_wait_ms: 1000,
            saturated_sleep_ms: 100,
            release_stale_claims_on_start: true,
            store: StoreBackendConfig::InMemory,
        }
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
///
/// # Errors
///
/// Returns a description of the rejected input.
pub fn parse_daily_time(input: &str) -> Result<NaiveTime, String> {
    let input = input.trim();
    NaiveTime::parse_from_str(input, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M:%S"))
        .map_err(|e| format!("daily_execution_time `{input}` is not HH:MM[:SS]: {e}"))
}

impl ExecutorConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".into());
        }
        if self.poll_wait_ms == 0 {
            return Err("poll_wait_ms must be greater than 0".into());
        }
        if self.saturated_sleep_ms == 0 {
            return Err("saturated_sleep_ms must be greater than 0".into());
        }
        if let StoreBackendConfig::Sqlite { path } = &self.store {
            if path.as_os_str().is_empty() {
                return Err("sqlite store path must not be empty".into());
            }
        }
        parse_daily_time(&self.daily_execution_time)?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env`, then the process environment. See [`ExecutorConfig::from_lookup`].
    ///
    /// # Errors
    ///
    /// Returns a read, parse or validation message.
    pub fn from_env() -> Result<Self, String> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(format!(".env: {e}"));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from variables resolved by `lookup`: the JSON file
    /// named by `TASK_MANAGER_CONFIG` (defaults if unset), then the
    /// `TASK_MANAGER_MAX_WORKERS`, `TASK_MANAGER_DAILY_TIME` and
    /// `TASK_MANAGER_DB` overrides.
    ///
    /// # Errors
    ///
    /// Returns a read, parse or validation message.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut cfg = match lookup(ENV_CONFIG) {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| format!("reading {ENV_CONFIG}={path}: {e}"))?;
                serde_json::from_str(&raw).map_err(|e| format!("parse error in {path}: {e}"))?
            }
            None => Self::default(),
        };
        if let Some(raw) = lookup(ENV_MAX_WORKERS) {
            cfg.max_workers = raw
                .trim()
                .parse()
                .map_err(|e| format!("{ENV_MAX_WORKERS}=`{raw}`: {e}"))?;
        }
        if let Some(raw) = lookup(ENV_DAILY_TIME) {
            cfg.daily_execution_time = raw;
        }
        if let Some(path) = lookup(ENV_DB) {
            cfg.store = StoreBackendConfig::Sqlite { path: path.into() };
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parsed `daily_execution_time`.
    ///
    /// # Errors
    ///
    /// See [`parse_daily_time`].
    pub fn daily_time(&self) -> Result<NaiveTime, String> {
        parse_daily_time(&self.daily_execution_time)
    }

    /// Bounded pop wait.
    #[must_use]
    pub const fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms)
    }

    /// Saturated back-off.
    #[must_use]
    pub const fn saturated_sleep(&self) -> Duration {
        Duration::from_millis(self.saturated_sleep_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let cfg = ExecutorConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.daily_time().unwrap(), NaiveTime::MIN);
        assert_eq!(cfg.poll_wait(), Duration::from_secs(1));
    }

    #[test]
    fn parses_partial_json() {
        let cfg = ExecutorConfig::from_json_str(
            r#"{"max_workers": 2, "daily_execution_time": "08:30:15",
                "store": {"kind": "sqlite", "path": "/var/lib/tasks.db"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.max_workers, 2);
        assert_eq!(cfg.daily_time().unwrap(), NaiveTime::from_hms_opt(8, 30, 15).unwrap());
        assert_eq!(
            cfg.store,
            StoreBackendConfig::Sqlite {
                path: "/var/lib/tasks.db".into()
            }
        );
        assert_eq!(cfg.saturated_sleep_ms, 100);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(ExecutorConfig::from_json_str(r#"{"max_workers": 0}"#).is_err());
        assert!(ExecutorConfig::from_json_str(r#"{"daily_execution_time": "25:00"}"#).is_err());
        assert!(ExecutorConfig::from_json_str(r#"{"poll_wait_ms": 0}"#).is_err());
        assert!(ExecutorConfig::from_json_str(r#"{"store": {"kind": "postgres"}}"#).is_err());
        assert!(ExecutorConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn environment_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_MAX_WORKERS, "8"),
            (ENV_DAILY_TIME, "06:00"),
            (ENV_DB, "/tmp/tasks.db"),
        ]);
        let cfg =
            ExecutorConfig::from_lookup(|key| vars.get(key).map(ToString::to_string)).unwrap();
        assert_eq!(cfg.max_workers, 8);
        assert_eq!(cfg.daily_execution_time, "06:00");
        assert!(matches!(cfg.store, StoreBackendConfig::Sqlite { .. }));

        let bad = ExecutorConfig::from_lookup(|key| (key == ENV_MAX_WORKERS).then(|| "many".into()));
        assert!(bad.is_err());
    }
}
