//! SQLite task store.
//!
//! One connection guarded by a mutex. The connection is opened lazily and
//! can be dropped and re-opened through [`TaskStore::reset_connection`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::TaskStore;
use crate::core::{DailyTask, NewTask, Priority, SchedulerError, SingleTask, TaskDescriptor, TaskHash};

const DESCRIPTOR_COLUMNS: &str = "hash, name, module, arguments, priority, running, created, updated";

/// Task store persisted in a SQLite database file.
pub struct SqliteTaskStore {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteTaskStore {
    /// Open (or create) the database at `path` and apply migrations.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::StoreConnectivity`] if the file cannot be
    /// opened, or [`SchedulerError::Backend`] if a migration fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SchedulerError::StoreConnectivity(format!("{}: {e}", parent.display()))
                })?;
            }
        }
        let conn = Self::connect(&path)?;
        Ok(Self {
            path,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Database file backing this store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema statements, applied in order on every connect.
    #[must_use]
    pub fn migrations() -> &'static [&'static str] {
        &[
            r"
CREATE TABLE IF NOT EXISTS single_tasks (
    hash TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    module TEXT NOT NULL,
    arguments TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'normal',
    running INTEGER NOT NULL DEFAULT 0,
    created TEXT NOT NULL,
    updated TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_single_tasks_pending ON single_tasks (running, created);
",
            r"
CREATE TABLE IF NOT EXISTS daily_tasks (
    hash TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    module TEXT NOT NULL,
    arguments TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'normal',
    running INTEGER NOT NULL DEFAULT 0,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    executed_at TEXT NULL,
    enabled INTEGER NOT NULL DEFAULT 1
);
",
            r"
CREATE TABLE IF NOT EXISTS task_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
",
        ]
    }

    fn connect(path: &Path) -> Result<Connection, SchedulerError> {
        let conn = Connection::open(path).map_err(classify)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(classify)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(classify)?;
        for migration in Self::migrations() {
            conn.execute_batch(migration)
                .map_err(|e| SchedulerError::Backend(format!("migration failed: {e}")))?;
        }
        tracing::debug!(path = %path.display(), "sqlite task store connected");
        Ok(conn)
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, SchedulerError> {
        let mut guard = self.conn.lock();
        if guard.is_none() {
            *guard = Some(Self::connect(&self.path)?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(SchedulerError::StoreConnectivity(
                "sqlite connection unavailable".into(),
            ));
        };
        f(conn).map_err(classify)
    }
}

/// Map driver errors: anything that means "the database is not reachable
/// right now" is a connectivity fault, the rest are backend errors.
fn classify(err: rusqlite::Error) -> SchedulerError {
    match err.sqlite_error_code() {
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure,
        ) => SchedulerError::StoreConnectivity(err.to_string()),
        _ => SchedulerError::Backend(err.to_string()),
    }
}

fn descriptor_from_row(row: &Row<'_>) -> rusqlite::Result<TaskDescriptor> {
    let priority: String = row.get(4)?;
    let priority = priority
        .parse::<Priority>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(TaskDescriptor {
        hash: TaskHash::from_hex(row.get::<_, String>(0)?),
        name: row.get(1)?,
        module: row.get(2)?,
        arguments: row.get(3)?,
        priority,
        running: row.get(5)?,
        created: row.get(6)?,
        updated: row.get(7)?,
    })
}

fn single_from_row(row: &Row<'_>) -> rusqlite::Result<SingleTask> {
    Ok(SingleTask {
        descriptor: descriptor_from_row(row)?,
    })
}

fn daily_from_row(row: &Row<'_>) -> rusqlite::Result<DailyTask> {
    Ok(DailyTask {
        descriptor: descriptor_from_row(row)?,
        executed_at: row.get(8)?,
        enabled: row.get(9)?,
    })
}

fn single_select(filter: &str) -> String {
    format!("SELECT {DESCRIPTOR_COLUMNS} FROM single_tasks {filter}")
}

fn daily_select(filter: &str) -> String {
    format!("SELECT {DESCRIPTOR_COLUMNS}, executed_at, enabled FROM daily_tasks {filter}")
}

impl TaskStore for SqliteTaskStore {
    fn get_or_create_single(
        &self,
        task: &NewTask,
        now: NaiveDateTime,
    ) -> Result<(SingleTask, bool), SchedulerError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO single_tasks
                    (hash, name, module, arguments, priority, running, created, updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
                params![
                    task.hash.as_str(),
                    task.key.name,
                    task.key.module,
                    task.arguments,
                    task.priority.as_str(),
                    now
                ],
            )?;
            let row = tx.query_row(
                &single_select("WHERE hash = ?1"),
                [task.hash.as_str()],
                single_from_row,
            )?;
            tx.commit()?;
            Ok((row, inserted == 1))
        })
    }

    fn get_or_create_daily(
        &self,
        task: &NewTask,
        now: NaiveDateTime,
    ) -> Result<(DailyTask, bool), SchedulerError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO daily_tasks
                    (hash, name, module, arguments, priority, running, created, updated,
                     executed_at, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6, NULL, 1)",
                params![
                    task.hash.as_str(),
                    task.key.name,
                    task.key.module,
                    task.arguments,
                    task.priority.as_str(),
                    now
                ],
            )?;
            let row = tx.query_row(
                &daily_select("WHERE hash = ?1"),
                [task.hash.as_str()],
                daily_from_row,
            )?;
            tx.commit()?;
            Ok((row, inserted == 1))
        })
    }

    fn pending_singles(&self) -> Result<Vec<SingleTask>, SchedulerError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&single_select("WHERE running = 0 ORDER BY created, rowid"))?;
            let rows = stmt.query_map([], single_from_row)?;
            rows.collect()
        })
    }

    fn daily_tasks(&self) -> Result<Vec<DailyTask>, SchedulerError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&daily_select("ORDER BY created, rowid"))?;
            let rows = stmt.query_map([], daily_from_row)?;
            rows.collect()
        })
    }

    fn single_count(&self) -> Result<usize, SchedulerError> {
        let count: i64 = self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM single_tasks", [], |row| row.get(0))
        })?;
        usize::try_from(count).map_err(|e| SchedulerError::Backend(e.to_string()))
    }

    fn single(&self, hash: &TaskHash) -> Result<Option<SingleTask>, SchedulerError> {
        self.with_conn(|conn| {
            conn.query_row(&single_select("WHERE hash = ?1"), [hash.as_str()], single_from_row)
                .optional()
        })
    }

    fn daily(&self, hash: &TaskHash) -> Result<Option<DailyTask>, SchedulerError> {
        self.with_conn(|conn| {
            conn.query_row(&daily_select("WHERE hash = ?1"), [hash.as_str()], daily_from_row)
                .optional()
        })
    }

    fn claim_single(&self, hash: &TaskHash, now: NaiveDateTime) -> Result<bool, SchedulerError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE single_tasks SET running = 1, updated = ?2 WHERE hash = ?1 AND running = 0",
                params![hash.as_str(), now],
            )?;
            Ok(changed == 1)
        })
    }

    fn claim_daily(&self, hash: &TaskHash, now: NaiveDateTime) -> Result<bool, SchedulerError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE daily_tasks SET running = 1, executed_at = ?2, updated = ?3
                 WHERE hash = ?1 AND running = 0 AND enabled = 1",
                params![hash.as_str(), now.date(), now],
            )?;
            Ok(changed == 1)
        })
    }

    fn release_single(&self, hash: &TaskHash, now: NaiveDateTime) -> Result<bool, SchedulerError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE single_tasks SET running = 0, updated = ?2 WHERE hash = ?1",
                params![hash.as_str(), now],
            )?;
            Ok(changed == 1)
        })
    }

    fn delete_single(&self, hash: &TaskHash) -> Result<bool, SchedulerError> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM single_tasks WHERE hash = ?1", [hash.as_str()])?;
            Ok(changed == 1)
        })
    }

    fn release_daily(&self, hash: &TaskHash, now: NaiveDateTime) -> Result<bool, SchedulerError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE daily_tasks SET running = 0, updated = ?2 WHERE hash = ?1",
                params![hash.as_str(), now],
            )?;
            Ok(changed == 1)
        })
    }

    fn set_daily_executed_at(
        &self,
        hash: &TaskHash,
        executed_at: Option<NaiveDate>,
        now: NaiveDateTime,
    ) -> Result<bool, SchedulerError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE daily_tasks SET executed_at = ?2, updated = ?3 WHERE hash = ?1",
                params![hash.as_str(), executed_at, now],
            )?;
            Ok(changed == 1)
        })
    }

    fn set_daily_enabled(
        &self,
        hash: &TaskHash,
        enabled: bool,
        now: NaiveDateTime,
    ) -> Result<bool, SchedulerError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE daily_tasks SET enabled = ?2, updated = ?3 WHERE hash = ?1",
                params![hash.as_str(), enabled, now],
            )?;
            Ok(changed == 1)
        })
    }

    fn release_stale_claims(&self, now: NaiveDateTime) -> Result<usize, SchedulerError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let singles = tx.execute(
                "UPDATE single_tasks SET running = 0, updated = ?1 WHERE running = 1",
                [now],
            )?;
            let dailies = tx.execute(
                "UPDATE daily_tasks SET running = 0, updated = ?1 WHERE running = 1",
                [now],
            )?;
            tx.commit()?;
            Ok(singles + dailies)
        })
    }

    fn setting(&self, key: &str) -> Result<Option<String>, SchedulerError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM task_settings WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()
        })
    }

    fn put_setting(&self, key: &str, value: &str) -> Result<(), SchedulerError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO task_settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, value],
            )?;
            Ok(())
        })
    }

    fn reset_connection(&self) -> Result<(), SchedulerError> {
        let mut guard = self.conn.lock();
        guard.take();
        tracing::warn!(path = %self.path.display(), "resetting sqlite task store connection");
        *guard = Some(Self::connect(&self.path)?);
        Ok(())
    }
}
