//! SQLite-backed store.
//!
//! Tasks live in `tasks`, pending mutations in `sync_queue`. Queue order is
//! the autoincrement `seq` column, so it always matches insertion order even
//! if the wall clock moves backwards.

use super::{MutationQueue, StoreView, SyncStore, TaskStore};
use crate::error::{StoreError, StoreResult};
use crate::model::{QueuedMutation, SyncStatus, Task};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Instant;
use tasksync_protocol::{Operation, TaskPayload};
use tracing::{debug, info};

struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/0001_init.sql"),
}];

const TASK_COLUMNS: &str = "id, server_id, title, description, completed, created_at, \
     updated_at, is_deleted, sync_status, last_synced_at";

const QUEUE_COLUMNS: &str = "id, task_id, operation, data, retry_count, created_at";

/// A task store and mutation queue persisted in SQLite.
///
/// One connection is shared behind a mutex; each trait call is a short
/// critical section, so enqueues interleave freely with a sync pass that is
/// waiting on the network.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a database file and applies pending migrations.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let started_at = Instant::now();
        let conn = Connection::open(path)?;
        let store = Self::bootstrap(conn)?;
        info!(
            path = %path.display(),
            duration_ms = started_at.elapsed().as_millis() as u64,
            "opened task database"
        );
        Ok(store)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(mut conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        // In-memory databases keep journal_mode=memory and report it back.
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Returns the schema version recorded in the database.
    pub fn schema_version(&self) -> StoreResult<u32> {
        current_user_version(&self.conn.lock())
    }
}

fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

fn current_user_version(conn: &Connection) -> StoreResult<u32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

fn apply_migrations(conn: &mut Connection) -> StoreResult<()> {
    let current = current_user_version(conn)?;
    let latest = latest_version();

    if current > latest {
        return Err(StoreError::UnsupportedSchema {
            found: current,
            latest,
        });
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        debug!(version = migration.version, "applied migration");
    }
    tx.commit()?;
    Ok(())
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(table: &'static str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(table, format!("bad timestamp {value:?}: {e}")))
}

/// Raw `tasks` row before conversion.
struct TaskRow {
    id: String,
    server_id: Option<String>,
    title: String,
    description: Option<String>,
    completed: bool,
    created_at: String,
    updated_at: String,
    is_deleted: bool,
    sync_status: String,
    last_synced_at: Option<String>,
}

impl TaskRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            server_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            completed: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            is_deleted: row.get(7)?,
            sync_status: row.get(8)?,
            last_synced_at: row.get(9)?,
        })
    }

    fn into_task(self) -> StoreResult<Task> {
        let sync_status = self
            .sync_status
            .parse::<SyncStatus>()
            .map_err(|e| StoreError::corrupt("tasks", e))?;
        let last_synced_at = self
            .last_synced_at
            .as_deref()
            .map(|t| parse_time("tasks", t))
            .transpose()?;
        Ok(Task {
            created_at: parse_time("tasks", &self.created_at)?,
            updated_at: parse_time("tasks", &self.updated_at)?,
            id: self.id,
            server_id: self.server_id,
            title: self.title,
            description: self.description,
            completed: self.completed,
            is_deleted: self.is_deleted,
            sync_status,
            last_synced_at,
        })
    }
}

/// Raw `sync_queue` row before conversion.
struct QueueRow {
    id: String,
    task_id: String,
    operation: String,
    data: String,
    retry_count: u32,
    created_at: String,
}

impl QueueRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            operation: row.get(2)?,
            data: row.get(3)?,
            retry_count: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_mutation(self) -> StoreResult<QueuedMutation> {
        let operation = self
            .operation
            .parse::<Operation>()
            .map_err(|e| StoreError::corrupt("sync_queue", e))?;
        let payload: TaskPayload = serde_json::from_str(&self.data)?;
        Ok(QueuedMutation {
            created_at: parse_time("sync_queue", &self.created_at)?,
            id: self.id,
            task_id: self.task_id,
            operation,
            payload,
            retry_count: self.retry_count,
        })
    }
}

fn query_tasks(conn: &Connection, sql: &str) -> StoreResult<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], TaskRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(TaskRow::into_task).collect()
}

fn get_task(conn: &Connection, id: &str) -> StoreResult<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    conn.query_row(&sql, params![id], TaskRow::read)
        .optional()?
        .map(TaskRow::into_task)
        .transpose()
}

fn put_task(conn: &Connection, task: &Task) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO tasks (id, server_id, title, description, completed, created_at,
                            updated_at, is_deleted, sync_status, last_synced_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
            server_id = excluded.server_id,
            title = excluded.title,
            description = excluded.description,
            completed = excluded.completed,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            is_deleted = excluded.is_deleted,
            sync_status = excluded.sync_status,
            last_synced_at = excluded.last_synced_at",
        params![
            task.id,
            task.server_id,
            task.title,
            task.description,
            task.completed,
            format_time(&task.created_at),
            format_time(&task.updated_at),
            task.is_deleted,
            task.sync_status.as_str(),
            task.last_synced_at.as_ref().map(format_time),
        ],
    )?;
    Ok(())
}

fn list_tasks(conn: &Connection) -> StoreResult<Vec<Task>> {
    query_tasks(
        conn,
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE is_deleted = 0 ORDER BY updated_at DESC"),
    )
}

fn tasks_needing_sync(conn: &Connection) -> StoreResult<Vec<Task>> {
    query_tasks(
        conn,
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE sync_status IN ('pending', 'error')"),
    )
}

fn enqueue(
    conn: &Connection,
    task_id: &str,
    operation: Operation,
    payload: &TaskPayload,
) -> StoreResult<String> {
    let mutation = QueuedMutation::new(task_id, operation, payload.clone());
    let data = serde_json::to_string(&mutation.payload)?;
    conn.execute(
        "INSERT INTO sync_queue (id, task_id, operation, data, retry_count, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        params![
            mutation.id,
            mutation.task_id,
            mutation.operation.as_str(),
            data,
            format_time(&mutation.created_at),
        ],
    )?;
    Ok(mutation.id)
}

fn take_batch(conn: &Connection, limit: usize) -> StoreResult<Vec<QueuedMutation>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUEUE_COLUMNS} FROM sync_queue ORDER BY seq ASC LIMIT ?1"
    ))?;
    let rows = stmt
        .query_map(params![limit], QueueRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(QueueRow::into_mutation).collect()
}

fn remove(conn: &Connection, mutation_id: &str) -> StoreResult<bool> {
    let removed = conn.execute("DELETE FROM sync_queue WHERE id = ?1", params![mutation_id])?;
    Ok(removed > 0)
}

fn increment_retry(conn: &Connection, mutation_id: &str) -> StoreResult<Option<u32>> {
    let updated = conn.execute(
        "UPDATE sync_queue SET retry_count = retry_count + 1 WHERE id = ?1",
        params![mutation_id],
    )?;
    if updated == 0 {
        return Ok(None);
    }
    retry_count(conn, mutation_id)
}

fn retry_count(conn: &Connection, mutation_id: &str) -> StoreResult<Option<u32>> {
    Ok(conn
        .query_row(
            "SELECT retry_count FROM sync_queue WHERE id = ?1",
            params![mutation_id],
            |row| row.get(0),
        )
        .optional()?)
}

fn pending_count(conn: &Connection) -> StoreResult<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or(0))
}

fn count_for_task(conn: &Connection, task_id: &str) -> StoreResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sync_queue WHERE task_id = ?1",
        params![task_id],
        |row| row.get(0),
    )?;
    Ok(usize::try_from(count).unwrap_or(0))
}

/// Implements both store traits for anything that can lend a connection.
macro_rules! impl_sqlite_traits {
    ($ty:ty, |$this:ident| $conn:expr) => {
        impl TaskStore for $ty {
            fn get_task(&self, id: &str) -> StoreResult<Option<Task>> {
                let $this = self;
                get_task(&$conn, id)
            }

            fn put_task(&self, task: &Task) -> StoreResult<()> {
                let $this = self;
                put_task(&$conn, task)
            }

            fn list_tasks(&self) -> StoreResult<Vec<Task>> {
                let $this = self;
                list_tasks(&$conn)
            }

            fn tasks_needing_sync(&self) -> StoreResult<Vec<Task>> {
                let $this = self;
                tasks_needing_sync(&$conn)
            }
        }

        impl MutationQueue for $ty {
            fn enqueue(
                &self,
                task_id: &str,
                operation: Operation,
                payload: &TaskPayload,
            ) -> StoreResult<String> {
                let $this = self;
                enqueue(&$conn, task_id, operation, payload)
            }

            fn take_batch(&self, limit: usize) -> StoreResult<Vec<QueuedMutation>> {
                let $this = self;
                take_batch(&$conn, limit)
            }

            fn remove(&self, mutation_id: &str) -> StoreResult<bool> {
                let $this = self;
                remove(&$conn, mutation_id)
            }

            fn increment_retry(&self, mutation_id: &str) -> StoreResult<Option<u32>> {
                let $this = self;
                increment_retry(&$conn, mutation_id)
            }

            fn retry_count(&self, mutation_id: &str) -> StoreResult<Option<u32>> {
                let $this = self;
                retry_count(&$conn, mutation_id)
            }

            fn pending_count(&self) -> StoreResult<usize> {
                let $this = self;
                pending_count(&$conn)
            }

            fn count_for_task(&self, task_id: &str) -> StoreResult<usize> {
                let $this = self;
                count_for_task(&$conn, task_id)
            }
        }
    };
}

/// View handed to unit work; wraps the open transaction.
struct SqliteUnit<'a> {
    conn: &'a Connection,
}

impl_sqlite_traits!(SqliteStore, |this| *this.conn.lock());
impl_sqlite_traits!(SqliteUnit<'_>, |this| *this.conn);

impl SyncStore for SqliteStore {
    fn unit(&self, work: &mut dyn FnMut(&dyn StoreView) -> StoreResult<()>) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        work(&SqliteUnit { conn: &tx })?;
        // Dropping an uncommitted transaction rolls it back.
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;
    use tempfile::TempDir;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn queue_is_fifo() {
        contract::queue_is_fifo(&store());
    }

    #[test]
    fn retry_counter() {
        contract::retry_counter(&store());
    }

    #[test]
    fn task_round_trip() {
        contract::task_round_trip(&store());
    }

    #[test]
    fn listing() {
        contract::listing(&store());
    }

    #[test]
    fn count_for_task() {
        contract::count_for_task(&store());
    }

    #[test]
    fn failed_unit_rolls_back() {
        contract::failed_unit_rolls_back(&store());
    }

    #[test]
    fn unit_returns_output() {
        contract::unit_returns_output(&store());
    }

    #[test]
    fn migrations_are_recorded_and_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.db");

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), latest_version());
        drop(store);

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), latest_version());
    }

    #[test]
    fn queue_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            store.put_task(&contract::task("t-1", "durable")).unwrap();
            store
                .enqueue("t-1", Operation::Create, &TaskPayload::tombstone("t-1"))
                .unwrap()
        };

        let store = SqliteStore::open(&path).unwrap();
        let batch = store.take_batch(10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id);
        assert_eq!(batch[0].operation, Operation::Create);
        assert_eq!(store.get_task("t-1").unwrap().unwrap().title, "durable");
    }

    #[test]
    fn newer_schema_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", latest_version() + 1)
            .unwrap();
        let result = SqliteStore::bootstrap(conn);
        assert!(matches!(
            result,
            Err(StoreError::UnsupportedSchema { .. })
        ));
    }

    #[test]
    fn corrupt_status_is_reported() {
        let store = store();
        store.put_task(&contract::task("t-1", "x")).unwrap();
        // Bypass the CHECK constraint to simulate a foreign writer.
        {
            let conn = store.conn.lock();
            conn.execute_batch(
                "PRAGMA ignore_check_constraints = ON;
                 UPDATE tasks SET sync_status = 'bogus' WHERE id = 't-1';",
            )
            .unwrap();
        }
        assert!(matches!(
            store.get_task("t-1"),
            Err(StoreError::Corrupt { table: "tasks", .. })
        ));
    }
}
