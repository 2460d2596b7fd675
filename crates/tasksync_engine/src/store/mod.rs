//! Record store and mutation queue contracts.
//!
//! The engine never talks to a database directly. It consumes these traits:
//!
//! - [`TaskStore`] - durable keyed storage for tasks and their sync metadata
//! - [`MutationQueue`] - ordered, durable log of pending mutations
//! - [`SyncStore`] - both of the above, plus atomic units of work
//!
//! # Invariants
//!
//! - `take_batch` returns entries in insertion order and never removes them
//! - `enqueue` is safe while a batch taken earlier is still being processed
//! - Every write performed inside one [`SyncStore::unit`] becomes visible
//!   together, or not at all
//!
//! # Implementors
//!
//! - [`MemoryStore`] - for tests and ephemeral use
//! - [`SqliteStore`] - for persistent storage

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{StoreError, StoreResult};
use crate::model::{QueuedMutation, Task};
use tasksync_protocol::{Operation, TaskPayload};

/// Durable keyed storage for tasks.
pub trait TaskStore {
    /// Gets a task by identity, including soft-deleted ones.
    fn get_task(&self, id: &str) -> StoreResult<Option<Task>>;

    /// Inserts or replaces a task.
    fn put_task(&self, task: &Task) -> StoreResult<()>;

    /// Lists tasks that are not soft-deleted, most recently updated first.
    fn list_tasks(&self) -> StoreResult<Vec<Task>>;

    /// Lists tasks in the `pending` or `error` state.
    fn tasks_needing_sync(&self) -> StoreResult<Vec<Task>>;
}

/// Ordered, durable log of pending mutations.
pub trait MutationQueue {
    /// Appends a mutation and returns its identity.
    fn enqueue(
        &self,
        task_id: &str,
        operation: Operation,
        payload: &TaskPayload,
    ) -> StoreResult<String>;

    /// Returns up to `limit` oldest entries without removing them.
    fn take_batch(&self, limit: usize) -> StoreResult<Vec<QueuedMutation>>;

    /// Removes a mutation. Returns false if it was not queued.
    fn remove(&self, mutation_id: &str) -> StoreResult<bool>;

    /// Increments the retry counter. Returns the new count, or `None` if the
    /// mutation is not queued.
    fn increment_retry(&self, mutation_id: &str) -> StoreResult<Option<u32>>;

    /// Returns the retry counter, or `None` if the mutation is not queued.
    fn retry_count(&self, mutation_id: &str) -> StoreResult<Option<u32>>;

    /// Returns the number of queued mutations.
    fn pending_count(&self) -> StoreResult<usize>;

    /// Returns the number of queued mutations targeting `task_id`.
    fn count_for_task(&self, task_id: &str) -> StoreResult<usize>;
}

/// A view over both stores, handed to the work of a unit.
pub trait StoreView: TaskStore + MutationQueue {}

impl<T: TaskStore + MutationQueue + ?Sized> StoreView for T {}

/// Task store and mutation queue sharing one atomicity domain.
pub trait SyncStore: TaskStore + MutationQueue + Send + Sync {
    /// Runs `work` against a view of the store as a single atomic unit.
    ///
    /// If `work` returns an error, none of its writes are kept.
    fn unit(&self, work: &mut dyn FnMut(&dyn StoreView) -> StoreResult<()>) -> StoreResult<()>;
}

/// Runs `work` as one unit and returns its output.
///
/// Convenience wrapper over [`SyncStore::unit`] for closures that produce a
/// value.
pub fn atomically<S, R, F>(store: &S, work: F) -> StoreResult<R>
where
    S: SyncStore + ?Sized,
    F: FnOnce(&dyn StoreView) -> StoreResult<R>,
{
    let mut work = Some(work);
    let mut output = None;
    store.unit(&mut |view| {
        if let Some(work) = work.take() {
            output = Some(work(view)?);
        }
        Ok(())
    })?;
    output.ok_or(StoreError::UnitNotRun)
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every store must share, run against each implementation.

    use super::*;
    use crate::model::SyncStatus;
    use chrono::{Duration, Utc};

    pub fn task(id: &str, title: &str) -> Task {
        let now = Utc::now();
        Task {
            id: id.into(),
            server_id: Some(format!("srv-{id}")),
            title: title.into(),
            description: None,
            completed: false,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
        }
    }

    pub fn queue_is_fifo(store: &dyn StoreView) {
        let ids: Vec<String> = (0..5)
            .map(|i| {
                store
                    .enqueue(&format!("t-{i}"), Operation::Create, &TaskPayload::tombstone("x"))
                    .unwrap()
            })
            .collect();

        let batch = store.take_batch(3).unwrap();
        let taken: Vec<_> = batch.iter().map(|m| m.id.clone()).collect();
        assert_eq!(taken, ids[..3].to_vec());

        // take_batch does not remove
        assert_eq!(store.pending_count().unwrap(), 5);
        assert!(store.remove(&ids[0]).unwrap());
        assert!(!store.remove(&ids[0]).unwrap());
        assert_eq!(store.take_batch(10).unwrap()[0].id, ids[1]);
    }

    pub fn retry_counter(store: &dyn StoreView) {
        let id = store
            .enqueue("t-1", Operation::Update, &TaskPayload::tombstone("t-1"))
            .unwrap();
        assert_eq!(store.retry_count(&id).unwrap(), Some(0));
        assert_eq!(store.increment_retry(&id).unwrap(), Some(1));
        assert_eq!(store.increment_retry(&id).unwrap(), Some(2));
        assert_eq!(store.retry_count(&id).unwrap(), Some(2));
        assert_eq!(store.increment_retry("missing").unwrap(), None);
        assert_eq!(store.retry_count("missing").unwrap(), None);
    }

    pub fn task_round_trip(store: &dyn StoreView) {
        let mut task = task("t-1", "Buy milk");
        task.description = Some("2 litres".into());
        store.put_task(&task).unwrap();
        assert_eq!(store.get_task("t-1").unwrap(), Some(task.clone()));

        task.sync_status = SyncStatus::Synced;
        task.last_synced_at = Some(Utc::now());
        store.put_task(&task).unwrap();
        assert_eq!(store.get_task("t-1").unwrap(), Some(task));
        assert_eq!(store.get_task("nope").unwrap(), None);
    }

    pub fn listing(store: &dyn StoreView) {
        let mut older = task("old", "older");
        older.updated_at = Utc::now() - Duration::minutes(5);
        older.sync_status = SyncStatus::Synced;
        let newer = task("new", "newer");
        let mut deleted = task("gone", "deleted");
        deleted.is_deleted = true;
        deleted.sync_status = SyncStatus::Error;

        for t in [&older, &newer, &deleted] {
            store.put_task(t).unwrap();
        }

        let listed: Vec<_> = store.list_tasks().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(listed, vec!["new".to_string(), "old".to_string()]);

        let mut needing: Vec<_> = store
            .tasks_needing_sync()
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        needing.sort();
        assert_eq!(needing, vec!["gone".to_string(), "new".to_string()]);
    }

    pub fn count_for_task(store: &dyn StoreView) {
        let payload = TaskPayload::tombstone("a");
        store.enqueue("a", Operation::Create, &payload).unwrap();
        store.enqueue("b", Operation::Create, &payload).unwrap();
        store.enqueue("a", Operation::Update, &payload).unwrap();
        assert_eq!(store.count_for_task("a").unwrap(), 2);
        assert_eq!(store.count_for_task("b").unwrap(), 1);
        assert_eq!(store.count_for_task("c").unwrap(), 0);
    }

    pub fn failed_unit_rolls_back<S: SyncStore>(store: &S) {
        store.put_task(&task("t-1", "before")).unwrap();

        let result: StoreResult<()> = atomically(store, |view| {
            view.put_task(&task("t-1", "after"))?;
            view.enqueue("t-1", Operation::Update, &TaskPayload::tombstone("t-1"))?;
            Err(StoreError::corrupt("tasks", "forced"))
        });
        assert!(result.is_err());

        assert_eq!(store.get_task("t-1").unwrap().unwrap().title, "before");
        assert_eq!(store.pending_count().unwrap(), 0);
    }

    pub fn unit_returns_output<S: SyncStore>(store: &S) {
        let id = atomically(store, |view| {
            view.put_task(&task("t-1", "x"))?;
            view.enqueue("t-1", Operation::Create, &TaskPayload::tombstone("t-1"))
        })
        .unwrap();
        assert_eq!(store.take_batch(1).unwrap()[0].id, id);
    }
}
