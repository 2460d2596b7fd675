//! Local task operations.
//!
//! Every write applies optimistically to the task store and appends the
//! matching mutation to the queue in the same store unit.

use crate::error::{SyncError, SyncResult};
use crate::model::{NewTask, SyncStatus, Task, TaskPatch};
use crate::store::{atomically, SyncStore};
use chrono::Utc;
use std::sync::Arc;
use tasksync_protocol::{Operation, TaskPayload};
use tracing::info;
use uuid::Uuid;

/// Create, update and delete tasks while offline.
pub struct TaskService<S: SyncStore + ?Sized> {
    store: Arc<S>,
}

impl<S: SyncStore + ?Sized> TaskService<S> {
    /// Creates a service over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Creates a task in the pending state and queues its creation.
    pub fn create(&self, input: NewTask) -> SyncResult<Task> {
        let title = match input.title {
            Some(title) if !title.trim().is_empty() => title,
            _ => return Err(SyncError::Validation("title is required".into())),
        };

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let task = Task {
            server_id: Some(format!("srv-{id}")),
            id,
            title,
            description: input.description,
            completed: input.completed.unwrap_or(false),
            created_at: now,
            updated_at: now,
            is_deleted: false,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
        };

        atomically(&*self.store, |view| {
            view.put_task(&task)?;
            view.enqueue(&task.id, Operation::Create, &task.to_payload())
        })?;
        info!(task_id = %task.id, "task created");
        Ok(task)
    }

    /// Merges `patch` into an existing task and queues the update.
    pub fn update(&self, id: &str, patch: TaskPatch) -> SyncResult<Task> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(SyncError::Validation("title must not be blank".into()));
        }

        let updated = atomically(&*self.store, |view| {
            let Some(mut task) = view.get_task(id)?.filter(|t| !t.is_deleted) else {
                return Ok(None);
            };
            if let Some(title) = patch.title.clone() {
                task.title = title;
            }
            if let Some(description) = patch.description.clone() {
                task.description = Some(description);
            }
            if let Some(completed) = patch.completed {
                task.completed = completed;
            }
            task.updated_at = Utc::now();
            task.sync_status = SyncStatus::Pending;

            view.put_task(&task)?;
            view.enqueue(&task.id, Operation::Update, &task.to_payload())?;
            Ok(Some(task))
        })?;

        let task = updated.ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        info!(task_id = %task.id, "task updated");
        Ok(task)
    }

    /// Soft-deletes a task and queues the deletion.
    pub fn delete(&self, id: &str) -> SyncResult<()> {
        let deleted = atomically(&*self.store, |view| {
            let Some(mut task) = view.get_task(id)?.filter(|t| !t.is_deleted) else {
                return Ok(false);
            };
            task.is_deleted = true;
            task.updated_at = Utc::now();
            task.sync_status = SyncStatus::Pending;

            view.put_task(&task)?;
            view.enqueue(&task.id, Operation::Delete, &TaskPayload::tombstone(&task.id))?;
            Ok(true)
        })?;

        if !deleted {
            return Err(SyncError::NotFound(id.to_string()));
        }
        info!(task_id = %id, "task deleted");
        Ok(())
    }

    /// Gets a task, including soft-deleted ones.
    pub fn get(&self, id: &str) -> SyncResult<Task> {
        self.store
            .get_task(id)?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }

    /// Lists live tasks, most recently updated first.
    pub fn list(&self) -> SyncResult<Vec<Task>> {
        Ok(self.store.list_tasks()?)
    }

    /// Lists tasks in the pending or error state.
    pub fn needing_sync(&self) -> SyncResult<Vec<Task>> {
        Ok(self.store.tasks_needing_sync()?)
    }
}
