//! In-memory store for testing.

use super::{MutationQueue, StoreView, SyncStore, TaskStore};
use crate::error::StoreResult;
use crate::model::{QueuedMutation, Task};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use tasksync_protocol::{Operation, TaskPayload};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    tasks: HashMap<String, Task>,
    // Insertion order is queue order.
    queue: Vec<QueuedMutation>,
}

impl MemoryState {
    fn get_task(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).cloned()
    }

    fn put_task(&mut self, task: &Task) {
        self.tasks.insert(task.id.clone(), task.clone());
    }

    fn list_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| !t.is_deleted)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        tasks
    }

    fn tasks_needing_sync(&self) -> Vec<Task> {
        self.tasks
            .values()
            .filter(|t| t.sync_status.needs_sync())
            .cloned()
            .collect()
    }

    fn enqueue(&mut self, task_id: &str, operation: Operation, payload: &TaskPayload) -> String {
        let mutation = QueuedMutation::new(task_id, operation, payload.clone());
        let id = mutation.id.clone();
        self.queue.push(mutation);
        id
    }

    fn take_batch(&self, limit: usize) -> Vec<QueuedMutation> {
        self.queue.iter().take(limit).cloned().collect()
    }

    fn remove(&mut self, mutation_id: &str) -> bool {
        let before = self.queue.len();
        self.queue.retain(|m| m.id != mutation_id);
        self.queue.len() != before
    }

    fn increment_retry(&mut self, mutation_id: &str) -> Option<u32> {
        self.queue
            .iter_mut()
            .find(|m| m.id == mutation_id)
            .map(|m| {
                m.retry_count += 1;
                m.retry_count
            })
    }

    fn retry_count(&self, mutation_id: &str) -> Option<u32> {
        self.queue
            .iter()
            .find(|m| m.id == mutation_id)
            .map(|m| m.retry_count)
    }

    fn count_for_task(&self, task_id: &str) -> usize {
        self.queue.iter().filter(|m| m.task_id == task_id).count()
    }
}

/// An in-memory task store and mutation queue.
///
/// Suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral clients that don't need persistence
///
/// Units snapshot the state before running and restore it on failure.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryStore {
    fn get_task(&self, id: &str) -> StoreResult<Option<Task>> {
        Ok(self.state.lock().get_task(id))
    }

    fn put_task(&self, task: &Task) -> StoreResult<()> {
        self.state.lock().put_task(task);
        Ok(())
    }

    fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self.state.lock().list_tasks())
    }

    fn tasks_needing_sync(&self) -> StoreResult<Vec<Task>> {
        Ok(self.state.lock().tasks_needing_sync())
    }
}

impl MutationQueue for MemoryStore {
    fn enqueue(
        &self,
        task_id: &str,
        operation: Operation,
        payload: &TaskPayload,
    ) -> StoreResult<String> {
        Ok(self.state.lock().enqueue(task_id, operation, payload))
    }

    fn take_batch(&self, limit: usize) -> StoreResult<Vec<QueuedMutation>> {
        Ok(self.state.lock().take_batch(limit))
    }

    fn remove(&self, mutation_id: &str) -> StoreResult<bool> {
        Ok(self.state.lock().remove(mutation_id))
    }

    fn increment_retry(&self, mutation_id: &str) -> StoreResult<Option<u32>> {
        Ok(self.state.lock().increment_retry(mutation_id))
    }

    fn retry_count(&self, mutation_id: &str) -> StoreResult<Option<u32>> {
        Ok(self.state.lock().retry_count(mutation_id))
    }

    fn pending_count(&self) -> StoreResult<usize> {
        Ok(self.state.lock().queue.len())
    }

    fn count_for_task(&self, task_id: &str) -> StoreResult<usize> {
        Ok(self.state.lock().count_for_task(task_id))
    }
}

/// View handed to unit work while the store lock is held.
struct MemoryUnit<'a> {
    state: RefCell<&'a mut MemoryState>,
}

impl TaskStore for MemoryUnit<'_> {
    fn get_task(&self, id: &str) -> StoreResult<Option<Task>> {
        Ok(self.state.borrow().get_task(id))
    }

    fn put_task(&self, task: &Task) -> StoreResult<()> {
        self.state.borrow_mut().put_task(task);
        Ok(())
    }

    fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self.state.borrow().list_tasks())
    }

    fn tasks_needing_sync(&self) -> StoreResult<Vec<Task>> {
        Ok(self.state.borrow().tasks_needing_sync())
    }
}

impl MutationQueue for MemoryUnit<'_> {
    fn enqueue(
        &self,
        task_id: &str,
        operation: Operation,
        payload: &TaskPayload,
    ) -> StoreResult<String> {
        Ok(self.state.borrow_mut().enqueue(task_id, operation, payload))
    }

    fn take_batch(&self, limit: usize) -> StoreResult<Vec<QueuedMutation>> {
        Ok(self.state.borrow().take_batch(limit))
    }

    fn remove(&self, mutation_id: &str) -> StoreResult<bool> {
        Ok(self.state.borrow_mut().remove(mutation_id))
    }

    fn increment_retry(&self, mutation_id: &str) -> StoreResult<Option<u32>> {
        Ok(self.state.borrow_mut().increment_retry(mutation_id))
    }

    fn retry_count(&self, mutation_id: &str) -> StoreResult<Option<u32>> {
        Ok(self.state.borrow().retry_count(mutation_id))
    }

    fn pending_count(&self) -> StoreResult<usize> {
        Ok(self.state.borrow().queue.len())
    }

    fn count_for_task(&self, task_id: &str) -> StoreResult<usize> {
        Ok(self.state.borrow().count_for_task(task_id))
    }
}

impl SyncStore for MemoryStore {
    fn unit(&self, work: &mut dyn FnMut(&dyn StoreView) -> StoreResult<()>) -> StoreResult<()> {
        let mut guard = self.state.lock();
        let snapshot = guard.clone();
        let result = {
            let view = MemoryUnit {
                state: RefCell::new(&mut *guard),
            };
            work(&view)
        };
        if result.is_err() {
            *guard = snapshot;
        }
        result
    }
}
