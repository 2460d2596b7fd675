//! Authoritative task state.

use crate::config::ServerConfig;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tasksync_protocol::{Operation, ProcessedItem, SyncItem, TaskPayload};

/// Server-side task ledger.
///
/// The ledger maintains:
/// - The latest accepted payload of every task
/// - Tasks whose mutations are refused (for fault injection)
#[derive(Debug, Default)]
pub struct TaskLedger {
    tasks: RwLock<HashMap<String, TaskPayload>>,
    rejected: RwLock<HashSet<String>>,
}

impl TaskLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the authoritative payload of a task.
    pub fn get(&self, task_id: &str) -> Option<TaskPayload> {
        self.tasks.read().get(task_id).cloned()
    }

    /// Overwrites the authoritative payload of a task.
    pub fn put(&self, payload: TaskPayload) {
        self.tasks.write().insert(payload.id.clone(), payload);
    }

    /// Returns the number of known tasks, including deleted ones.
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Returns true if no task is known.
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Refuses every further mutation of `task_id`.
    pub fn reject(&self, task_id: impl Into<String>) {
        self.rejected.write().insert(task_id.into());
    }

    /// Accepts mutations of `task_id` again.
    pub fn accept(&self, task_id: &str) {
        self.rejected.write().remove(task_id);
    }

    /// Applies one item and returns its verdict.
    pub fn apply(&self, config: &ServerConfig, item: &SyncItem) -> ProcessedItem {
        if self.rejected.read().contains(&item.task_id) {
            return ProcessedItem::error(&item.id);
        }
        match item.operation {
            Operation::Delete => self.apply_delete(config, item),
            Operation::Create | Operation::Update => self.apply_write(config, item),
        }
    }

    fn apply_delete(&self, config: &ServerConfig, item: &SyncItem) -> ProcessedItem {
        let mut tasks = self.tasks.write();
        let entry = tasks
            .entry(item.task_id.clone())
            .or_insert_with(|| TaskPayload::tombstone(&item.task_id));
        entry.is_deleted = true;
        let server_id = entry
            .server_id
            .get_or_insert_with(|| config.server_id_for(&item.task_id))
            .clone();
        ProcessedItem::success(&item.id, server_id)
    }

    fn apply_write(&self, config: &ServerConfig, item: &SyncItem) -> ProcessedItem {
        let data = &item.task_data;
        if data.title.trim().is_empty() || (!data.id.is_empty() && data.id != item.task_id) {
            return ProcessedItem::error(&item.id);
        }

        let mut tasks = self.tasks.write();
        let current = tasks.get(&item.task_id);
        if let Some(current) = current {
            if let (Some(remote), Some(local)) = (current.updated_at, data.updated_at) {
                if remote > local {
                    return ProcessedItem::conflict(&item.id, Some(current.clone()));
                }
            }
        }

        let server_id = data
            .server_id
            .clone()
            .or_else(|| current.and_then(|c| c.server_id.clone()))
            .unwrap_or_else(|| config.server_id_for(&item.task_id));
        let mut accepted = data.clone();
        accepted.id = item.task_id.clone();
        accepted.server_id = Some(server_id.clone());
        tasks.insert(item.task_id.clone(), accepted.clone());

        ProcessedItem::success(&item.id, server_id).with_resolved(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tasksync_protocol::ItemStatus;

    fn item(task_id: &str, operation: Operation, title: &str) -> SyncItem {
        let now = Utc::now();
        SyncItem {
            id: format!("m-{task_id}"),
            task_id: task_id.into(),
            operation,
            task_data: TaskPayload {
                id: task_id.into(),
                title: title.into(),
                description: None,
                completed: false,
                created_at: Some(now),
                updated_at: Some(now),
                is_deleted: false,
                server_id: None,
            },
            retry_count: 0,
            created_at: now,
        }
    }

    #[test]
    fn create_assigns_server_id() {
        let ledger = TaskLedger::new();
        let verdict = ledger.apply(&ServerConfig::default(), &item("t-1", Operation::Create, "A"));

        assert_eq!(verdict.status, ItemStatus::Success);
        assert_eq!(verdict.client_id, "m-t-1");
        assert_eq!(verdict.server_id.as_deref(), Some("srv-t-1"));
        assert_eq!(verdict.resolved_data.unwrap().title, "A");
        assert_eq!(ledger.get("t-1").unwrap().server_id.as_deref(), Some("srv-t-1"));
    }

    #[test]
    fn payload_server_id_is_kept() {
        let ledger = TaskLedger::new();
        let mut create = item("t-1", Operation::Create, "A");
        create.task_data.server_id = Some("srv-custom".into());
        let verdict = ledger.apply(&ServerConfig::default(), &create);
        assert_eq!(verdict.server_id.as_deref(), Some("srv-custom"));
    }

    #[test]
    fn newer_server_state_conflicts() {
        let ledger = TaskLedger::new();
        let update = item("t-1", Operation::Update, "A");
        let mut remote = update.task_data.clone();
        remote.title = "B".into();
        remote.updated_at = update.task_data.updated_at.map(|t| t + Duration::seconds(10));
        ledger.put(remote);

        let verdict = ledger.apply(&ServerConfig::default(), &update);
        assert_eq!(verdict.status, ItemStatus::Conflict);
        assert_eq!(verdict.resolved_data.unwrap().title, "B");
        assert_eq!(ledger.get("t-1").unwrap().title, "B");
    }

    #[test]
    fn older_server_state_is_overwritten() {
        let ledger = TaskLedger::new();
        let update = item("t-1", Operation::Update, "A");
        let mut remote = update.task_data.clone();
        remote.title = "old".into();
        remote.updated_at = update.task_data.updated_at.map(|t| t - Duration::seconds(10));
        ledger.put(remote);

        let verdict = ledger.apply(&ServerConfig::default(), &update);
        assert_eq!(verdict.status, ItemStatus::Success);
        assert_eq!(ledger.get("t-1").unwrap().title, "A");
    }

    #[test]
    fn malformed_items_are_errors() {
        let ledger = TaskLedger::new();
        let config = ServerConfig::default();
        let blank = item("t-1", Operation::Create, " ");
        assert_eq!(ledger.apply(&config, &blank).status, ItemStatus::Error);

        let mut mismatched = item("t-1", Operation::Update, "A");
        mismatched.task_data.id = "t-2".into();
        assert_eq!(ledger.apply(&config, &mismatched).status, ItemStatus::Error);
        assert!(ledger.is_empty());
    }

    #[test]
    fn delete_marks_tombstone() {
        let ledger = TaskLedger::new();
        let config = ServerConfig::default();
        ledger.apply(&config, &item("t-1", Operation::Create, "A"));

        let mut delete = item("t-1", Operation::Delete, "");
        delete.task_data = TaskPayload::tombstone("t-1");
        let verdict = ledger.apply(&config, &delete);

        assert_eq!(verdict.status, ItemStatus::Success);
        assert_eq!(verdict.server_id.as_deref(), Some("srv-t-1"));
        assert!(ledger.get("t-1").unwrap().is_deleted);
    }

    #[test]
    fn rejected_tasks_get_errors() {
        let ledger = TaskLedger::new();
        let config = ServerConfig::default();
        ledger.reject("t-1");
        assert_eq!(
            ledger.apply(&config, &item("t-1", Operation::Create, "A")).status,
            ItemStatus::Error
        );
        ledger.accept("t-1");
        assert_eq!(
            ledger.apply(&config, &item("t-1", Operation::Create, "A")).status,
            ItemStatus::Success
        );
    }
}
