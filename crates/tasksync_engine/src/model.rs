//! Task records and queued mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tasksync_protocol::{Operation, SyncItem, TaskPayload};
use uuid::Uuid;

/// Synchronization state of a task.
///
/// A task with queued mutations is `Pending` or `Error`, never `Synced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local changes are waiting to be delivered.
    Pending,
    /// The remote authority has acknowledged the latest local state.
    Synced,
    /// Delivery failed repeatedly; needs attention.
    Error,
}

impl SyncStatus {
    /// Returns the persisted name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
        }
    }

    /// Returns true if the task still has work for the sync engine.
    pub fn needs_sync(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Error)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "error" => Ok(SyncStatus::Error),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// A user-editable task with its sync metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Locally generated identity.
    pub id: String,
    /// Identity assigned by the remote authority.
    pub server_id: Option<String>,
    /// Title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Completion flag.
    pub completed: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last edit time.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// Sync state.
    pub sync_status: SyncStatus,
    /// Last time the remote authority acknowledged this task.
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Snapshot used as the payload of create and update mutations.
    pub fn to_payload(&self) -> TaskPayload {
        TaskPayload {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            completed: self.completed,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
            is_deleted: self.is_deleted,
            server_id: self.server_id.clone(),
        }
    }

    /// Overwrites the editable fields with the authoritative state.
    ///
    /// Local edits not reflected in `resolved` are discarded.
    pub fn apply_resolved(&mut self, resolved: &TaskPayload) {
        self.title = resolved.title.clone();
        self.description = resolved.description.clone();
        self.completed = resolved.completed;
        if let Some(updated_at) = resolved.updated_at {
            self.updated_at = updated_at;
        }
        if resolved.server_id.is_some() {
            self.server_id = resolved.server_id.clone();
        }
    }
}

/// One pending change to exactly one task.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMutation {
    /// Mutation identity.
    pub id: String,
    /// Target task identity.
    pub task_id: String,
    /// Kind of change.
    pub operation: Operation,
    /// Task snapshot at enqueue time.
    pub payload: TaskPayload,
    /// Failed delivery attempts.
    pub retry_count: u32,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
}

impl QueuedMutation {
    /// Creates a fresh mutation with a new identity.
    pub fn new(task_id: impl Into<String>, operation: Operation, payload: TaskPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            operation,
            payload,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Converts to the wire representation.
    pub fn to_sync_item(&self) -> SyncItem {
        SyncItem {
            id: self.id.clone(),
            task_id: self.task_id.clone(),
            operation: self.operation,
            task_data: self.payload.clone(),
            retry_count: self.retry_count,
            created_at: self.created_at,
        }
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    /// Title (required, non-blank).
    pub title: Option<String>,
    /// Optional description.
    pub description: Option<String>,
    /// Initial completion flag.
    pub completed: Option<bool>,
}

impl NewTask {
    /// Creates input with just a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// Partial update of a task. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New completion flag.
    pub completed: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        let now = Utc::now();
        Task {
            id: "t-1".into(),
            server_id: Some("srv-t-1".into()),
            title: "A".into(),
            description: Some("local".into()),
            completed: false,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
        }
    }

    #[test]
    fn sync_status_names() {
        for status in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Error] {
            assert_eq!(status.as_str().parse::<SyncStatus>(), Ok(status));
        }
        assert!("done".parse::<SyncStatus>().is_err());
        assert!(SyncStatus::Error.needs_sync());
        assert!(!SyncStatus::Synced.needs_sync());
    }

    #[test]
    fn resolved_state_wins_over_local_edits() {
        let mut local = task();
        let remote_time = local.updated_at + chrono::Duration::seconds(30);
        let resolved = TaskPayload {
            id: "t-1".into(),
            title: "B".into(),
            description: None,
            completed: true,
            created_at: None,
            updated_at: Some(remote_time),
            is_deleted: false,
            server_id: Some("srv-42".into()),
        };

        local.apply_resolved(&resolved);
        assert_eq!(local.title, "B");
        assert_eq!(local.description, None);
        assert!(local.completed);
        assert_eq!(local.updated_at, remote_time);
        assert_eq!(local.server_id.as_deref(), Some("srv-42"));
    }

    #[test]
    fn resolved_state_without_server_id_keeps_local_one() {
        let mut local = task();
        let mut resolved = local.to_payload();
        resolved.server_id = None;
        local.apply_resolved(&resolved);
        assert_eq!(local.server_id.as_deref(), Some("srv-t-1"));
    }

    #[test]
    fn mutation_to_sync_item() {
        let payload = task().to_payload();
        let mutation = QueuedMutation::new("t-1", Operation::Update, payload.clone());
        let item = mutation.to_sync_item();
        assert_eq!(item.id, mutation.id);
        assert_eq!(item.task_id, "t-1");
        assert_eq!(item.operation, Operation::Update);
        assert_eq!(item.task_data, payload);
        assert_eq!(item.retry_count, 0);
    }
}
