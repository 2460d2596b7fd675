//! Protocol messages for batch sync.

use crate::error::{ProtocolError, ProtocolResult};
use crate::operation::{Operation, TaskPayload};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

fn encode<T: Serialize>(message: &'static str, value: &T) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| ProtocolError::Encode { message, source })
}

fn decode<T: DeserializeOwned>(message: &'static str, bytes: &[u8]) -> ProtocolResult<T> {
    serde_json::from_slice(bytes).map_err(|source| ProtocolError::Decode { message, source })
}

/// One queued mutation as shipped to the remote authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItem {
    /// Client mutation identity.
    pub id: String,
    /// Identity of the record the mutation targets.
    pub task_id: String,
    /// Kind of change.
    pub operation: Operation,
    /// Record snapshot taken at enqueue time.
    pub task_data: TaskPayload,
    /// Delivery attempts that have already failed.
    pub retry_count: u32,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
}

/// Batch request: an ordered list of queued mutations, oldest first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchSyncRequest {
    /// Items in queue order.
    pub items: Vec<SyncItem>,
}

impl BatchSyncRequest {
    /// Creates a new batch request.
    pub fn new(items: Vec<SyncItem>) -> Self {
        Self { items }
    }

    /// Returns the number of items in the batch.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the batch carries no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode("batch request", self)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode("batch request", bytes)
    }
}

/// Verdict of the remote authority for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// The change was accepted.
    Success,
    /// The change collided with newer remote state.
    Conflict,
    /// The change was rejected.
    Error,
}

/// Per-item result inside a batch response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedItem {
    /// Client mutation identity this verdict refers to.
    #[serde(rename = "id", alias = "client_id")]
    pub client_id: String,
    /// Identity assigned by the remote authority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// Outcome.
    pub status: ItemStatus,
    /// Authoritative record state, present for success and conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_data: Option<TaskPayload>,
}

impl ProcessedItem {
    /// Creates a success verdict.
    pub fn success(client_id: impl Into<String>, server_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            server_id: Some(server_id.into()),
            status: ItemStatus::Success,
            resolved_data: None,
        }
    }

    /// Creates a conflict verdict carrying the authoritative state.
    pub fn conflict(client_id: impl Into<String>, resolved: Option<TaskPayload>) -> Self {
        Self {
            client_id: client_id.into(),
            server_id: resolved.as_ref().and_then(|r| r.server_id.clone()),
            status: ItemStatus::Conflict,
            resolved_data: resolved,
        }
    }

    /// Creates an error verdict.
    pub fn error(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            server_id: None,
            status: ItemStatus::Error,
            resolved_data: None,
        }
    }

    /// Attaches the resolved payload.
    pub fn with_resolved(mut self, resolved: TaskPayload) -> Self {
        self.resolved_data = Some(resolved);
        self
    }
}

/// Batch response: one verdict per submitted item, in any order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchSyncResponse {
    /// Verdicts.
    pub processed_items: Vec<ProcessedItem>,
}

impl BatchSyncResponse {
    /// Creates a new batch response.
    pub fn new(processed_items: Vec<ProcessedItem>) -> Self {
        Self { processed_items }
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode("batch response", self)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode("batch response", bytes)
    }
}

/// Body returned by the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the service answers.
    pub status: String,
    /// Server time.
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    /// Creates an `ok` response stamped with the current time.
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
            timestamp: Utc::now(),
        }
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode("health response", self)
    }
}

/// Number of mutations still waiting in the local queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Pending mutations.
    pub pending: usize,
}
