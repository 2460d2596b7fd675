//! # TaskSync Protocol
//!
//! Wire types for the TaskSync batch synchronization protocol.
//!
//! This crate provides:
//! - `Operation` and `TaskPayload` for queued changes
//! - Protocol messages (batch request/response, health, status)
//! - JSON encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod operation;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    BatchSyncRequest, BatchSyncResponse, HealthResponse, ItemStatus, ProcessedItem,
    StatusResponse, SyncItem,
};
pub use operation::{Operation, TaskPayload};

/// Path of the batch endpoint, relative to the API base URL.
pub const BATCH_PATH: &str = "/sync/batch";

/// Path of the health endpoint, relative to the API base URL.
pub const HEALTH_PATH: &str = "/sync/health";
