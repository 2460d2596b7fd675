//! # TaskSync Engine
//!
//! Offline-first task storage and batch synchronization.
//!
//! This crate provides:
//! - Task records with a pending → synced | error sync state
//! - A durable FIFO mutation queue (in-memory or SQLite)
//! - Batch dispatch to a remote authority over a pluggable transport
//! - Per-item reconciliation with retry counters and escalation
//! - A connectivity probe
//!
//! ## Architecture
//!
//! Local edits go through [`TaskService`], which updates the task and queues a
//! mutation in one store unit. A [`SyncEngine`] pass then:
//! 1. Takes the oldest `batch_size` mutations from the queue
//! 2. Ships them as one request through a [`SyncTransport`]
//! 3. Applies each verdict back onto the store via the [`Reconciler`]
//!
//! ## Key Invariants
//!
//! - Remote authority wins conflicts
//! - Mutations are dispatched oldest-first and never coalesced
//! - A task with queued mutations is never `synced`
//! - At most one pass runs at a time
//! - Each item is reconciled atomically; a batch is not

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dispatcher;
mod error;
mod http;
mod model;
mod probe;
mod reconciler;
mod state;
pub mod store;
mod tasks;
mod transport;

pub use config::{SyncConfig, DEFAULT_SERVER_URL};
pub use dispatcher::BatchDispatcher;
pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use http::{HttpClient, HttpError, HttpTransport, LoopbackClient, LoopbackServer, ReqwestClient};
pub use model::{NewTask, QueuedMutation, SyncStatus, Task, TaskPatch};
pub use probe::ConnectivityProbe;
pub use reconciler::{BatchReport, Reconciler};
pub use state::{SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use store::{MemoryStore, MutationQueue, SqliteStore, StoreView, SyncStore, TaskStore};
pub use tasks::TaskService;
pub use transport::{MockTransport, SyncTransport};
