//! # TaskSync Server
//!
//! Reference remote authority for TaskSync.
//!
//! This crate provides:
//! - Batch and health endpoint handlers
//! - In-memory authoritative task state
//! - Timestamp-based conflict detection (remote wins)
//! - Fault injection for exercising client retry paths
//!
//! # Protocol
//!
//! For each item of a batch the server answers:
//! 1. `success` with a server identity when the change is accepted
//! 2. `conflict` with its own payload when it holds a strictly newer version
//! 3. `error` when the item is malformed or the task is being refused
//!
//! The server is transport-agnostic: `handle_post` and `handle_get` take a
//! path and a body and can sit behind any HTTP front end.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod ledger;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use ledger::TaskLedger;
pub use server::SyncServer;
