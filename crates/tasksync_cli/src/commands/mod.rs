//! CLI command implementations.

pub mod sync;
pub mod tasks;

use serde::Serialize;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tasksync_engine::{
    HttpTransport, ReqwestClient, SqliteStore, SyncConfig, SyncEngine, TaskService,
};

/// Result type for commands.
pub type CommandResult<T = ()> = Result<T, Box<dyn Error>>;

/// Everything a command needs: the local store, the task service and the
/// sync engine wired to the remote API.
pub struct Context {
    /// Local task operations.
    pub tasks: TaskService<SqliteStore>,
    /// Sync engine.
    pub engine: SyncEngine<SqliteStore, HttpTransport<ReqwestClient>>,
    /// Print JSON instead of text.
    pub json: bool,
}

impl Context {
    /// Opens the database at `path` and wires the engine.
    pub fn open(path: &Path, config: SyncConfig, json: bool) -> CommandResult<Self> {
        let store = Arc::new(SqliteStore::open(path)?);
        let transport = Arc::new(HttpTransport::new(config.clone(), ReqwestClient::new()?));
        Ok(Self {
            tasks: TaskService::new(Arc::clone(&store)),
            engine: SyncEngine::new(&config, store, transport),
            json,
        })
    }

    /// Prints `value` as pretty JSON, or `text` otherwise.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> CommandResult {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}
