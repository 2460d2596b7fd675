//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::ledger::TaskLedger;
use std::sync::Arc;
use tasksync_protocol::{
    BatchSyncRequest, BatchSyncResponse, HealthResponse, TaskPayload, BATCH_PATH, HEALTH_PATH,
};
use tracing::warn;

/// The sync server.
///
/// This server plays the remote authority of the TaskSync protocol. It keeps
/// authoritative task state in memory and answers batch and health requests.
///
/// # Example
///
/// ```
/// use tasksync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
///
/// // In a real application, you would expose HTTP endpoints
/// // that call server.handle_post() and server.handle_get()
/// let body = server.handle_get("/sync/health").unwrap();
/// assert!(!body.is_empty());
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_ledger(config, Arc::new(TaskLedger::new()))
    }

    /// Creates a sync server over an existing ledger.
    pub fn with_ledger(config: ServerConfig, ledger: Arc<TaskLedger>) -> Self {
        let context = Arc::new(HandlerContext::new(config, ledger));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles a batch request.
    pub fn handle_batch(&self, request: BatchSyncRequest) -> ServerResult<BatchSyncResponse> {
        self.handler.handle_batch(request)
    }

    /// Handles a health request.
    pub fn handle_health(&self) -> ServerResult<HealthResponse> {
        self.handler.handle_health()
    }

    /// Routes a raw POST request.
    ///
    /// Errors are rendered as `"<status> <message>"`.
    pub fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        let result = match path {
            BATCH_PATH => BatchSyncRequest::decode(body)
                .map_err(|e| ServerError::InvalidRequest(e.to_string()))
                .and_then(|request| self.handle_batch(request))
                .and_then(|response| {
                    response
                        .encode()
                        .map_err(|e| ServerError::Internal(e.to_string()))
                }),
            other => Err(ServerError::NotFound(other.to_string())),
        };
        result.map_err(|e| render(path, &e))
    }

    /// Routes a raw GET request.
    pub fn handle_get(&self, path: &str) -> Result<Vec<u8>, String> {
        let result = match path {
            HEALTH_PATH => self.handle_health().and_then(|health| {
                health
                    .encode()
                    .map_err(|e| ServerError::Internal(e.to_string()))
            }),
            other => Err(ServerError::NotFound(other.to_string())),
        };
        result.map_err(|e| render(path, &e))
    }

    /// Makes every endpoint answer 503 while `available` is false.
    pub fn set_available(&self, available: bool) {
        self.context.set_available(available);
    }

    /// Refuses every further mutation of `task_id` with an error verdict.
    pub fn reject_task(&self, task_id: impl Into<String>) {
        self.context.ledger.reject(task_id);
    }

    /// Accepts mutations of `task_id` again.
    pub fn accept_task(&self, task_id: &str) {
        self.context.ledger.accept(task_id);
    }

    /// Overwrites the authoritative state of a task.
    pub fn put_task(&self, payload: TaskPayload) {
        self.context.ledger.put(payload);
    }

    /// Returns the authoritative state of a task.
    pub fn task(&self, task_id: &str) -> Option<TaskPayload> {
        self.context.ledger.get(task_id)
    }

    /// Returns the number of batches handled.
    pub fn batch_count(&self) -> u64 {
        self.context.batch_count()
    }
}

fn render(path: &str, err: &ServerError) -> String {
    if err.is_server_error() {
        warn!(%path, error = %err, "request failed");
    }
    format!("{} {}", err.status_code(), err)
}
