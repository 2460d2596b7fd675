//! Request handlers for sync endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::ledger::TaskLedger;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tasksync_protocol::{BatchSyncRequest, BatchSyncResponse, HealthResponse, ItemStatus};
use tracing::{debug, info};

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Authoritative task state (shared across all handlers).
    pub ledger: Arc<TaskLedger>,
    available: AtomicBool,
    batches: AtomicU64,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, ledger: Arc<TaskLedger>) -> Self {
        Self {
            config,
            ledger,
            available: AtomicBool::new(true),
            batches: AtomicU64::new(0),
        }
    }

    /// Makes every endpoint answer 503 while `available` is false.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns true if requests are being served.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of batches handled.
    pub fn batch_count(&self) -> u64 {
        self.batches.load(Ordering::SeqCst)
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a batch request. Items are applied in request order.
    pub fn handle_batch(&self, request: BatchSyncRequest) -> ServerResult<BatchSyncResponse> {
        if !self.context.is_available() {
            return Err(ServerError::Unavailable);
        }
        let max = self.context.config.max_batch;
        if request.len() > max {
            return Err(ServerError::BatchTooLarge {
                size: request.len(),
                max,
            });
        }

        self.context.batches.fetch_add(1, Ordering::SeqCst);
        let processed: Vec<_> = request
            .items
            .iter()
            .map(|item| {
                let verdict = self.context.ledger.apply(&self.context.config, item);
                debug!(client_id = %item.id, task_id = %item.task_id, status = ?verdict.status, "item processed");
                verdict
            })
            .collect();

        let conflicts = processed
            .iter()
            .filter(|p| p.status == ItemStatus::Conflict)
            .count();
        let errors = processed
            .iter()
            .filter(|p| p.status == ItemStatus::Error)
            .count();
        info!(items = processed.len(), conflicts, errors, "batch handled");
        Ok(BatchSyncResponse::new(processed))
    }

    /// Handles a health request.
    pub fn handle_health(&self) -> ServerResult<HealthResponse> {
        if !self.context.is_available() {
            return Err(ServerError::Unavailable);
        }
        Ok(HealthResponse::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tasksync_protocol::{Operation, SyncItem, TaskPayload};

    fn create_handler(config: ServerConfig) -> (Arc<HandlerContext>, RequestHandler) {
        let context = Arc::new(HandlerContext::new(config, Arc::new(TaskLedger::new())));
        (Arc::clone(&context), RequestHandler::new(context))
    }

    fn create(task_id: &str) -> SyncItem {
        let mut payload = TaskPayload::tombstone(task_id);
        payload.is_deleted = false;
        payload.title = "A".into();
        SyncItem {
            id: format!("m-{task_id}"),
            task_id: task_id.into(),
            operation: Operation::Create,
            task_data: payload,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn batch_yields_one_verdict_per_item() {
        let (context, handler) = create_handler(ServerConfig::default());
        let request = BatchSyncRequest::new(vec![create("a"), create("b")]);

        let response = handler.handle_batch(request).unwrap();
        let ids: Vec<_> = response
            .processed_items
            .iter()
            .map(|p| p.client_id.as_str())
            .collect();
        assert_eq!(ids, ["m-a", "m-b"]);
        assert_eq!(context.batch_count(), 1);
        assert_eq!(context.ledger.len(), 2);
    }

    #[test]
    fn oversize_batch_is_rejected() {
        let (context, handler) = create_handler(ServerConfig::new().with_max_batch(1));
        let request = BatchSyncRequest::new(vec![create("a"), create("b")]);
        assert!(matches!(
            handler.handle_batch(request),
            Err(ServerError::BatchTooLarge { size: 2, max: 1 })
        ));
        assert!(context.ledger.is_empty());
    }

    #[test]
    fn unavailable_refuses_everything() {
        let (context, handler) = create_handler(ServerConfig::default());
        context.set_available(false);
        assert!(matches!(
            handler.handle_batch(BatchSyncRequest::default()),
            Err(ServerError::Unavailable)
        ));
        assert!(handler.handle_health().is_err());

        context.set_available(true);
        assert_eq!(handler.handle_health().unwrap().status, "ok");
    }
}
