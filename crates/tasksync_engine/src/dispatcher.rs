//! Batch dispatcher.

use crate::error::{SyncError, SyncResult};
use crate::model::QueuedMutation;
use crate::transport::SyncTransport;
use std::sync::Arc;
use std::time::Instant;
use tasksync_protocol::{BatchSyncRequest, BatchSyncResponse};
use tracing::{debug, warn};

/// Ships a batch of queued mutations to the remote authority as one request.
///
/// Transport failures are returned undecoded; the caller treats the whole
/// batch as unresolved.
pub struct BatchDispatcher<T: SyncTransport> {
    transport: Arc<T>,
    batch_size: usize,
}

impl<T: SyncTransport> BatchDispatcher<T> {
    /// Creates a dispatcher bounded by `batch_size` items per request.
    pub fn new(transport: Arc<T>, batch_size: usize) -> Self {
        Self {
            transport,
            batch_size: batch_size.max(1),
        }
    }

    /// Returns the configured batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Sends `batch` and returns the remote verdicts.
    ///
    /// An empty batch returns an empty response without a remote call.
    pub fn dispatch(&self, batch: &[QueuedMutation]) -> SyncResult<BatchSyncResponse> {
        if batch.is_empty() {
            return Ok(BatchSyncResponse::default());
        }
        if batch.len() > self.batch_size {
            return Err(SyncError::Protocol(format!(
                "batch of {} exceeds configured size {}",
                batch.len(),
                self.batch_size
            )));
        }

        let request = BatchSyncRequest::new(batch.iter().map(QueuedMutation::to_sync_item).collect());
        let start = Instant::now();
        match self.transport.send_batch(&request) {
            Ok(response) => {
                debug!(
                    items = batch.len(),
                    verdicts = response.processed_items.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "batch dispatched"
                );
                Ok(response)
            }
            Err(err) => {
                warn!(items = batch.len(), error = %err, "batch dispatch failed");
                Err(err)
            }
        }
    }
}
