//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tasksync_protocol::{BatchSyncRequest, BatchSyncResponse, ProcessedItem};

/// A sync transport handles network communication with the remote authority.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing).
/// Implementations bound every call by a timeout and report transport
/// failures as [`SyncError::Network`] without partial results.
pub trait SyncTransport: Send + Sync {
    /// Ships one batch and returns the per-item verdicts.
    fn send_batch(&self, request: &BatchSyncRequest) -> SyncResult<BatchSyncResponse>;

    /// Performs a no-body liveness call.
    fn health(&self) -> SyncResult<()>;
}

impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    fn send_batch(&self, request: &BatchSyncRequest) -> SyncResult<BatchSyncResponse> {
        (**self).send_batch(request)
    }

    fn health(&self) -> SyncResult<()> {
        (**self).health()
    }
}

type Responder = Box<dyn Fn(&BatchSyncRequest) -> SyncResult<BatchSyncResponse> + Send + Sync>;

enum Scripted {
    Respond(BatchSyncResponse),
    Fail(String),
    Timeout,
}

/// A mock transport for testing.
///
/// Scripted replies are consumed first, in order; after that the responder
/// (if any) answers. With neither, `send_batch` fails with a protocol error.
pub struct MockTransport {
    healthy: AtomicBool,
    scripted: Mutex<VecDeque<Scripted>>,
    responder: Mutex<Option<Responder>>,
    requests: Mutex<Vec<BatchSyncRequest>>,
    batch_calls: AtomicUsize,
    health_calls: AtomicUsize,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            scripted: Mutex::new(VecDeque::new()),
            responder: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            batch_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
        }
    }

    /// Creates a mock that accepts every item.
    pub fn accepting() -> Self {
        let transport = Self::new();
        transport.set_responder(|request| {
            Ok(BatchSyncResponse::new(
                request
                    .items
                    .iter()
                    .map(|item| ProcessedItem::success(&item.id, format!("srv-{}", item.task_id)))
                    .collect(),
            ))
        });
        transport
    }

    /// Queues a response for the next batch call.
    pub fn push_response(&self, response: BatchSyncResponse) {
        self.scripted.lock().push_back(Scripted::Respond(response));
    }

    /// Queues a connection failure for the next batch call.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.scripted.lock().push_back(Scripted::Fail(message.into()));
    }

    /// Queues a timeout for the next batch call.
    pub fn push_timeout(&self) {
        self.scripted.lock().push_back(Scripted::Timeout);
    }

    /// Sets the fallback responder.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&BatchSyncRequest) -> SyncResult<BatchSyncResponse> + Send + Sync + 'static,
    {
        *self.responder.lock() = Some(Box::new(responder));
    }

    /// Sets the health state.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of batch calls made so far.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Number of health calls made so far.
    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    /// Every batch request received, in order.
    pub fn requests(&self) -> Vec<BatchSyncRequest> {
        self.requests.lock().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncTransport for MockTransport {
    fn send_batch(&self, request: &BatchSyncRequest) -> SyncResult<BatchSyncResponse> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let scripted = self.scripted.lock().pop_front();
        match scripted {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(SyncError::network(message)),
            Some(Scripted::Timeout) => Err(SyncError::timeout("mock request timed out")),
            None => match self.responder.lock().as_ref() {
                Some(responder) => responder(request),
                None => Err(SyncError::Protocol("no mock batch response set".into())),
            },
        }
    }

    fn health(&self) -> SyncResult<()> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::network("mock endpoint unreachable"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_replies_come_first() {
        let transport = MockTransport::accepting();
        transport.push_failure("connection refused");
        transport.push_timeout();

        let request = BatchSyncRequest::default();
        let first = transport.send_batch(&request).unwrap_err();
        assert!(matches!(first, SyncError::Network { timed_out: false, .. }));
        let second = transport.send_batch(&request).unwrap_err();
        assert!(matches!(second, SyncError::Network { timed_out: true, .. }));
        assert!(transport.send_batch(&request).is_ok());
        assert_eq!(transport.batch_calls(), 3);
        assert_eq!(transport.requests().len(), 3);
    }

    #[test]
    fn unset_mock_is_protocol_error() {
        let transport = MockTransport::new();
        let result = transport.send_batch(&BatchSyncRequest::default());
        assert!(matches!(result, Err(SyncError::Protocol(_))));
    }

    #[test]
    fn health_follows_flag() {
        let transport = MockTransport::new();
        assert!(transport.health().is_ok());
        transport.set_healthy(false);
        assert!(transport.health().is_err());
        assert_eq!(transport.health_calls(), 2);
    }

    #[test]
    fn arc_forwards() {
        let transport = Arc::new(MockTransport::accepting());
        let shared: Arc<MockTransport> = Arc::clone(&transport);
        shared.send_batch(&BatchSyncRequest::default()).unwrap();
        assert_eq!(transport.batch_calls(), 1);
    }
}
