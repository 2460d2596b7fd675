//! Sync engine state machine.

use crate::config::SyncConfig;
use crate::dispatcher::BatchDispatcher;
use crate::error::{SyncError, SyncResult};
use crate::probe::ConnectivityProbe;
use crate::reconciler::{BatchReport, Reconciler};
use crate::store::SyncStore;
use crate::transport::SyncTransport;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is waiting on the batch request.
    Dispatching,
    /// Engine is applying verdicts to the stores.
    Reconciling,
    /// The last pass completed.
    Synced,
    /// The last pass failed.
    Error,
}

impl SyncState {
    /// Returns true if a pass is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Dispatching | SyncState::Reconciling)
    }
}

/// Statistics about sync passes.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Passes that ran to completion.
    pub cycles_completed: u64,
    /// Passes that failed as a whole.
    pub cycles_failed: u64,
    /// Triggers skipped because a pass was already running.
    pub cycles_skipped: u64,
    /// Mutations resolved.
    pub items_processed: u64,
    /// Mutations that came back as errors.
    pub items_failed: u64,
    /// Last completed pass.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of one sync pass.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// Aggregate outcome.
    pub report: BatchReport,
    /// Number of mutations dispatched.
    pub batch_len: usize,
    /// True if another pass was already running and nothing was done.
    pub skipped: bool,
    /// Duration of the pass.
    pub duration: Duration,
}

impl SyncCycleResult {
    fn skipped() -> Self {
        Self {
            report: BatchReport::default(),
            batch_len: 0,
            skipped: true,
            duration: Duration::ZERO,
        }
    }
}

/// The sync engine drains the mutation queue towards the remote authority.
///
/// At most one pass runs at a time; a trigger that arrives while a pass is
/// in flight returns immediately with `skipped` set on its result.
/// Enqueueing stays possible during a pass; new mutations are picked up by
/// the next one.
pub struct SyncEngine<S: SyncStore + ?Sized, T: SyncTransport> {
    store: Arc<S>,
    dispatcher: BatchDispatcher<T>,
    reconciler: Reconciler<S>,
    probe: ConnectivityProbe<T>,
    pass: Mutex<()>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<S: SyncStore + ?Sized, T: SyncTransport> SyncEngine<S, T> {
    /// Creates a new sync engine.
    pub fn new(config: &SyncConfig, store: Arc<S>, transport: Arc<T>) -> Self {
        Self {
            dispatcher: BatchDispatcher::new(Arc::clone(&transport), config.batch_size),
            reconciler: Reconciler::new(Arc::clone(&store), config.retry_threshold),
            probe: ConnectivityProbe::new(transport),
            store,
            pass: Mutex::new(()),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Number of mutations waiting in the queue.
    pub fn pending_count(&self) -> SyncResult<usize> {
        Ok(self.store.pending_count()?)
    }

    /// Best-effort health check against the remote authority.
    pub fn is_reachable(&self) -> bool {
        self.probe.is_reachable()
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs one sync pass over the oldest queued mutations.
    ///
    /// Whole-batch failures are returned after the retry counters of the
    /// batch have been bumped.
    pub fn sync(&self) -> SyncResult<SyncCycleResult> {
        let Some(_pass) = self.pass.try_lock() else {
            debug!("sync pass already running, skipping trigger");
            self.stats.write().cycles_skipped += 1;
            return Ok(SyncCycleResult::skipped());
        };

        let start = Instant::now();
        match self.run_pass() {
            Ok((report, batch_len)) => {
                let duration = start.elapsed();
                self.set_state(SyncState::Synced);
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.items_processed += report.processed as u64;
                    stats.items_failed += report.errors as u64;
                    stats.last_sync_time = Some(Instant::now());
                    stats.last_error = None;
                }
                info!(
                    processed = report.processed,
                    errors = report.errors,
                    duration_ms = duration.as_millis() as u64,
                    "sync pass complete"
                );
                Ok(SyncCycleResult {
                    report,
                    batch_len,
                    skipped: false,
                    duration,
                })
            }
            Err(err) => {
                self.handle_error(&err);
                Err(err)
            }
        }
    }

    fn run_pass(&self) -> SyncResult<(BatchReport, usize)> {
        let batch = self.store.take_batch(self.dispatcher.batch_size())?;
        if batch.is_empty() {
            debug!("mutation queue empty");
            return Ok((BatchReport::default(), 0));
        }

        self.set_state(SyncState::Dispatching);
        let outcome = self.dispatcher.dispatch(&batch);

        self.set_state(SyncState::Reconciling);
        let report = self.reconciler.reconcile(&batch, outcome)?;
        Ok((report, batch.len()))
    }

    fn handle_error(&self, error: &SyncError) {
        self.set_state(SyncState::Error);
        let mut stats = self.stats.write();
        stats.cycles_failed += 1;
        stats.last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MutationQueue};
    use crate::transport::MockTransport;
    use tasksync_protocol::{Operation, TaskPayload};

    type Fixture = (
        Arc<MemoryStore>,
        Arc<MockTransport>,
        SyncEngine<MemoryStore, MockTransport>,
    );

    fn engine(transport: MockTransport) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(transport);
        let engine = SyncEngine::new(
            &SyncConfig::default().with_batch_size(2),
            Arc::clone(&store),
            Arc::clone(&transport),
        );
        (store, transport, engine)
    }

    fn enqueue(store: &MemoryStore, n: usize) {
        for i in 0..n {
            let id = format!("t-{i}");
            store
                .enqueue(&id, Operation::Create, &TaskPayload::tombstone(&id))
                .unwrap();
        }
    }

    #[test]
    fn initial_state() {
        let (_, _, engine) = engine(MockTransport::new());
        assert_eq!(engine.state(), SyncState::Idle);
        assert!(!engine.state().is_active());
        assert_eq!(engine.stats().cycles_completed, 0);
    }

    #[test]
    fn empty_queue_does_not_touch_remote() {
        let (_, transport, engine) = engine(MockTransport::accepting());
        let result = engine.sync().unwrap();
        assert_eq!(result.report, BatchReport::default());
        assert!(!result.skipped);
        assert_eq!(transport.batch_calls(), 0);
    }

    #[test]
    fn pass_is_bounded_by_batch_size() {
        let (store, transport, engine) = engine(MockTransport::accepting());
        enqueue(&store, 3);

        let first = engine.sync().unwrap();
        assert_eq!(first.batch_len, 2);
        assert_eq!(first.report.processed, 2);
        assert_eq!(engine.pending_count().unwrap(), 1);

        engine.sync().unwrap();
        assert_eq!(engine.pending_count().unwrap(), 0);
        assert_eq!(transport.batch_calls(), 2);
        assert_eq!(engine.state(), SyncState::Synced);
        assert_eq!(engine.stats().items_processed, 3);
    }

    #[test]
    fn network_failure_sets_error_state() {
        let (store, transport, engine) = engine(MockTransport::new());
        transport.push_failure("connection refused");
        enqueue(&store, 1);

        let err = engine.sync().unwrap_err();
        assert!(err.is_network());
        assert_eq!(engine.state(), SyncState::Error);
        let stats = engine.stats();
        assert_eq!(stats.cycles_failed, 1);
        assert!(stats.last_error.is_some());
    }

    #[test]
    fn trigger_during_pass_is_skipped() {
        let (store, transport, engine) = engine(MockTransport::accepting());
        enqueue(&store, 1);

        let held = engine.pass.lock();
        let result = engine.sync().unwrap();
        drop(held);

        assert!(result.skipped);
        assert_eq!(transport.batch_calls(), 0);
        assert_eq!(engine.stats().cycles_skipped, 1);
        assert_eq!(engine.pending_count().unwrap(), 1);
    }

    #[test]
    fn reachability_passes_through() {
        let (_, transport, engine) = engine(MockTransport::new());
        assert!(engine.is_reachable());
        transport.set_healthy(false);
        assert!(!engine.is_reachable());
    }
}
