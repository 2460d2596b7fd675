//! Applies remote verdicts back onto the task store and mutation queue.
//!
//! Every queued mutation in a dispatched batch gets exactly one outcome:
//!
//! | Verdict                      | Mutation        | Task                          |
//! |------------------------------|-----------------|-------------------------------|
//! | success                      | removed         | server id set, synced*        |
//! | conflict with resolved data  | removed         | overwritten, synced*          |
//! | conflict without data        | retry + 1       | error once threshold reached  |
//! | error / no verdict           | retry + 1       | error once threshold reached  |
//!
//! (*) only when no other mutation for the task is still queued.
//!
//! A failed dispatch counts as an error for every item of the batch, and the
//! failure is returned to the caller once the counters are written. If a
//! counter cannot be written, the store error is returned instead and the
//! dispatch failure is logged with it. Each
//! item's updates run in one store unit; the batch as a whole is not atomic.

use crate::error::{StoreResult, SyncResult};
use crate::model::{QueuedMutation, SyncStatus};
use crate::store::{atomically, StoreView, SyncStore};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tasksync_protocol::{BatchSyncResponse, ItemStatus, ProcessedItem, TaskPayload};
use tracing::{debug, error, warn};

/// Aggregate outcome of reconciling one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Mutations resolved and removed from the queue.
    pub processed: usize,
    /// Mutations left queued with a bumped retry counter.
    pub errors: usize,
}

/// The decision core of the sync pass.
pub struct Reconciler<S: SyncStore + ?Sized> {
    store: Arc<S>,
    retry_threshold: u32,
}

impl<S: SyncStore + ?Sized> Reconciler<S> {
    /// Creates a reconciler escalating at `retry_threshold` failed attempts.
    pub fn new(store: Arc<S>, retry_threshold: u32) -> Self {
        Self {
            store,
            retry_threshold: retry_threshold.max(1),
        }
    }

    /// Reconciles `batch` against the dispatch outcome.
    ///
    /// Returns the dispatch error unchanged after bookkeeping if the whole
    /// batch failed. Store failures abort the pass.
    pub fn reconcile(
        &self,
        batch: &[QueuedMutation],
        outcome: SyncResult<BatchSyncResponse>,
    ) -> SyncResult<BatchReport> {
        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                warn!(items = batch.len(), error = %err, "batch failed, bumping retry counters");
                for mutation in batch {
                    if let Err(store_err) = self.record_failure(mutation) {
                        error!(
                            mutation_id = %mutation.id,
                            dispatch_error = %err,
                            error = %store_err,
                            "retry bookkeeping failed after batch failure"
                        );
                        return Err(store_err);
                    }
                }
                return Err(err);
            }
        };

        let mut verdicts: HashMap<String, ProcessedItem> = HashMap::new();
        for verdict in response.processed_items {
            if !batch.iter().any(|m| m.id == verdict.client_id) {
                warn!(client_id = %verdict.client_id, "ignoring verdict for unknown mutation");
                continue;
            }
            let client_id = verdict.client_id.clone();
            if verdicts.insert(client_id.clone(), verdict).is_some() {
                warn!(client_id = %client_id, "duplicate verdict, keeping the last one");
            }
        }

        let mut report = BatchReport::default();
        for mutation in batch {
            let resolved = match verdicts.remove(&mutation.id) {
                Some(verdict) => self.apply_verdict(mutation, verdict)?,
                None => {
                    warn!(mutation_id = %mutation.id, "no verdict for mutation");
                    self.record_failure(mutation)?;
                    false
                }
            };
            if resolved {
                report.processed += 1;
            } else {
                report.errors += 1;
            }
        }
        Ok(report)
    }

    /// Returns true if the mutation was resolved and removed.
    fn apply_verdict(&self, mutation: &QueuedMutation, verdict: ProcessedItem) -> SyncResult<bool> {
        match verdict.status {
            ItemStatus::Success => {
                let server_id = verdict.server_id.clone().or_else(|| {
                    verdict
                        .resolved_data
                        .as_ref()
                        .map(|r| r.server_id.clone().unwrap_or_else(|| r.id.clone()))
                });
                self.commit_success(mutation, server_id)?;
                debug!(mutation_id = %mutation.id, task_id = %mutation.task_id, "mutation accepted");
                Ok(true)
            }
            ItemStatus::Conflict => match verdict.resolved_data {
                Some(resolved) => {
                    self.commit_conflict(mutation, &resolved, verdict.server_id)?;
                    debug!(mutation_id = %mutation.id, task_id = %mutation.task_id, "conflict resolved, remote wins");
                    Ok(true)
                }
                None => {
                    debug!(mutation_id = %mutation.id, "conflict without resolved data");
                    self.record_failure(mutation)?;
                    Ok(false)
                }
            },
            ItemStatus::Error => {
                debug!(mutation_id = %mutation.id, "mutation rejected");
                self.record_failure(mutation)?;
                Ok(false)
            }
        }
    }

    fn commit_success(&self, mutation: &QueuedMutation, server_id: Option<String>) -> SyncResult<()> {
        atomically(&*self.store, |view| {
            view.remove(&mutation.id)?;
            let Some(mut task) = view.get_task(&mutation.task_id)? else {
                return Ok(());
            };
            if let Some(server_id) = server_id {
                task.server_id = Some(server_id);
            }
            mark_acknowledged(view, &mut task.sync_status, &task.id)?;
            task.last_synced_at = Some(Utc::now());
            view.put_task(&task)
        })?;
        Ok(())
    }

    fn commit_conflict(
        &self,
        mutation: &QueuedMutation,
        resolved: &TaskPayload,
        server_id: Option<String>,
    ) -> SyncResult<()> {
        atomically(&*self.store, |view| {
            view.remove(&mutation.id)?;
            let Some(mut task) = view.get_task(&mutation.task_id)? else {
                return Ok(());
            };
            task.apply_resolved(resolved);
            if resolved.server_id.is_none() {
                if let Some(server_id) = server_id {
                    task.server_id = Some(server_id);
                }
            }
            mark_acknowledged(view, &mut task.sync_status, &task.id)?;
            task.last_synced_at = Some(Utc::now());
            view.put_task(&task)
        })?;
        Ok(())
    }

    /// Bumps the retry counter and escalates the task once it reaches the
    /// threshold.
    fn record_failure(&self, mutation: &QueuedMutation) -> SyncResult<()> {
        let threshold = self.retry_threshold;
        let count = atomically(&*self.store, |view| {
            let Some(count) = view.increment_retry(&mutation.id)? else {
                return Ok(None);
            };
            if count >= threshold {
                if let Some(mut task) = view.get_task(&mutation.task_id)? {
                    if task.sync_status != SyncStatus::Error {
                        task.sync_status = SyncStatus::Error;
                        view.put_task(&task)?;
                    }
                }
            }
            Ok(Some(count))
        })?;

        match count {
            Some(count) if count >= threshold => warn!(
                mutation_id = %mutation.id,
                task_id = %mutation.task_id,
                retries = count,
                "retry threshold reached, task marked as error"
            ),
            Some(count) => debug!(mutation_id = %mutation.id, retries = count, "mutation will be retried"),
            None => debug!(mutation_id = %mutation.id, "mutation no longer queued"),
        }
        Ok(())
    }
}

/// Marks a task synced once its last queued mutation has been removed.
fn mark_acknowledged(view: &dyn StoreView, status: &mut SyncStatus, task_id: &str) -> StoreResult<()> {
    if view.count_for_task(task_id)? == 0 {
        *status = SyncStatus::Synced;
    }
    Ok(())
}
