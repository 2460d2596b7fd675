//! Sync, status and health commands.

use super::{CommandResult, Context};
use serde::Serialize;
use tasksync_protocol::StatusResponse;

/// Outcome of the sync command.
#[derive(Debug, Serialize)]
pub struct SyncOutput {
    /// Mutations resolved.
    pub processed: usize,
    /// Mutations left queued after an error verdict.
    pub errors: usize,
    /// Mutations still queued after the pass.
    pub pending: usize,
}

/// Runs one sync pass. Whole-batch failures become a non-zero exit.
pub fn sync(ctx: &Context) -> CommandResult {
    let result = ctx.engine.sync()?;
    let output = SyncOutput {
        processed: result.report.processed,
        errors: result.report.errors,
        pending: ctx.engine.pending_count()?,
    };
    ctx.emit(&output, || {
        format!(
            "Synced: {} processed, {} errors, {} still pending",
            output.processed, output.errors, output.pending
        )
    })
}

/// Runs the status command.
pub fn status(ctx: &Context) -> CommandResult {
    let status = StatusResponse {
        pending: ctx.engine.pending_count()?,
    };
    ctx.emit(&status, || format!("{} pending", status.pending))
}

/// Runs the health command. An unreachable endpoint is a non-zero exit.
pub fn health(ctx: &Context) -> CommandResult {
    let reachable = ctx.engine.is_reachable();
    ctx.emit(&serde_json::json!({ "reachable": reachable }), || {
        if reachable {
            "Remote endpoint reachable".to_string()
        } else {
            "Remote endpoint unreachable".to_string()
        }
    })?;
    if reachable {
        Ok(())
    } else {
        Err("remote endpoint unreachable".into())
    }
}
