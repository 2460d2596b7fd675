//! Task editing and listing commands.

use super::{CommandResult, Context};
use tasksync_engine::{NewTask, SyncStatus, Task, TaskPatch};

/// Runs the add command.
pub fn add(
    ctx: &Context,
    title: String,
    description: Option<String>,
    completed: bool,
) -> CommandResult {
    let task = ctx.tasks.create(NewTask {
        title: Some(title),
        description,
        completed: Some(completed),
    })?;
    ctx.emit(&task, || format!("Created {}", task.id))
}

/// Runs the update command.
pub fn update(
    ctx: &Context,
    id: &str,
    title: Option<String>,
    description: Option<String>,
    completed: Option<bool>,
) -> CommandResult {
    let task = ctx.tasks.update(
        id,
        TaskPatch {
            title,
            description,
            completed,
        },
    )?;
    ctx.emit(&task, || format_task(&task))
}

/// Runs the delete command.
pub fn delete(ctx: &Context, id: &str) -> CommandResult {
    ctx.tasks.delete(id)?;
    ctx.emit(&serde_json::json!({ "deleted": id }), || format!("Deleted {id}"))
}

/// Runs the list command.
pub fn list(ctx: &Context, pending_only: bool) -> CommandResult {
    let tasks = if pending_only {
        ctx.tasks.needing_sync()?
    } else {
        ctx.tasks.list()?
    };
    ctx.emit(&tasks, || {
        if tasks.is_empty() {
            "No tasks".to_string()
        } else {
            tasks.iter().map(format_task).collect::<Vec<_>>().join("\n")
        }
    })
}

/// Runs the show command.
pub fn show(ctx: &Context, id: &str) -> CommandResult {
    let task = ctx.tasks.get(id)?;
    ctx.emit(&task, || format_details(&task))
}

/// One-line summary of a task.
pub fn format_task(task: &Task) -> String {
    let mark = if task.completed { "x" } else { " " };
    let flag = match task.sync_status {
        SyncStatus::Synced => "",
        SyncStatus::Pending => "  (pending)",
        SyncStatus::Error => "  (sync error)",
    };
    format!("[{mark}] {}  {}{flag}", task.id, task.title)
}

fn format_details(task: &Task) -> String {
    let mut lines = vec![
        format!("id:          {}", task.id),
        format!("title:       {}", task.title),
    ];
    if let Some(description) = &task.description {
        lines.push(format!("description: {description}"));
    }
    lines.push(format!("completed:   {}", task.completed));
    lines.push(format!("sync status: {}", task.sync_status));
    if let Some(server_id) = &task.server_id {
        lines.push(format!("server id:   {server_id}"));
    }
    lines.push(format!("updated:     {}", task.updated_at.to_rfc3339()));
    if let Some(synced) = task.last_synced_at {
        lines.push(format!("last synced: {}", synced.to_rfc3339()));
    }
    if task.is_deleted {
        lines.push("deleted:     true".to_string());
    }
    lines.join("\n")
}
