//! braindump board commands
//!
//! Each command opens the board from the data directory, applies one action,
//! and reports the result. Board events are forwarded to `--events`.

use serde::Serialize;

use crate::board::Board;
use crate::cli::Context;
use crate::drag::{DragOutcome, DropTarget};
use crate::error::{Error, Result};
use crate::events::BoardEvent;
use crate::output::{emit_success, HumanOutput};
use crate::task::{Status, Task};

#[derive(Serialize)]
struct TaskReport<'a> {
    task: &'a Task,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    celebrate: bool,
}

#[derive(Serialize)]
struct ListReport<'a> {
    archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<Status>,
    tasks: Vec<&'a Task>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    changelog: Vec<&'static str>,
}

#[derive(Serialize)]
struct ClearDoneReport {
    archived: usize,
}

fn summarize(human: &mut HumanOutput, task: &Task) {
    human.push_summary("id", task.id.clone());
    human.push_summary("status", task.status.label());
    human.push_summary("priority", task.priority.label());
    if !task.tags.is_empty() {
        human.push_summary("tags", task.tags.join(", "));
    }
}

fn celebrated(events: &[BoardEvent]) -> bool {
    events
        .iter()
        .any(|event| matches!(event, BoardEvent::Celebrate { .. }))
}

fn notices(events: &[BoardEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            BoardEvent::Notice { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Drain board events for the report, then hand them to the event sink.
fn finish(ctx: &mut Context, board: &mut Board) -> Vec<BoardEvent> {
    let events = board.take_events();
    ctx.forward_events(events.clone(), None);
    events
}

fn find(board: &Board, id: &str) -> Result<Task> {
    board
        .task(id)
        .cloned()
        .ok_or_else(|| Error::TaskNotFound(id.to_string()))
}

pub async fn run_add(ctx: &mut Context, text: String) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::InvalidArgument("task text cannot be empty".to_string()));
    }
    let mut board = ctx.open_board();
    let task = board.add_from_text(&text).await?;
    let events = finish(ctx, &mut board);

    let mut human = HumanOutput::new(format!("braindump add: {}", task.title));
    summarize(&mut human, &task);
    for notice in notices(&events) {
        human.push_warning(notice);
    }
    human.push_next_step(format!("braindump move {} \"In Progress\"", task.id));

    emit_success(
        ctx.output,
        "add",
        &TaskReport {
            task: &task,
            celebrate: false,
        },
        Some(&human),
    )
}

pub fn run_list(ctx: &mut Context, status: Option<String>, archived: bool) -> Result<()> {
    let status = status.map(|raw| raw.parse::<Status>()).transpose()?;
    let board = ctx.open_board();
    let version = board.version();

    let tasks: Vec<&Task> = if archived {
        board.archived_tasks()
    } else {
        match status {
            Some(status) => board.column(status),
            None => board.visible_tasks(),
        }
    }
    .into_iter()
    .filter(|task| status.map_or(true, |s| task.status == s))
    .collect();

    let header = if archived {
        format!("braindump: {} archived", tasks.len())
    } else {
        format!("braindump: {} tasks", tasks.len())
    };
    let mut human = HumanOutput::new(header);
    if archived {
        for task in &tasks {
            human.push_detail(format!("{} [{}] {}", task.id, task.status, task.title));
        }
    } else {
        for column in Status::ALL {
            if status.is_some_and(|s| s != column) {
                continue;
            }
            let count = tasks.iter().filter(|t| t.status == column).count();
            human.push_summary(column.label(), count.to_string());
            for task in tasks.iter().filter(|t| t.status == column) {
                human.push_detail(format!(
                    "{} [{}] {} ({})",
                    column,
                    task.priority.label(),
                    task.title,
                    task.id
                ));
            }
        }
    }
    if version.updated {
        human.push_warning(format!(
            "updated from {} to {}",
            version.previous.as_deref().unwrap_or("unknown"),
            version.current
        ));
        for entry in version.changelog() {
            human.push_detail(format!("new: {entry}"));
        }
    }

    let report = ListReport {
        archived,
        status,
        tasks,
        changelog: version.changelog().to_vec(),
    };
    emit_success(ctx.output, "list", &report, Some(&human))
}

pub fn run_move(ctx: &mut Context, id: &str, status: &str) -> Result<()> {
    let status: Status = status.parse()?;
    let mut board = ctx.open_board();
    let changed = board.change_status(id, status)?;
    let events = finish(ctx, &mut board);
    let task = find(&board, id)?;

    let header = if changed {
        format!("braindump move: {} -> {}", task.title, status)
    } else {
        format!("braindump move: {} already in {}", task.title, status)
    };
    let mut human = HumanOutput::new(header);
    summarize(&mut human, &task);
    let celebrate = celebrated(&events);
    if celebrate {
        human.push_detail("Task complete!");
        human.push_next_step(format!("braindump archive {}", task.id));
    }

    emit_success(
        ctx.output,
        "move",
        &TaskReport {
            task: &task,
            celebrate,
        },
        Some(&human),
    )
}

pub fn run_drop(ctx: &mut Context, id: &str, target: &str) -> Result<()> {
    let mut board = ctx.open_board();
    let target = DropTarget::resolve(target, board.store()).ok_or_else(|| {
        Error::InvalidArgument(format!("unknown drop target: {target}"))
    })?;

    board.drag_start(id)?;
    board.drag_over(&target)?;
    let outcome: DragOutcome = board.drag_end(Some(&target))?;
    finish(ctx, &mut board);

    let task = find(&board, id)?;
    let mut human = HumanOutput::new(format!(
        "braindump drop: {} ({} -> {})",
        task.title, outcome.start_status, outcome.final_status
    ));
    summarize(&mut human, &task);
    if outcome.reordered {
        human.push_detail("position updated");
    }
    if outcome.completed {
        human.push_detail("Task complete!");
    }

    emit_success(ctx.output, "drop", &outcome, Some(&human))
}

pub fn run_archive(ctx: &mut Context, id: &str) -> Result<()> {
    let mut board = ctx.open_board();
    let changed = board.archive(id)?;
    // The undo window does not outlive this process.
    board.dismiss_undo();
    finish(ctx, &mut board);
    let task = find(&board, id)?;

    let header = if changed {
        format!("braindump archive: {}", task.title)
    } else {
        format!("braindump archive: {} already archived", task.title)
    };
    let mut human = HumanOutput::new(header);
    summarize(&mut human, &task);
    human.push_next_step(format!("braindump restore {}", task.id));

    emit_success(
        ctx.output,
        "archive",
        &TaskReport {
            task: &task,
            celebrate: false,
        },
        Some(&human),
    )
}

pub fn run_restore(ctx: &mut Context, id: &str) -> Result<()> {
    let mut board = ctx.open_board();
    let changed = board.restore(id)?;
    finish(ctx, &mut board);
    let task = find(&board, id)?;

    let header = if changed {
        format!("braindump restore: {}", task.title)
    } else {
        format!("braindump restore: {} is not archived", task.title)
    };
    let mut human = HumanOutput::new(header);
    summarize(&mut human, &task);

    emit_success(
        ctx.output,
        "restore",
        &TaskReport {
            task: &task,
            celebrate: false,
        },
        Some(&human),
    )
}

pub fn run_delete(ctx: &mut Context, id: &str) -> Result<()> {
    let mut board = ctx.open_board();
    let removed = board.delete_forever(id)?;
    finish(ctx, &mut board);

    let mut human = HumanOutput::new(format!("braindump delete: {}", removed.title));
    human.push_summary("id", removed.id.clone());

    emit_success(
        ctx.output,
        "delete",
        &TaskReport {
            task: &removed,
            celebrate: false,
        },
        Some(&human),
    )
}

pub fn run_clear_done(ctx: &mut Context) -> Result<()> {
    let mut board = ctx.open_board();
    let archived = board.archive_done();
    finish(ctx, &mut board);

    let mut human = HumanOutput::new(format!("braindump clear-done: {archived} archived"));
    if archived > 0 {
        human.push_next_step("braindump list --archived");
    }

    emit_success(ctx.output, "clear-done", &ClearDoneReport { archived }, Some(&human))
}
