//! braindump sync commands
//!
//! `sync` signs in once against a shared directory and reconciles the board:
//! local edits made since the last sync are pushed, otherwise the remote list
//! is adopted. `watch` keeps the session open until Ctrl-C or `--duration-ms`
//! elapses, applying remote writes as they land and pushing edits that other
//! `braindump` commands write to the same data directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::board::{Board, BoardCommand};
use crate::cli::Context;
use crate::error::{Error, Result};
use crate::events::BoardEvent;
use crate::output::{emit_success, HumanOutput};
use crate::remote::{DirectoryRemote, Identity};

#[derive(Serialize)]
struct SyncReport {
    user: String,
    remote_dir: PathBuf,
    tasks: usize,
    adopted_remote: bool,
    uploaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_synced: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct WatchReport {
    user: String,
    remote_dir: PathBuf,
    remote_updates: usize,
    local_reloads: usize,
    pushes: usize,
    failures: usize,
}

async fn signed_in_board(ctx: &Context, user: &str, remote_dir: &Path) -> Result<Board> {
    std::fs::create_dir_all(remote_dir)?;
    let remote = Arc::new(DirectoryRemote::new(remote_dir));
    let mut board = ctx.open_board().with_remote(remote);
    board.sign_in(Identity::new(user)).await?;
    Ok(board)
}

fn first_failure(events: &[BoardEvent]) -> Option<String> {
    events.iter().find_map(|event| match event {
        BoardEvent::SyncFailed { message } => Some(message.clone()),
        _ => None,
    })
}

pub async fn run_sync(ctx: &mut Context, user: String, remote_dir: PathBuf) -> Result<()> {
    let mut board = signed_in_board(ctx, &user, &remote_dir).await?;
    // Consume the subscription's initial snapshot.
    board.tick().await;
    board.shutdown();

    let events = board.take_events();
    ctx.forward_events(events.clone(), Some(&user));
    if let Some(message) = first_failure(&events) {
        return Err(Error::Remote(message));
    }

    let adopted_remote = events
        .iter()
        .any(|event| matches!(event, BoardEvent::RemoteApplied { .. }));
    let uploaded = events
        .iter()
        .any(|event| matches!(event, BoardEvent::Pushed { .. }));

    let report = SyncReport {
        user: user.clone(),
        remote_dir: remote_dir.clone(),
        tasks: board.tasks().len(),
        adopted_remote,
        uploaded,
        last_synced: board.sync_status().last_synced,
    };

    let mut human = HumanOutput::new(format!("braindump sync: {user}"));
    human.push_summary("tasks", report.tasks.to_string());
    human.push_summary("remote", remote_dir.display().to_string());
    if adopted_remote {
        human.push_detail("local board replaced by remote tasks");
    }
    if uploaded {
        human.push_detail("local tasks uploaded");
    }
    human.push_next_step(format!(
        "braindump watch --user {user} --remote-dir {}",
        remote_dir.display()
    ));

    emit_success(ctx.output, "sync", &report, Some(&human))
}

pub async fn run_watch(
    ctx: &mut Context,
    user: String,
    remote_dir: PathBuf,
    duration_ms: Option<u64>,
) -> Result<()> {
    let mut board = signed_in_board(ctx, &user, &remote_dir).await?;
    let initial = board.take_events();
    if let Some(message) = first_failure(&initial) {
        ctx.forward_events(initial, Some(&user));
        return Err(Error::Remote(message));
    }
    ctx.forward_events(initial, Some(&user));

    let (tx, rx) = mpsc::channel(8);
    let reload = tx.clone();
    let local_watch = ctx
        .file_storage()
        .watch_key(&ctx.config.storage.key, move || {
            // A full channel already holds a reload or the shutdown.
            let _ = reload.try_send(BoardCommand::ReloadLocal);
        })?;
    let stop = tx.clone();
    tokio::spawn(async move {
        match duration_ms {
            Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            None => {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = %err, "failed to listen for ctrl-c");
                    return;
                }
            }
        }
        let _ = stop.send(BoardCommand::Flush).await;
        let _ = stop.send(BoardCommand::Shutdown).await;
    });
    info!(user = %user, remote = %remote_dir.display(), "watching remote");

    let mut report = WatchReport {
        user: user.clone(),
        remote_dir: remote_dir.clone(),
        remote_updates: 0,
        local_reloads: 0,
        pushes: 0,
        failures: 0,
    };
    board
        .run(rx, |event| {
            match &event {
                BoardEvent::RemoteApplied { .. } => report.remote_updates += 1,
                BoardEvent::LocalReloaded { .. } => report.local_reloads += 1,
                BoardEvent::Pushed { .. } => report.pushes += 1,
                BoardEvent::SyncFailed { .. } => report.failures += 1,
                _ => {}
            }
            ctx.forward_events(vec![event], Some(&user));
        })
        .await;
    drop(local_watch);
    drop(tx);

    let mut human = HumanOutput::new(format!("braindump watch: {user}"));
    human.push_summary("remote updates", report.remote_updates.to_string());
    human.push_summary("local edits", report.local_reloads.to_string());
    human.push_summary("pushes", report.pushes.to_string());
    if report.failures > 0 {
        human.push_warning(format!("{} sync failures (see RUST_LOG=braindump=debug)", report.failures));
    }

    emit_success(ctx.output, "watch", &report, Some(&human))
}
