//! Command-line interface for braindump
//!
//! This module defines the CLI structure using clap derive macros.
//! Board commands live in `task`, remote commands in `sync`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::warn;

use crate::board::Board;
use crate::config::{self, Config};
use crate::error::Result;
use crate::events::{BoardEvent, EventDestination, EventSink};
use crate::output::OutputOptions;
use crate::storage::FileStorage;

mod sync;
mod task;

/// braindump - a kanban board fed by free text
///
/// Local-first task board with optional sync through a shared directory.
#[derive(Parser, Debug)]
#[command(name = "braindump")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory (defaults to the platform data directory)
    #[arg(long, global = true, env = "BRAINDUMP_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write board events as JSONL ("-" for stdout, or a file path)
    #[arg(long, global = true)]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a task from free text
    Add {
        /// What needs doing, in your own words
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// List tasks grouped by column
    List {
        /// Only show one column (e.g. "In Progress")
        #[arg(long)]
        status: Option<String>,

        /// Show archived tasks instead
        #[arg(long)]
        archived: bool,
    },

    /// Move a task to another column
    Move {
        /// Task ID
        id: String,
        /// Target status: "To Do", "In Progress", "Blocked", "Done"
        status: String,
    },

    /// Drag a task onto another task or a column
    Drop {
        /// Task ID to drag
        id: String,
        /// Task ID or column name to drop onto
        target: String,
    },

    /// Archive a task
    Archive {
        /// Task ID
        id: String,
    },

    /// Restore an archived task
    Restore {
        /// Task ID
        id: String,
    },

    /// Permanently delete an archived task
    Delete {
        /// Task ID
        id: String,
    },

    /// Archive every task in Done
    ClearDone,

    /// Sync once with a shared remote directory
    Sync {
        /// User ID owning the remote document
        #[arg(long, env = "BRAINDUMP_USER")]
        user: String,

        /// Shared remote directory
        #[arg(long, env = "BRAINDUMP_REMOTE_DIR")]
        remote_dir: PathBuf,
    },

    /// Keep the board in sync with a shared remote directory until interrupted
    Watch {
        /// User ID owning the remote document
        #[arg(long, env = "BRAINDUMP_USER")]
        user: String,

        /// Shared remote directory
        #[arg(long, env = "BRAINDUMP_REMOTE_DIR")]
        remote_dir: PathBuf,

        /// Stop after this many milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,
    },
}

/// Resolved global options shared by every command.
pub(crate) struct Context {
    pub data_dir: PathBuf,
    pub config: Config,
    pub output: OutputOptions,
    pub events: Option<EventSink>,
}

impl Context {
    fn resolve(cli: &Cli) -> Result<Self> {
        let data_dir = config::resolve_data_dir(cli.data_dir.clone())?;
        std::fs::create_dir_all(&data_dir)?;
        let config = Config::load_from_dir(&data_dir);
        let events = EventDestination::parse(cli.events.as_deref())
            .map(|dest| dest.open())
            .transpose()?;
        let events_to_stdout = matches!(
            EventDestination::parse(cli.events.as_deref()),
            Some(EventDestination::Stdout)
        );
        Ok(Self {
            data_dir,
            config,
            output: OutputOptions {
                json: cli.json && !events_to_stdout,
                quiet: cli.quiet || events_to_stdout,
            },
            events,
        })
    }

    pub fn file_storage(&self) -> FileStorage {
        FileStorage::new(&self.data_dir).with_lock_timeout(self.config.storage.lock_timeout_ms)
    }

    pub fn open_board(&self) -> Board {
        Board::open(&self.config, Box::new(self.file_storage()))
    }

    /// Write board events to the event sink, if any.
    pub fn forward_events(&mut self, events: Vec<BoardEvent>, user: Option<&str>) {
        if let Some(sink) = self.events.as_mut() {
            if let Err(err) = sink.emit_all(events, user) {
                warn!(error = %err, "failed to write events");
            }
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let mut ctx = Context::resolve(&self)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        runtime.block_on(async move {
            match self.command {
                Commands::Add { text } => task::run_add(&mut ctx, text.join(" ")).await,
                Commands::List { status, archived } => task::run_list(&mut ctx, status, archived),
                Commands::Move { id, status } => task::run_move(&mut ctx, &id, &status),
                Commands::Drop { id, target } => task::run_drop(&mut ctx, &id, &target),
                Commands::Archive { id } => task::run_archive(&mut ctx, &id),
                Commands::Restore { id } => task::run_restore(&mut ctx, &id),
                Commands::Delete { id } => task::run_delete(&mut ctx, &id),
                Commands::ClearDone => task::run_clear_done(&mut ctx),
                Commands::Sync { user, remote_dir } => {
                    sync::run_sync(&mut ctx, user, remote_dir).await
                }
                Commands::Watch {
                    user,
                    remote_dir,
                    duration_ms,
                } => sync::run_watch(&mut ctx, user, remote_dir, duration_ms).await,
            }
        })
    }
}
