//! braindump - Brain Dump board library
//!
//! This library provides the synchronization core behind the braindump CLI:
//! a four-column kanban board fed by free text, persisted locally and
//! optionally mirrored to a per-user remote document.
//!
//! # Core Concepts
//!
//! - **Board**: the single owner of the task list; every mutation goes
//!   through it and is saved locally, then pushed remotely after a debounce
//! - **Migration**: untrusted stored or remote data is coerced into valid
//!   tasks instead of rejected
//! - **Echo suppression**: a change applied from the remote is never pushed
//!   back
//! - **Archive**: soft-delete with a short undo window for the latest archive
//! - **Drag**: hover moves a task between columns, drop reorders within one
//!
//! # Module Organization
//!
//! - `board`: the synchronization core and its event loop
//! - `store`: copy-on-write task list with identity-based change detection
//! - `task` / `migrate`: the task model and total migration of raw JSON
//! - `storage`: key-value backends and the local load/save chain
//! - `remote`: remote document stores and live subscriptions
//! - `sync`: debounced push scheduling with echo suppression
//! - `archive` / `drag`: undo window and drag reconciliation
//! - `parser`: free text to task fields
//! - `events` / `output`: board events and CLI output envelopes
//! - `config` / `error` / `lock`: configuration, errors, file locking

pub mod archive;
pub mod board;
pub mod cli;
pub mod config;
pub mod drag;
pub mod error;
pub mod events;
pub mod lock;
pub mod migrate;
pub mod output;
pub mod parser;
pub mod remote;
pub mod storage;
pub mod store;
pub mod sync;
pub mod task;
pub mod version;

pub use error::{Error, Result};
