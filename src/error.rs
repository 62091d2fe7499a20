//! Error types for braindump
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (unknown task, bad arguments, bad config)
//! - 3: Blocked by board rules (deleting a task that is not archived)
//! - 4: Operation failed (storage, remote, parse, IO)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the braindump CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const POLICY_BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for board operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task id already in use: {0}")]
    DuplicateTask(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No drag gesture in progress")]
    NoActiveDrag,

    #[error("No remote store configured")]
    RemoteNotConfigured,

    // Board rules (exit code 3)
    #[error("Task is not archived: {0}")]
    NotArchived(String),

    // Operation failures (exit code 4)
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage quota exceeded writing {key} ({size} bytes)")]
    QuotaExceeded { key: String, size: usize },

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::TaskNotFound(_)
            | Error::DuplicateTask(_)
            | Error::InvalidStatus(_)
            | Error::InvalidArgument(_)
            | Error::InvalidConfig(_)
            | Error::NoActiveDrag
            | Error::RemoteNotConfigured => exit_codes::USER_ERROR,

            Error::NotArchived(_) => exit_codes::POLICY_BLOCKED,

            Error::Storage(_)
            | Error::QuotaExceeded { .. }
            | Error::Remote(_)
            | Error::Parse(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::Watch(_)
            | Error::LockFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for the JSON error envelope, when there are any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::TaskNotFound(id) | Error::DuplicateTask(id) | Error::NotArchived(id) => {
                Some(serde_json::json!({ "task_id": id }))
            }
            Error::QuotaExceeded { key, size } => {
                Some(serde_json::json!({ "key": key, "size": size }))
            }
            Error::LockFailed(path) => Some(serde_json::json!({ "path": path })),
            _ => None,
        }
    }
}

/// Result type alias for braindump operations
pub type Result<T> = std::result::Result<T, Error>;
