//! Board events and their JSONL output.
//!
//! The board queues a [`BoardEvent`] for everything a UI would react to
//! (celebration, undo toast, sync indicator, notices). Callers drain the
//! queue; the CLI can also write events as JSON lines to stdout or a file.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use ulid::Ulid;

use crate::error::Result;
use crate::task::Status;

pub const EVENT_SCHEMA_VERSION: &str = "braindump.event.v1";

#[derive(Debug, Clone)]
pub enum EventDestination {
    Stdout,
    File(PathBuf),
}

impl EventDestination {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(EventDestination::Stdout);
            }
            Some(EventDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<EventSink> {
        match self {
            EventDestination::Stdout => Ok(EventSink::stdout()),
            EventDestination::File(path) => EventSink::file(path),
        }
    }
}

/// Something the board did that a UI would surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BoardEvent {
    TaskAdded {
        task_id: String,
    },
    StatusChanged {
        task_id: String,
        from: Status,
        to: Status,
    },
    /// A task reached Done from another column.
    Celebrate {
        task_id: String,
    },
    TaskArchived {
        task_id: String,
    },
    /// Undo toast shown for the last archived task.
    UndoOffered {
        task_id: String,
    },
    /// Undo toast hidden without an undo.
    UndoClosed {
        task_id: String,
    },
    TaskRestored {
        task_id: String,
    },
    TaskDeleted {
        task_id: String,
    },
    Reordered {
        status: Status,
    },
    RemoteApplied {
        count: usize,
    },
    /// Another process rewrote local storage; the board now mirrors it.
    LocalReloaded {
        count: usize,
    },
    Pushed {
        count: usize,
    },
    SyncFailed {
        message: String,
    },
    /// One-off user-facing message.
    Notice {
        message: String,
    },
}

/// A board event wrapped for JSONL output.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub schema_version: &'static str,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(flatten)]
    pub body: BoardEvent,
}

impl Event {
    pub fn new(body: BoardEvent, user: Option<String>) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            event_id: Ulid::new().to_string(),
            timestamp: Utc::now(),
            user,
            body,
        }
    }
}

/// Event sink that writes JSONL output to a destination.
pub struct EventSink {
    writer: Box<dyn Write + Send>,
}

impl EventSink {
    /// Emit events to stdout.
    pub fn stdout() -> Self {
        Self {
            writer: Box::new(std::io::stdout()),
        }
    }

    /// Emit events to a file, appending.
    pub fn file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Box::new(file),
        })
    }

    /// Write a single event as JSONL.
    pub fn emit(&mut self, event: &Event) -> Result<()> {
        let serialized = serde_json::to_vec(event)?;
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn emit_all(
        &mut self,
        events: impl IntoIterator<Item = BoardEvent>,
        user: Option<&str>,
    ) -> Result<()> {
        for body in events {
            self.emit(&Event::new(body, user.map(str::to_string)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_parsing() {
        assert!(EventDestination::parse(None).is_none());
        assert!(EventDestination::parse(Some("  ")).is_none());
        assert!(matches!(
            EventDestination::parse(Some("-")),
            Some(EventDestination::Stdout)
        ));
        assert!(matches!(
            EventDestination::parse(Some("events.jsonl")),
            Some(EventDestination::File(_))
        ));
    }

    #[test]
    fn event_envelope_flattens_body() {
        let event = Event::new(
            BoardEvent::StatusChanged {
                task_id: "a".into(),
                from: Status::ToDo,
                to: Status::Done,
            },
            Some("u1".into()),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["schema_version"], EVENT_SCHEMA_VERSION);
        assert_eq!(value["event"], "status_changed");
        assert_eq!(value["to"], "Done");
        assert_eq!(value["user"], "u1");
    }

    #[test]
    fn file_sink_appends_lines() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("events.jsonl");
        let mut sink = EventSink::file(&path).unwrap();
        sink.emit_all(
            vec![
                BoardEvent::Celebrate { task_id: "a".into() },
                BoardEvent::Notice { message: "hi".into() },
            ],
            None,
        )
        .unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"celebrate\""));
    }
}
