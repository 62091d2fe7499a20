//! Task records for the board.
//!
//! A task is the only persisted entity. Its JSON shape (camelCase field names,
//! display-string enums) is shared by local storage and the remote document so
//! that either can be read back through [`crate::migrate`].

use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Title given to the seeded task on first run.
pub const WELCOME_TITLE: &str = "Welcome to Brain Dump";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }

    /// Exact match against the persisted label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Board column a task belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    #[serde(rename = "To Do")]
    ToDo,
    #[serde(rename = "In Progress")]
    InProgress,
    Blocked,
    Done,
}

impl Status {
    /// Columns in board order.
    pub const ALL: [Status; 4] = [
        Status::ToDo,
        Status::InProgress,
        Status::Blocked,
        Status::Done,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Status::ToDo => "To Do",
            Status::InProgress => "In Progress",
            Status::Blocked => "Blocked",
            Status::Done => "Done",
        }
    }

    /// Exact match against the persisted label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Status {
    type Err = Error;

    /// Lenient parse for user input: `todo`, `to-do`, `In Progress`,
    /// `in_progress`, `blocked`, `done`.
    fn from_str(raw: &str) -> Result<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "todo" => Ok(Status::ToDo),
            "inprogress" => Ok(Status::InProgress),
            "blocked" => Ok(Status::Blocked),
            "done" => Ok(Status::Done),
            _ => Err(Error::InvalidStatus(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    pub tags: Vec<String>,
    pub dependencies: Vec<String>,
    pub blockers: Vec<String>,
    /// ISO-8601, set once at creation.
    pub created_at: String,
    #[serde(default)]
    pub is_archived: bool,
}

impl Task {
    /// Build a fresh task from parsed fields with a new id and timestamp.
    pub fn from_fields(fields: TaskFields) -> Self {
        Self {
            id: new_task_id(),
            title: fields.title,
            description: fields.description,
            priority: fields.priority,
            status: fields.status,
            tags: fields.tags,
            dependencies: fields.dependencies,
            blockers: fields.blockers,
            created_at: now_timestamp(),
            is_archived: false,
        }
    }

    /// The task seeded when no stored data exists.
    pub fn welcome() -> Self {
        Self {
            id: "1".to_string(),
            title: WELCOME_TITLE.to_string(),
            description: "This is a sample task. Drag me between columns!".to_string(),
            priority: Priority::Low,
            status: Status::ToDo,
            tags: vec!["Onboarding".to_string()],
            dependencies: Vec::new(),
            blockers: Vec::new(),
            created_at: now_timestamp(),
            is_archived: false,
        }
    }

    pub fn is_visible(&self) -> bool {
        !self.is_archived
    }
}

/// Structured output of the text-parsing collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskFields {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    pub tags: Vec<String>,
    pub dependencies: Vec<String>,
    pub blockers: Vec<String>,
}

pub fn new_task_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time as an ISO-8601 string with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_as_display_label() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");
        let parsed: Status = serde_json::from_str("\"To Do\"").unwrap();
        assert_eq!(parsed, Status::ToDo);
    }

    #[test]
    fn task_uses_camel_case_fields() {
        let task = Task::welcome();
        let value = serde_json::to_value(&task).unwrap();
        assert!(value.get("createdAt").is_some());
        assert_eq!(value["isArchived"], serde_json::json!(false));
        assert_eq!(value["priority"], serde_json::json!("Low"));
    }

    #[test]
    fn lenient_status_parse() {
        assert_eq!("todo".parse::<Status>().unwrap(), Status::ToDo);
        assert_eq!("In Progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("in_progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("DONE".parse::<Status>().unwrap(), Status::Done);
        assert!(matches!(
            "later".parse::<Status>(),
            Err(Error::InvalidStatus(_))
        ));
    }

    #[test]
    fn label_lookup_is_exact() {
        assert_eq!(Status::from_label("Blocked"), Some(Status::Blocked));
        assert_eq!(Status::from_label("blocked"), None);
        assert_eq!(Priority::from_label("High"), Some(Priority::High));
        assert_eq!(Priority::from_label("urgent"), None);
    }

    #[test]
    fn from_fields_generates_unique_ids() {
        let fields = TaskFields {
            title: "a".to_string(),
            description: String::new(),
            priority: Priority::High,
            status: Status::Blocked,
            tags: vec![],
            dependencies: vec![],
            blockers: vec!["API down".to_string()],
        };
        let a = Task::from_fields(fields.clone());
        let b = Task::from_fields(fields);
        assert_ne!(a.id, b.id);
        assert!(!a.is_archived);
        assert_eq!(a.status, Status::Blocked);
    }
}
