//! Repair of untrusted task records.
//!
//! Stored and remote data may come from an older schema or be corrupted.
//! [`migrate_task`] is total: any JSON value yields a valid [`Task`].
//!
//! Field rules:
//! - `id`: kept when truthy (non-empty string or non-zero number), else a new id
//! - `title`: kept when truthy, else `"Untitled Task"`
//! - `description`: kept when a string or number, else empty
//! - `priority` / `status`: exact label match, else Medium / To Do
//! - `tags` / `dependencies` / `blockers`: arrays only; string items kept,
//!   numbers and booleans stringified, anything else dropped
//! - `createdAt`: kept when a non-empty string, else now
//! - `isArchived`: truthiness of the stored value
//!
//! At list level, a record whose id was already taken by an earlier record
//! gets a fresh id.

use std::collections::HashSet;

use serde_json::Value;

use crate::task::{new_task_id, now_timestamp, Priority, Status, Task};

pub const UNTITLED: &str = "Untitled Task";

/// Repair a single raw record into a valid task. Never fails.
pub fn migrate_task(raw: &Value) -> Task {
    let field = |name: &str| raw.as_object().and_then(|map| map.get(name));

    Task {
        id: field("id").and_then(truthy_text).unwrap_or_else(new_task_id),
        title: field("title")
            .and_then(truthy_text)
            .unwrap_or_else(|| UNTITLED.to_string()),
        description: field("description").and_then(text).unwrap_or_default(),
        priority: field("priority")
            .and_then(Value::as_str)
            .and_then(Priority::from_label)
            .unwrap_or(Priority::Medium),
        status: field("status")
            .and_then(Value::as_str)
            .and_then(Status::from_label)
            .unwrap_or(Status::ToDo),
        tags: string_list(field("tags")),
        dependencies: string_list(field("dependencies")),
        blockers: string_list(field("blockers")),
        created_at: field("createdAt")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(now_timestamp),
        is_archived: field("isArchived").map(truthy).unwrap_or(false),
    }
}

/// Repair a stored task list. Returns `None` when the value is not a list.
pub fn migrate_tasks(raw: &Value) -> Option<Vec<Task>> {
    raw.as_array().map(|items| migrate_list(items))
}

/// Repair every record of a list, keeping ids unique.
pub fn migrate_list(items: &[Value]) -> Vec<Task> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .map(|raw| {
            let mut task = migrate_task(raw);
            while !seen.insert(task.id.clone()) {
                task.id = new_task_id();
            }
            task
        })
        .collect()
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truthy_text(value: &Value) -> Option<String> {
    if truthy(value) {
        text(value)
    } else {
        None
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .collect()
}
