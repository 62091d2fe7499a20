use std::collections::HashSet;

use braindump::migrate::{migrate_task, migrate_tasks, UNTITLED};
use braindump::task::{Priority, Status};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        any::<f64>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(|f| json!(f)),
        ".{0,12}".prop_map(Value::String),
        prop_oneof![
            Just("To Do"),
            Just("In Progress"),
            Just("Blocked"),
            Just("Done"),
            Just("High"),
            Just("Low"),
        ]
        .prop_map(|s| Value::String(s.to_string())),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(".{0,8}", inner, 0..6)
                .prop_map(|entries| Value::Object(entries.into_iter().collect())),
        ]
    })
}

/// Objects that use the task field names with arbitrary values.
fn arb_record() -> impl Strategy<Value = Value> {
    let fields = [
        "id",
        "title",
        "description",
        "priority",
        "status",
        "tags",
        "dependencies",
        "blockers",
        "createdAt",
        "isArchived",
    ];
    prop::collection::vec(arb_json(), fields.len()).prop_map(move |values| {
        let map: Map<String, Value> = fields
            .iter()
            .map(|f| f.to_string())
            .zip(values)
            .collect();
        Value::Object(map)
    })
}

proptest! {
    #[test]
    fn any_value_yields_a_valid_task(raw in prop_oneof![arb_json(), arb_record()]) {
        let task = migrate_task(&raw);
        prop_assert!(!task.id.is_empty());
        prop_assert!(!task.title.is_empty());
        prop_assert!(!task.created_at.is_empty());
        prop_assert!(Status::ALL.contains(&task.status));
        prop_assert!(Priority::ALL.contains(&task.priority));
    }

    #[test]
    fn migration_is_idempotent(raw in arb_record()) {
        let once = migrate_task(&raw);
        let again = migrate_task(&serde_json::to_value(&once).unwrap());
        prop_assert_eq!(once, again);
    }

    #[test]
    fn lists_keep_their_length(items in prop::collection::vec(arb_record(), 0..8)) {
        let migrated = migrate_tasks(&Value::Array(items.clone())).unwrap();
        prop_assert_eq!(migrated.len(), items.len());
    }

    #[test]
    fn list_ids_are_unique(items in prop::collection::vec(arb_record(), 0..8)) {
        let migrated = migrate_tasks(&Value::Array(items)).unwrap();
        let ids: HashSet<&str> = migrated.iter().map(|t| t.id.as_str()).collect();
        prop_assert_eq!(ids.len(), migrated.len());
    }
}

#[test]
fn non_list_is_not_a_task_list() {
    assert!(migrate_tasks(&json!({"tasks": []})).is_none());
    assert!(migrate_tasks(&json!("[]")).is_none());
}

#[test]
fn falsy_title_becomes_untitled() {
    for title in [json!(""), json!(0), json!(null), json!(false)] {
        let task = migrate_task(&json!({ "title": title }));
        assert_eq!(task.title, UNTITLED);
    }
}
