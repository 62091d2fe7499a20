mod support;

use std::thread;
use std::time::Duration;

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use support::{remote_titles, titles, TestDataDir};

#[test]
fn braindump_help_works() {
    Command::cargo_bin("braindump")
        .expect("binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("kanban"));
}

#[test]
fn subcommand_help_works() {
    let subcommands = [
        "add",
        "list",
        "move",
        "drop",
        "archive",
        "restore",
        "delete",
        "clear-done",
        "sync",
        "watch",
    ];

    for cmd in subcommands {
        Command::cargo_bin("braindump")
            .expect("binary")
            .arg(cmd)
            .arg("--help")
            .assert()
            .success();
    }
}

#[test]
fn add_then_list_shows_task() {
    let data = TestDataDir::new();
    let added = data.json(&["add", "call", "the", "plumber"]);
    assert_eq!(added["task"]["title"], "call the plumber");
    assert_eq!(added["task"]["status"], "To Do");

    let listed = data.json(&["list"]);
    let titles: Vec<&str> = listed["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["call the plumber", "Welcome to Brain Dump"]);
}

#[test]
fn move_to_done_celebrates() {
    let data = TestDataDir::new();
    let moved = data.json(&["move", "1", "done"]);
    assert_eq!(moved["task"]["status"], "Done");
    assert_eq!(moved["celebrate"], true);

    let again = data.json(&["move", "1", "Done"]);
    assert!(again.get("celebrate").is_none());
}

#[test]
fn list_filters_by_status() {
    let data = TestDataDir::new();
    data.json(&["add", "write report"]);
    data.json(&["move", "1", "blocked"]);

    let blocked = data.json(&["list", "--status", "Blocked"]);
    assert_eq!(blocked["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(blocked["tasks"][0]["id"], "1");
}

#[test]
fn archive_restore_delete_flow() {
    let data = TestDataDir::new();

    data.braindump()
        .args(["delete", "1"])
        .assert()
        .code(3)
        .stderr(contains("not archived"));

    data.json(&["archive", "1"]);
    let archived = data.json(&["list", "--archived"]);
    assert_eq!(archived["tasks"].as_array().unwrap().len(), 1);

    data.json(&["restore", "1"]);
    assert_eq!(data.json(&["list"])["tasks"].as_array().unwrap().len(), 1);

    data.json(&["archive", "1"]);
    data.json(&["delete", "1"]);
    assert!(data.read_tasks().is_empty());
}

#[test]
fn clear_done_archives_completed() {
    let data = TestDataDir::new();
    data.json(&["move", "1", "done"]);
    let cleared = data.json(&["clear-done"]);
    assert_eq!(cleared["archived"], 1);
    assert!(data.read_tasks()[0].is_archived);
}

#[test]
fn drop_onto_column_moves_task() {
    let data = TestDataDir::new();
    let outcome = data.json(&["drop", "1", "in progress"]);
    assert_eq!(outcome["start_status"], "To Do");
    assert_eq!(outcome["final_status"], "In Progress");
    assert_eq!(outcome["completed"], false);
}

#[test]
fn unknown_task_is_a_user_error() {
    let data = TestDataDir::new();
    let output = data
        .braindump()
        .args(["--json", "move", "nope", "done"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(2));
    let envelope: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(envelope["status"], "error");
    assert_eq!(envelope["error"]["kind"], "user_error");
    assert_eq!(envelope["error"]["details"]["task_id"], "nope");
}

#[test]
fn invalid_status_is_rejected() {
    let data = TestDataDir::new();
    data.braindump()
        .args(["move", "1", "someday"])
        .assert()
        .code(2)
        .stderr(contains("Invalid status"));
}

#[test]
fn events_are_written_as_jsonl() {
    let data = TestDataDir::new();
    let events_path = data.path().join("events.jsonl");
    data.braindump()
        .args(["--events"])
        .arg(&events_path)
        .args(["move", "1", "done"])
        .assert()
        .success();

    let contents = std::fs::read_to_string(&events_path).expect("events");
    let kinds: Vec<String> = contents
        .lines()
        .map(|line| {
            let value: Value = serde_json::from_str(line).expect("event line");
            assert_eq!(value["schema_version"], "braindump.event.v1");
            value["event"].as_str().unwrap_or_default().to_string()
        })
        .collect();
    assert_eq!(kinds, vec!["status_changed", "celebrate"]);
}

#[test]
fn sync_shares_tasks_between_data_dirs() {
    let first = TestDataDir::new();
    let second = TestDataDir::new();
    let remote = first.remote_dir();
    let remote = remote.to_str().unwrap();

    first.json(&["add", "buy milk"]);
    let uploaded = first.json(&["sync", "--user", "u1", "--remote-dir", remote]);
    assert_eq!(uploaded["uploaded"], true);
    assert_eq!(uploaded["tasks"], 2);

    let adopted = second.json(&["sync", "--user", "u1", "--remote-dir", remote]);
    assert_eq!(adopted["adopted_remote"], true);
    let titles: Vec<String> = second
        .read_tasks()
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert!(titles.contains(&"buy milk".to_string()));
}

#[test]
fn sync_after_local_edit_pushes_instead_of_adopting() {
    let data = TestDataDir::new();
    let remote_dir = data.remote_dir();
    let remote = remote_dir.to_str().unwrap();

    data.json(&["sync", "--user", "u1", "--remote-dir", remote]);
    data.json(&["add", "call the plumber"]);

    let second = data.json(&["sync", "--user", "u1", "--remote-dir", remote]);
    assert_eq!(second["uploaded"], true);
    assert_eq!(second["adopted_remote"], false);
    assert_eq!(second["tasks"], 2);

    assert!(titles(&data.read_tasks()).contains(&"call the plumber".to_string()));
    assert!(remote_titles(&remote_dir, "u1").contains(&"call the plumber".to_string()));
}

#[test]
fn edits_travel_both_ways_between_data_dirs() {
    let laptop = TestDataDir::new();
    let phone = TestDataDir::new();
    let remote_dir = laptop.remote_dir();
    let remote = remote_dir.to_str().unwrap();
    let sync = ["sync", "--user", "u1", "--remote-dir", remote];

    laptop.json(&sync);
    phone.json(&sync);
    phone.json(&["add", "renew passport"]);
    phone.json(&sync);

    let pulled = laptop.json(&sync);
    assert_eq!(pulled["adopted_remote"], true);
    assert_eq!(pulled["uploaded"], false);
    assert!(titles(&laptop.read_tasks()).contains(&"renew passport".to_string()));

    // Nothing changed locally since, so another sync is a plain pull.
    let again = laptop.json(&sync);
    assert_eq!(again["uploaded"], false);
    assert_eq!(again["tasks"], 2);
}

#[test]
fn watch_pushes_edits_made_by_other_commands() {
    let data = TestDataDir::new();
    let remote_dir = data.remote_dir();
    let remote = remote_dir.to_str().unwrap();

    let watch = data.spawn(&[
        "--json",
        "watch",
        "--user",
        "u1",
        "--remote-dir",
        remote,
        "--duration-ms",
        "4000",
    ]);
    thread::sleep(Duration::from_millis(1500));
    data.json(&["add", "call the plumber"]);

    let output = watch.wait_with_output().expect("watch output");
    assert!(
        output.status.success(),
        "watch failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let envelope: Value = serde_json::from_slice(&output.stdout).expect("watch envelope");
    assert_eq!(envelope["command"], "watch");

    assert!(remote_titles(&remote_dir, "u1").contains(&"call the plumber".to_string()));
    assert!(titles(&data.read_tasks()).contains(&"call the plumber".to_string()));
}
