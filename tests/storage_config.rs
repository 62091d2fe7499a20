mod support;

use std::fs;

use braindump::board::Board;
use braindump::config::{Config, CONFIG_FILE};
use braindump::storage::{FileStorage, KeyValueStore, LoadSource, MemoryStorage};
use braindump::task::{Priority, Status, WELCOME_TITLE};
use braindump::version::APP_VERSION;
use support::{task, TestDataDir};

#[test]
fn fresh_directory_seeds_welcome_task() {
    let data = TestDataDir::new();
    let board = Board::open(&Config::default(), Box::new(FileStorage::new(data.path())));

    assert_eq!(board.load_source(), LoadSource::Seed);
    assert_eq!(board.tasks().len(), 1);
    assert_eq!(board.tasks()[0].title, WELCOME_TITLE);
    assert_eq!(data.read_tasks().len(), 1);
}

#[test]
fn legacy_data_is_migrated_and_left_in_place() -> Result<(), Box<dyn std::error::Error>> {
    let data = TestDataDir::new();
    let legacy = r#"[
        {"id": 7, "title": "Old task", "priority": "Urgent", "status": "Done", "tags": ["x", 3]},
        {"title": ""}
    ]"#;
    let legacy_path = data.write_file("zentask-data.json", legacy)?;

    let board = Board::open(&Config::default(), Box::new(FileStorage::new(data.path())));
    assert_eq!(board.load_source(), LoadSource::Legacy);

    let tasks = board.tasks();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id, "7");
    assert_eq!(tasks[0].priority, Priority::Medium);
    assert_eq!(tasks[0].status, Status::Done);
    assert_eq!(tasks[0].tags, vec!["x".to_string(), "3".to_string()]);
    assert_eq!(tasks[1].title, "Untitled Task");

    assert_eq!(data.read_tasks(), tasks.to_vec());
    assert_eq!(fs::read_to_string(legacy_path)?, legacy);
    Ok(())
}

#[test]
fn corrupt_current_key_falls_back_to_legacy() -> Result<(), Box<dyn std::error::Error>> {
    let data = TestDataDir::new();
    data.write_file("braindump-data.json", "{not json")?;
    data.write_file("zentask-data.json", r#"[{"id": "keep", "title": "Kept"}]"#)?;

    let board = Board::open(&Config::default(), Box::new(FileStorage::new(data.path())));
    assert_eq!(board.load_source(), LoadSource::Legacy);
    assert_eq!(board.tasks()[0].id, "keep");
    Ok(())
}

#[test]
fn current_key_wins_over_legacy() -> Result<(), Box<dyn std::error::Error>> {
    let data = TestDataDir::new();
    data.write_file(
        "braindump-data.json",
        &serde_json::to_string(&[task("now", Status::Blocked)])?,
    )?;
    data.write_file("zentask-data.json", r#"[{"id": "old"}]"#)?;

    let board = Board::open(&Config::default(), Box::new(FileStorage::new(data.path())));
    assert_eq!(board.load_source(), LoadSource::Current);
    assert_eq!(board.tasks()[0].id, "now");
    Ok(())
}

#[test]
fn quota_exceeded_keeps_board_usable() {
    let storage = MemoryStorage::with_quota(8);
    let mut board = Board::open(&Config::default(), Box::new(storage));
    let id = board.tasks()[0].id.clone();

    assert!(board.change_status(&id, Status::Done).unwrap());
    assert_eq!(board.task(&id).unwrap().status, Status::Done);
}

#[test]
fn version_check_reports_updates() {
    let storage = MemoryStorage::new();
    storage.set("braindump-last-version", "0.0.1").unwrap();
    let board = Board::open(&Config::default(), Box::new(storage));

    let check = board.version();
    assert!(check.updated);
    assert_eq!(check.previous.as_deref(), Some("0.0.1"));
    assert!(!check.changelog().is_empty());
}

#[test]
fn version_is_recorded_on_open() {
    let data = TestDataDir::new();
    let config = Config::default();
    Board::open(&config, Box::new(FileStorage::new(data.path())));

    let reopened = Board::open(&config, Box::new(FileStorage::new(data.path())));
    assert!(!reopened.version().updated);
    assert_eq!(reopened.version().previous.as_deref(), Some(APP_VERSION));
}

#[test]
fn first_run_is_not_an_update() {
    let board = Board::open(&Config::default(), Box::new(MemoryStorage::new()));
    let check = board.version();
    assert!(!check.updated);
    assert!(check.changelog().is_empty());
}

#[test]
fn config_overrides_from_toml() -> Result<(), Box<dyn std::error::Error>> {
    let data = TestDataDir::new();
    data.write_config(
        r#"
[storage]
key = "tasks-v2"

[sync]
debounce_ms = 250

[archive]
undo_window_ms = 8000

[parser]
title_max_chars = 20
"#,
    )?;

    let config = Config::load_from_dir(data.path());
    assert_eq!(config.storage.key, "tasks-v2");
    assert_eq!(config.storage.legacy_key, "zentask-data");
    assert_eq!(config.sync.debounce_ms, 250);
    assert_eq!(config.archive.undo_window_ms, 8000);
    assert_eq!(config.parser.title_max_chars, 20);
    Ok(())
}

#[test]
fn invalid_config_falls_back_to_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let data = TestDataDir::new();
    data.write_config("[sync]\ndebounce_ms = 0\n")?;
    assert_eq!(Config::load_from_dir(data.path()).sync.debounce_ms, 1000);
    assert!(Config::load(&data.path().join(CONFIG_FILE)).is_err());
    Ok(())
}

#[test]
fn config_roundtrips_through_save() -> Result<(), Box<dyn std::error::Error>> {
    let data = TestDataDir::new();
    let path = data.path().join(CONFIG_FILE);
    let mut config = Config::default();
    config.parser.title_max_chars = 80;
    config.save(&path)?;
    assert_eq!(Config::load(&path)?.parser.title_max_chars, 80);
    Ok(())
}
