#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command as StdCommand, Stdio};
use std::sync::Arc;

use assert_cmd::cargo::CommandCargoExt;
use assert_cmd::Command;
use braindump::board::Board;
use braindump::config::{Config, CONFIG_FILE};
use braindump::remote::MemoryRemote;
use braindump::storage::MemoryStorage;
use braindump::task::{Priority, Status, Task};
use serde_json::Value;
use tempfile::TempDir;

/// A temporary data directory driven through the CLI binary.
pub struct TestDataDir {
    dir: TempDir,
}

impl TestDataDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn remote_dir(&self) -> PathBuf {
        self.dir.path().join("remote")
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        self.write_file(CONFIG_FILE, contents)
    }

    pub fn braindump(&self) -> Command {
        let mut cmd = Command::cargo_bin("braindump").expect("binary");
        cmd.arg("--data-dir").arg(self.path());
        cmd.env_remove("BRAINDUMP_DIR");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Start a long-running command (such as `watch`) with piped output.
    pub fn spawn(&self, args: &[&str]) -> Child {
        StdCommand::cargo_bin("braindump")
            .expect("binary")
            .arg("--data-dir")
            .arg(self.path())
            .args(args)
            .env_remove("BRAINDUMP_DIR")
            .env_remove("RUST_LOG")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn braindump")
    }

    /// Run a command with `--json` and return the envelope's `data`.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self
            .braindump()
            .arg("--json")
            .args(args)
            .output()
            .expect("run braindump");
        assert!(
            output.status.success(),
            "braindump {args:?} failed: {}",
            String::from_utf8_lossy(&output.stdout)
        );
        let envelope: Value = serde_json::from_slice(&output.stdout).expect("json envelope");
        envelope["data"].clone()
    }

    pub fn read_tasks(&self) -> Vec<Task> {
        let contents = fs::read_to_string(self.path().join("braindump-data.json"))
            .expect("stored tasks");
        serde_json::from_str(&contents).expect("task list")
    }
}

/// Titles of the tasks in a remote directory's document for `user`.
pub fn remote_titles(remote_dir: &Path, user: &str) -> Vec<String> {
    let path = remote_dir.join("users").join(format!("{user}.json"));
    let contents = fs::read_to_string(path).expect("remote document");
    let document: Value = serde_json::from_str(&contents).expect("remote json");
    document["tasks"]
        .as_array()
        .expect("remote tasks")
        .iter()
        .filter_map(|task| task["title"].as_str().map(str::to_string))
        .collect()
}

pub fn titles(tasks: &[Task]) -> Vec<String> {
    tasks.iter().map(|t| t.title.clone()).collect()
}

pub fn task(id: &str, status: Status) -> Task {
    Task {
        id: id.to_string(),
        title: format!("Task {id}"),
        description: String::new(),
        priority: Priority::Medium,
        status,
        tags: Vec::new(),
        dependencies: Vec::new(),
        blockers: Vec::new(),
        created_at: "2024-01-01T00:00:00.000Z".to_string(),
        is_archived: false,
    }
}

pub fn ids(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.id.as_str()).collect()
}

/// A board over fresh in-memory storage, seeded with `tasks`, wired to `remote`.
pub fn memory_board(tasks: &[Task], remote: &MemoryRemote) -> Board {
    let storage = MemoryStorage::new();
    let seeded = serde_json::to_string(tasks).expect("serialize tasks");
    braindump::storage::KeyValueStore::set(&storage, "braindump-data", &seeded)
        .expect("seed storage");
    Board::open(&Config::default(), Box::new(storage)).with_remote(Arc::new(remote.clone()))
}
