//! Free text to task fields.
//!
//! The model call itself is behind [`CompletionSource`]. Without a source
//! the parser truncates deterministically; with one, the response text must
//! be a JSON object carrying every task field. [`CommandCompletion`] plugs
//! an external program in as the source.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ParserConfig;
use crate::error::{Error, Result};
use crate::task::{Priority, Status, TaskFields};

pub const FALLBACK_TITLE: &str = "New Task";
pub const FALLBACK_TAG: &str = "Manual";

#[async_trait]
pub trait TaskParser: Send + Sync {
    async fn parse(&self, input: &str) -> Result<TaskFields>;
}

/// The opaque language-model call. `Ok(None)` means no response text.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    async fn complete(&self, input: &str) -> Result<Option<String>>;
}

/// Completion by an external program: the text goes to stdin, the response
/// is whatever it prints on stdout.
#[derive(Debug, Clone)]
pub struct CommandCompletion {
    program: String,
    args: Vec<String>,
}

impl CommandCompletion {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The configured command, if any.
    pub fn from_config(config: &ParserConfig) -> Option<Self> {
        let (program, args) = config.command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

#[async_trait]
impl CompletionSource for CommandCompletion {
    async fn complete(&self, input: &str) -> Result<Option<String>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| Error::Parse(format!("failed to run {}: {err}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(input.as_bytes()).await {
                debug!(program = %self.program, error = %err, "completion command closed stdin early");
            }
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Parse(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        debug!(program = %self.program, bytes = output.stdout.len(), "completion received");
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok(Some(text).filter(|text| !text.trim().is_empty()))
    }
}

/// Deterministic parser used when no model is configured.
#[derive(Debug, Clone)]
pub struct TruncatingParser {
    title_max_chars: usize,
}

impl TruncatingParser {
    pub fn new(title_max_chars: usize) -> Self {
        Self { title_max_chars }
    }

    pub fn fields(&self, input: &str) -> TaskFields {
        let mut chars = input.chars();
        let mut title: String = chars.by_ref().take(self.title_max_chars).collect();
        if chars.next().is_some() {
            title.push_str("...");
        }
        TaskFields {
            title,
            description: input.to_string(),
            priority: Priority::Medium,
            status: Status::ToDo,
            tags: Vec::new(),
            dependencies: Vec::new(),
            blockers: Vec::new(),
        }
    }
}

#[async_trait]
impl TaskParser for TruncatingParser {
    async fn parse(&self, input: &str) -> Result<TaskFields> {
        Ok(self.fields(input))
    }
}

/// Model-backed parser that degrades to truncation when no source is set.
#[derive(Clone)]
pub struct ModelParser {
    source: Option<Arc<dyn CompletionSource>>,
    fallback: TruncatingParser,
}

impl ModelParser {
    pub fn new(source: Option<Arc<dyn CompletionSource>>, title_max_chars: usize) -> Self {
        Self {
            source,
            fallback: TruncatingParser::new(title_max_chars),
        }
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        let source = CommandCompletion::from_config(config)
            .map(|command| Arc::new(command) as Arc<dyn CompletionSource>);
        Self::new(source, config.title_max_chars)
    }
}

#[async_trait]
impl TaskParser for ModelParser {
    async fn parse(&self, input: &str) -> Result<TaskFields> {
        let Some(source) = &self.source else {
            return Ok(self.fallback.fields(input));
        };
        let text = source
            .complete(input)
            .await?
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| Error::Parse("no response text generated".to_string()))?;
        parse_response(&text).inspect_err(|err| warn!(error = %err, "model response rejected"))
    }
}

/// Post-process a model response into task fields.
pub fn parse_response(text: &str) -> Result<TaskFields> {
    serde_json::from_str(text.trim()).map_err(|err| Error::Parse(err.to_string()))
}

/// Fields used when parsing fails, so the user's text is never lost.
pub fn generic_fallback(input: &str) -> TaskFields {
    TaskFields {
        title: FALLBACK_TITLE.to_string(),
        description: input.to_string(),
        priority: Priority::Medium,
        status: Status::ToDo,
        tags: vec![FALLBACK_TAG.to_string()],
        dependencies: Vec::new(),
        blockers: Vec::new(),
    }
}
