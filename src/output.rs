//! CLI output: a JSON envelope on stdout, or a short human report.
//!
//! Every `--json` response has the same outer shape:
//!
//! ```json
//! { "schema_version": "braindump.v1", "command": "add", "status": "success",
//!   "data": { ... }, "warnings": [ ... ], "next_steps": [ ... ] }
//! ```
//!
//! Failures replace `data` with an `error` object and set `"status": "error"`.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

pub const SCHEMA_VERSION: &str = "braindump.v1";

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Human report for one command: a header line, aligned key/value pairs,
/// free-form lines, then warnings and suggested follow-up commands.
#[derive(Debug, Clone, Default)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Self::default()
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, line: impl Into<String>) {
        self.details.push(line.into());
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn push_next_step(&mut self, command: impl Into<String>) {
        self.next_steps.push(command.into());
    }
}

impl fmt::Display for HumanOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header)?;
        let width = self.summary.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        for (key, value) in &self.summary {
            write!(f, "\n  {key:<width$}  {value}")?;
        }
        if !self.details.is_empty() {
            f.write_str("\n")?;
            for line in &self.details {
                write!(f, "\n  {line}")?;
            }
        }
        for warning in &self.warnings {
            write!(f, "\nwarning: {warning}")?;
        }
        for step in &self.next_steps {
            write!(f, "\nnext: {step}")?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct Envelope<'a, B: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    #[serde(flatten)]
    body: B,
    #[serde(skip_serializing_if = "nothing")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "nothing")]
    next_steps: &'a [String],
}

fn nothing(items: &&[String]) -> bool {
    items.is_empty()
}

#[derive(Serialize)]
struct Success<'a, T: Serialize> {
    data: &'a T,
}

#[derive(Serialize)]
struct Failure<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

fn print_json<B: Serialize>(envelope: &Envelope<'_, B>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

/// Report a successful command in the format `options` selects.
pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let (warnings, next_steps) = human
            .map(|h| (h.warnings.as_slice(), h.next_steps.as_slice()))
            .unwrap_or_default();
        return print_json(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            body: Success { data },
            warnings,
            next_steps,
        });
    }
    match human {
        Some(human) if !options.quiet => println!("{human}"),
        _ => {}
    }
    Ok(())
}

/// Report a failed command: an error envelope on stdout with `--json`,
/// otherwise the message and one hint on stderr.
pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let next_steps = error_next_steps(err);
    if json {
        let message = err.to_string();
        return print_json(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            body: Failure {
                error: ErrorBody {
                    message: &message,
                    code: err.exit_code(),
                    kind: error_kind(err),
                    details: err.details(),
                },
            },
            warnings: &[],
            next_steps: &next_steps,
        });
    }

    eprintln!("error: {err}");
    if let Some(hint) = next_steps.first() {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

/// Best-effort command name for error envelopes, read before clap parses.
pub fn infer_command_name_from_args() -> String {
    infer_command_name(std::env::args().skip(1))
}

fn infer_command_name(args: impl IntoIterator<Item = String>) -> String {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--data-dir" | "--events" => {
                args.next();
            }
            flag if flag.starts_with('-') => {}
            _ => return arg,
        }
    }
    "braindump".to_string()
}

fn error_kind(err: &Error) -> &'static str {
    match err.exit_code() {
        2 => "user_error",
        3 => "policy_blocked",
        _ => "operation_failed",
    }
}

fn error_next_steps(err: &Error) -> Vec<String> {
    let step = match err {
        Error::TaskNotFound(_) => "braindump list --archived".to_string(),
        Error::NotArchived(id) => format!("braindump archive {id}"),
        Error::InvalidStatus(_) => "use one of: To Do, In Progress, Blocked, Done".to_string(),
        Error::RemoteNotConfigured => "pass --remote-dir <dir>".to_string(),
        Error::InvalidConfig(_) => "fix braindump.toml then retry".to_string(),
        Error::LockFailed(_) => "retry once other braindump processes finish".to_string(),
        _ => return Vec::new(),
    };
    vec![step]
}
