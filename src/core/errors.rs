use std::path::PathBuf;

use thiserror::Error;

/// Configuration and materialization failures, all discovered before any
/// process is spawned.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid {kind} identifier: {value:?}")]
    InvalidIdentifier { kind: &'static str, value: String },
    #[error("Harness directory not found: {}", .0.display())]
    HarnessNotFound(PathBuf),
    #[error("runner.json not found in {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("failed to parse {}: {msg}", .path.display())]
    Malformed { path: PathBuf, msg: String },
    #[error("invalid harness config {}: {msg}", .path.display())]
    Invalid { path: PathBuf, msg: String },
    #[error("failed to prepare working directory: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unbalanced quotes in command template: {0}")]
    Unbalanced(String),
    #[error("command template is empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("failed to start {program}: {msg}")]
    Spawn { program: String, msg: String },
    #[error("failed to wait for process: {msg}")]
    Wait { msg: String },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid report glob {pattern:?}: {msg}")]
    Pattern { pattern: String, msg: String },
    #[error("failed to read report {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed report {}: {msg}", .path.display())]
    Malformed { path: PathBuf, msg: String },
}
