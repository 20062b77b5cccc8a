use std::path::Path;
use std::time::Duration;

use crate::core::domain::Limits;
use crate::core::errors::ExecError;

/// How a finished process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(i32),
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        *self == ExitOutcome::Exited(0)
    }

    /// Shell convention: 128 + signal for signal deaths reported by a shell.
    pub fn looks_signaled(&self) -> bool {
        match self {
            ExitOutcome::Signaled(_) => true,
            ExitOutcome::Exited(code) => *code < 0 || *code > 128,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Finished(ExitOutcome),
    TimedOut,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellOutput {
    pub completion: Completion,
    pub stdout: String,
    pub stderr: String,
}

/// A child run under CPU and memory ceilings.
#[derive(Clone, Debug, PartialEq)]
pub struct LimitedRun {
    pub exit: ExitOutcome,
    /// The wall-clock guard fired and the child was killed.
    pub timed_out: bool,
    pub wall_time: Duration,
    pub peak_memory_kb: u64,
    pub killed_for_memory: bool,
    pub stdout: String,
    pub stderr: String,
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait Executor: std::fmt::Debug + Send + Sync {
    /// Runs `command` through the shell in `cwd`, killing it after `timeout`.
    async fn run_shell(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ShellOutput, ExecError>;

    /// Runs `args` directly (no shell) under `limits`, with memory watched
    /// for the lifetime of the child.
    async fn run_limited(
        &self,
        args: &[String],
        cwd: &Path,
        limits: &Limits,
    ) -> Result<LimitedRun, ExecError>;
}
