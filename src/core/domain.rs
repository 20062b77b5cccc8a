use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CPU_HARD_LIMIT_GRACE_SECS, DEFAULT_MEMORY_MB, DEFAULT_RUN_TIMEOUT, DEFAULT_TIME_SECONDS,
    TEST_ID_PLACEHOLDER, WALL_CLOCK_GRACE,
};
use crate::core::errors::TemplateError;

/// What the caller asks the engine to do.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub problem: String,
    pub language: String,
    pub solution_code: String,
    /// Applies to the batch test command and to the per-test setup command.
    pub timeout: Duration,
    /// Falls back to batch mode when the harness declares no single-test command.
    pub per_test: bool,
}

impl RunRequest {
    pub fn new(problem: &str, language: &str, solution_code: &str) -> Self {
        RunRequest {
            problem: problem.to_string(),
            language: language.to_string(),
            solution_code: solution_code.to_string(),
            timeout: DEFAULT_RUN_TIMEOUT,
            per_test: true,
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub fn batch(self) -> Self {
        Self {
            per_test: false,
            ..self
        }
    }
}

/// Harness descriptor, loaded from `runner.json`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    pub solution_file: PathBuf,
    pub setup_command: Option<String>,
    pub test_command: Option<String>,
    pub single_test_command: Option<CommandTemplate>,
    pub report_glob: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub time_seconds: u64,
    pub memory_mb: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            time_seconds: DEFAULT_TIME_SECONDS,
            memory_mb: DEFAULT_MEMORY_MB,
        }
    }
}

impl Limits {
    pub fn cpu_soft_secs(&self) -> u64 {
        self.time_seconds
    }

    pub fn cpu_hard_secs(&self) -> u64 {
        self.time_seconds.saturating_add(CPU_HARD_LIMIT_GRACE_SECS)
    }

    pub fn wall_timeout(&self) -> Duration {
        Duration::from_secs(self.time_seconds).saturating_add(WALL_CLOCK_GRACE)
    }

    pub fn memory_limit_kb(&self) -> u64 {
        self.memory_mb.saturating_mul(1024)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestId {
    Int(i64),
    Str(String),
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestId::Int(id) => write!(f, "{}", id),
            TestId::Str(id) => f.write_str(id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TestCase {
    pub id: TestId,
}

impl TestCase {
    pub fn name(&self) -> String {
        format!("test_{}", self.id)
    }
}

/// Problem manifest, loaded from `testcases.json`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    pub limits: Limits,
    pub tests: Vec<TestCase>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    TestId,
}

/// Per-test command, split into argv words once at load time.
///
/// The test id is substituted into already-split words, so an id containing
/// whitespace or quotes stays inside the word it was placed in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandTemplate {
    words: Vec<Vec<Segment>>,
}

impl CommandTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let words = shlex::split(raw).ok_or_else(|| TemplateError::Unbalanced(raw.to_string()))?;
        if words.is_empty() {
            return Err(TemplateError::Empty);
        }

        let words = words
            .iter()
            .map(|word| {
                let mut segments = Vec::new();
                for (idx, part) in word.split(TEST_ID_PLACEHOLDER).enumerate() {
                    if idx > 0 {
                        segments.push(Segment::TestId);
                    }
                    if !part.is_empty() {
                        segments.push(Segment::Literal(part.to_string()));
                    }
                }
                segments
            })
            .collect();

        Ok(CommandTemplate { words })
    }

    pub fn has_placeholder(&self) -> bool {
        self.words
            .iter()
            .flatten()
            .any(|segment| *segment == Segment::TestId)
    }

    pub fn render(&self, id: &TestId) -> Vec<String> {
        let id = id.to_string();
        self.words
            .iter()
            .map(|segments| {
                segments
                    .iter()
                    .map(|segment| match segment {
                        Segment::Literal(text) => text.as_str(),
                        Segment::TestId => id.as_str(),
                    })
                    .collect()
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Timeout,
    BuildError,
    RuntimeError,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TestOutcome {
    pub name: String,
    pub verdict: Verdict,
    pub time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
    pub message: Option<String>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub time_seconds: f64,
}

impl Summary {
    /// `errors` is only tracked for batch reports; per-test runs pass zero.
    pub fn from_outcomes(outcomes: &[TestOutcome], errors: usize) -> Self {
        let total = outcomes.len();
        let passed = outcomes.iter().filter(|outcome| outcome.passed()).count();
        let time = outcomes.iter().map(|outcome| outcome.time_seconds).sum();

        Summary {
            total,
            passed,
            failed: total - passed,
            errors,
            time_seconds: round_to(time, 3),
        }
    }
}

/// The only thing the engine hands back to its callers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub tests: Vec<TestOutcome>,
    pub summary: Summary,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    pub fn error(status: RunStatus, message: impl Into<String>) -> Self {
        Self::without_tests(status, String::new(), message.into())
    }

    pub fn without_tests(status: RunStatus, stdout: String, stderr: String) -> Self {
        RunResult {
            status,
            tests: Vec::new(),
            summary: Summary::default(),
            stdout,
            stderr,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.status == RunStatus::Completed && self.summary.passed == self.summary.total
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
