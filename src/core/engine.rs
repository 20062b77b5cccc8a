use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::constants::RUNNER_CONFIG_FILE;
use crate::core::{
    config::{self, Harness, LanguageInfo},
    domain::{CommandTemplate, Manifest, RunRequest, RunResult, RunStatus},
    errors::SetupError,
    pipeline::{batch::run_batch, per_test::run_per_test},
    traits::executor::Executor,
    workdir::WorkDir,
};
use crate::native::executor::NativeExecutor;

#[derive(Clone, Debug)]
enum Mode<'a> {
    PerTest(&'a CommandTemplate),
    Batch(&'a str),
}

/// Entry point shared by the CLI and any other front end.
///
/// Runs never share state: each gets its own working directory, which is gone
/// by the time [`Engine::run`] returns.
#[derive(Clone, Debug)]
pub struct Engine {
    executor: Arc<dyn Executor>,
    problems_dir: PathBuf,
    scratch_dir: Option<PathBuf>,
}

impl Engine {
    pub fn new<T: AsRef<Path>>(executor: Arc<dyn Executor>, problems_dir: T) -> Self {
        Engine {
            executor,
            problems_dir: problems_dir.as_ref().into(),
            scratch_dir: None,
        }
    }

    pub fn native<T: AsRef<Path>>(problems_dir: T) -> Self {
        Self::new(Arc::new(NativeExecutor::default()), problems_dir)
    }

    /// Working directories are created here instead of the system temp dir.
    pub fn with_scratch_dir<T: AsRef<Path>>(self, scratch_dir: T) -> Self {
        Self {
            scratch_dir: Some(scratch_dir.as_ref().into()),
            ..self
        }
    }

    pub async fn languages(&self, problem: &str) -> Result<Vec<LanguageInfo>, SetupError> {
        config::discover_languages(&self.problems_dir, problem).await
    }

    /// Never fails: configuration problems come back as `build_error`, and
    /// process failures are folded into the result.
    #[tracing::instrument(
        skip_all,
        fields(
            run_id = %Uuid::new_v4(),
            problem = %request.problem,
            language = %request.language,
            per_test = request.per_test
        )
    )]
    pub async fn run(&self, request: &RunRequest) -> RunResult {
        let result = match self.try_run(request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Run aborted before execution: {}", e);
                RunResult::error(RunStatus::BuildError, e.to_string())
            }
        };

        tracing::info!(
            status = ?result.status,
            total = result.summary.total,
            passed = result.summary.passed,
            time_seconds = result.summary.time_seconds,
            "Run finished"
        );
        result
    }

    async fn try_run(&self, request: &RunRequest) -> Result<RunResult, SetupError> {
        let harness =
            config::load_harness(&self.problems_dir, &request.problem, &request.language).await?;
        let manifest = config::load_manifest(&self.problems_dir, &request.problem).await?;
        let mode = select_mode(&harness, request.per_test)?;

        let work_dir = self.materialize(request, &harness).await?;
        let result = self.execute(&mode, &harness, &manifest, &work_dir, request).await;

        let root = work_dir.root().to_path_buf();
        if let Err(e) = work_dir.close() {
            tracing::warn!("Failed to remove {}: {}", root.display(), e);
        }

        Ok(result)
    }

    async fn materialize(
        &self,
        request: &RunRequest,
        harness: &Harness,
    ) -> Result<WorkDir, SetupError> {
        let scratch_dir = self.scratch_dir.clone();
        let prefix = format!("engine_{}_{}_", request.problem, request.language);
        let harness_dir = harness.dir.clone();
        let solution_file = harness.config.solution_file.clone();
        let solution_code = request.solution_code.clone();

        tokio::task::spawn_blocking(move || {
            WorkDir::materialize(
                scratch_dir.as_deref(),
                &prefix,
                &harness_dir,
                &solution_file,
                &solution_code,
            )
        })
        .await
        .map_err(|e| SetupError::Io(io::Error::other(e)))?
    }

    async fn execute(
        &self,
        mode: &Mode<'_>,
        harness: &Harness,
        manifest: &Manifest,
        work_dir: &WorkDir,
        request: &RunRequest,
    ) -> RunResult {
        match mode {
            Mode::PerTest(template) => {
                run_per_test(
                    self.executor.as_ref(),
                    work_dir.path(),
                    &harness.config,
                    template,
                    &manifest.tests,
                    &manifest.limits,
                    request.timeout,
                )
                .await
            }
            Mode::Batch(command) => {
                run_batch(
                    self.executor.as_ref(),
                    work_dir.path(),
                    command,
                    &harness.config.report_glob,
                    request.timeout,
                )
                .await
            }
        }
    }
}

fn select_mode(harness: &Harness, per_test: bool) -> Result<Mode<'_>, SetupError> {
    let config = &harness.config;
    match (&config.single_test_command, &config.test_command) {
        (Some(template), _) if per_test => Ok(Mode::PerTest(template)),
        (_, Some(command)) => Ok(Mode::Batch(command)),
        (Some(_), None) => Err(SetupError::Invalid {
            path: harness.dir.join(RUNNER_CONFIG_FILE),
            msg: "batch mode requested but no test_command is declared".to_string(),
        }),
        (None, None) => Err(SetupError::Invalid {
            path: harness.dir.join(RUNNER_CONFIG_FILE),
            msg: "no test command declared".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use super::*;
    use crate::core::domain::Verdict;
    use crate::core::traits::executor::{
        Completion, ExitOutcome, LimitedRun, MockExecutor, ShellOutput,
    };

    const RUNNER: &str = r#"{
        "solution_file": "solution.py",
        "setup_command": "python3 -m py_compile solution.py",
        "test_command": "python3 -m pytest --junitxml=results.xml",
        "single_test_command": "python3 -m pytest -k test_{test_id} --junitxml=results.xml",
        "junit_xml_glob": "results.xml"
    }"#;

    fn problems() -> tempfile::TempDir {
        let problems = tempfile::tempdir().unwrap();
        let harness = config::harness_dir(problems.path(), "sum", "python");
        fs::create_dir_all(&harness).unwrap();
        fs::write(harness.join(RUNNER_CONFIG_FILE), RUNNER).unwrap();
        fs::write(harness.join("test_sum.py"), "from solution import add\n").unwrap();
        fs::write(
            problems.path().join("sum/testcases.json"),
            r#"{"limits": {"time_seconds": 2, "memory_mb": 64}, "tests": [{"id": 1}, {"id": 2}]}"#,
        )
        .unwrap();
        problems
    }

    fn ok_shell() -> ShellOutput {
        ShellOutput {
            completion: Completion::Finished(ExitOutcome::Exited(0)),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    #[tokio::test]
    async fn test_missing_harness_spawns_nothing() {
        let problems = problems();
        // no expectations: any call would panic
        let executor = Arc::new(MockExecutor::new());
        let engine = Engine::new(executor, problems.path());

        let result = engine
            .run(&RunRequest::new("sum", "haskell", "main = pure ()"))
            .await;

        assert_eq!(result.status, RunStatus::BuildError);
        assert!(result.tests.is_empty());
        assert!(result.stderr.contains("sum/languages/haskell"));
    }

    #[tokio::test]
    async fn test_malformed_manifest_spawns_nothing() {
        let problems = problems();
        fs::write(problems.path().join("sum/testcases.json"), "{ tests: ").unwrap();
        let engine = Engine::new(Arc::new(MockExecutor::new()), problems.path());

        let result = engine.run(&RunRequest::new("sum", "python", "")).await;

        assert_eq!(result.status, RunStatus::BuildError);
        assert!(result.stderr.contains("testcases.json"));
    }

    #[tokio::test]
    async fn test_oversized_limits_spawn_nothing() {
        let problems = problems();
        fs::write(
            problems.path().join("sum/testcases.json"),
            r#"{"limits": {"time_seconds": 18446744073709551615}, "tests": [{"id": 1}]}"#,
        )
        .unwrap();
        let engine = Engine::new(Arc::new(MockExecutor::new()), problems.path());

        let result = engine.run(&RunRequest::new("sum", "python", "")).await;

        assert_eq!(result.status, RunStatus::BuildError);
        assert!(result.stderr.contains("time_seconds"));
    }

    #[tokio::test]
    async fn test_per_test_run_sees_solution_and_limits() {
        let problems = problems();
        let scratch = tempfile::tempdir().unwrap();
        let mut executor = MockExecutor::new();
        executor
            .expect_run_shell()
            .times(1)
            .returning(|command, cwd, timeout| {
                assert_eq!(command, "python3 -m py_compile solution.py");
                assert_eq!(timeout, Duration::from_secs(30));
                assert_eq!(
                    fs::read_to_string(cwd.join("solution.py")).unwrap(),
                    "def add(a, b): return a + b\n"
                );
                assert!(cwd.join("test_sum.py").is_file());
                Ok(ok_shell())
            });
        executor
            .expect_run_limited()
            .times(2)
            .returning(|_, cwd, limits| {
                assert_eq!(limits.time_seconds, 2);
                assert_eq!(limits.memory_mb, 64);
                fs::write(
                    cwd.join("results.xml"),
                    r#"<testsuite><testcase name="t" time="0.1"/></testsuite>"#,
                )
                .unwrap();
                Ok(LimitedRun {
                    exit: ExitOutcome::Exited(0),
                    timed_out: false,
                    wall_time: Duration::from_millis(150),
                    peak_memory_kb: 8192,
                    killed_for_memory: false,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            });
        let engine =
            Engine::new(Arc::new(executor), problems.path()).with_scratch_dir(scratch.path());

        let request = RunRequest::new("sum", "python", "def add(a, b): return a + b\n")
            .with_timeout(Duration::from_secs(30));
        let result = engine.run(&request).await;

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.summary.total, 2);
        assert_eq!(result.summary.passed, 2);
        assert!(result.tests.iter().all(|t| t.verdict == Verdict::Passed));
        assert!(result.all_passed());
        // the working directory is gone
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_batch_request_uses_test_command() {
        let problems = problems();
        let scratch = tempfile::tempdir().unwrap();
        let mut executor = MockExecutor::new();
        executor
            .expect_run_shell()
            .times(1)
            .returning(|command, _, _| {
                assert_eq!(command, "python3 -m pytest --junitxml=results.xml");
                Ok(ok_shell())
            });
        executor.expect_run_limited().never();
        let engine =
            Engine::new(Arc::new(executor), problems.path()).with_scratch_dir(scratch.path());

        let result = engine
            .run(&RunRequest::new("sum", "python", "").batch())
            .await;

        // nothing wrote a report
        assert_eq!(result.status, RunStatus::BuildError);
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_batch_without_test_command_is_build_error() {
        let problems = problems();
        let harness = config::harness_dir(problems.path(), "sum", "python");
        fs::write(
            harness.join(RUNNER_CONFIG_FILE),
            r#"{"solution_file": "solution.py", "single_test_command": "run {test_id}", "junit_xml_glob": "*.xml"}"#,
        )
        .unwrap();
        let engine = Engine::new(Arc::new(MockExecutor::new()), problems.path());

        let result = engine
            .run(&RunRequest::new("sum", "python", "").batch())
            .await;

        assert_eq!(result.status, RunStatus::BuildError);
        assert!(result.stderr.contains("test_command"));
    }

    #[tokio::test]
    async fn test_languages() {
        let problems = problems();
        let engine = Engine::native(problems.path());

        let languages = engine.languages("sum").await.unwrap();
        assert_eq!(languages.len(), 1);
        assert_eq!(languages[0].name, "python");
        assert_eq!(languages[0].solution_file, PathBuf::from("solution.py"));
    }
}
