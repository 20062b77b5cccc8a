use std::path::Path;
use std::time::Duration;

use crate::core::{
    domain::{RunResult, RunStatus, Summary, TestOutcome, Verdict},
    pipeline::append_line,
    traits::executor::{Completion, Executor},
};
use crate::reports::{self, ReportCase, junit};

/// One shell command runs the whole suite; results come only from the reports
/// it leaves behind.
#[tracing::instrument(skip(executor))]
pub async fn run_batch(
    executor: &dyn Executor,
    work_dir: &Path,
    command: &str,
    report_glob: &str,
    timeout: Duration,
) -> RunResult {
    let output = match executor.run_shell(command, work_dir, timeout).await {
        Ok(output) => output,
        Err(e) => return RunResult::error(RunStatus::RuntimeError, e.to_string()),
    };
    let (stdout, stderr) = (output.stdout, output.stderr);

    let exit = match output.completion {
        Completion::TimedOut => return RunResult::without_tests(RunStatus::Timeout, stdout, stderr),
        Completion::Finished(exit) => exit,
    };
    if exit.looks_signaled() {
        tracing::info!(?exit, "Test command was killed by a signal");
        return RunResult::without_tests(RunStatus::RuntimeError, stdout, stderr);
    }

    let paths = match reports::discover(work_dir, report_glob) {
        Ok(paths) => paths,
        Err(e) => {
            return RunResult::without_tests(
                RunStatus::BuildError,
                stdout,
                append_line(stderr, &e.to_string()),
            );
        }
    };
    // A clean exit without any report means the suite never got to run.
    if paths.is_empty() {
        tracing::info!(?exit, "No reports produced");
        return RunResult::without_tests(RunStatus::BuildError, stdout, stderr);
    }

    let mut tests = Vec::new();
    let mut errors = 0;
    for path in &paths {
        match junit::parse_file(path) {
            Ok(report) => {
                let counts = report.summary();
                tracing::debug!(path = %path.display(), ?counts, "Report parsed");
                errors += counts.errors;
                tests.extend(report.cases.into_iter().map(outcome));
            }
            Err(e) => {
                return RunResult::without_tests(
                    RunStatus::BuildError,
                    stdout,
                    append_line(stderr, &e.to_string()),
                );
            }
        }
    }

    let summary = Summary::from_outcomes(&tests, errors);
    tracing::debug!(reports = paths.len(), ?summary, "Batch reports merged");
    RunResult {
        status: RunStatus::Completed,
        tests,
        summary,
        stdout,
        stderr,
    }
}

fn outcome(case: ReportCase) -> TestOutcome {
    TestOutcome {
        name: case.name,
        verdict: if case.passed {
            Verdict::Passed
        } else {
            Verdict::Failed
        },
        time_seconds: case.time_seconds,
        memory_mb: None,
        message: case.message,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use nix::sys::signal::Signal;

    use super::*;
    use crate::core::errors::ExecError;
    use crate::core::traits::executor::{ExitOutcome, MockExecutor, ShellOutput};

    const PASSING_3_FAILING_1: &str = r#"<testsuite>
        <testcase name="test_1" time="0.5"/>
        <testcase name="test_2" time="0.25"/>
        <testcase name="test_3" time="0.125"><failure message="off by one"/></testcase>
        <testcase name="test_4" time="0.0625"/>
    </testsuite>"#;

    fn finished(code: i32) -> ShellOutput {
        ShellOutput {
            completion: Completion::Finished(ExitOutcome::Exited(code)),
            stdout: "collected 4 items\n".to_string(),
            stderr: "warning: deprecated\n".to_string(),
        }
    }

    fn executor_returning(output: ShellOutput, report: Option<(&'static str, &'static str)>) -> MockExecutor {
        let mut executor = MockExecutor::new();
        executor
            .expect_run_shell()
            .times(1)
            .returning(move |_, cwd, _| {
                if let Some((name, body)) = report {
                    fs::write(cwd.join(name), body).unwrap();
                }
                Ok(output.clone())
            });
        executor
    }

    #[tokio::test]
    async fn test_completed_with_mixed_results() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor_returning(finished(1), Some(("results.xml", PASSING_3_FAILING_1)));

        let result = run_batch(
            &executor,
            dir.path(),
            "pytest --junitxml=results.xml",
            "*.xml",
            Duration::from_secs(10),
        )
        .await;

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.summary.total, 4);
        assert_eq!(result.summary.passed, 3);
        assert_eq!(result.summary.failed, 1);
        assert_eq!(result.summary.time_seconds, 0.938);
        assert_eq!(result.tests[2].message.as_deref(), Some("off by one"));
        assert_eq!(result.tests[2].memory_mb, None);
        assert_eq!(result.stdout, "collected 4 items\n");
    }

    #[tokio::test]
    async fn test_reports_merged_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("TEST-b.xml"),
            r#"<testsuite><testcase name="b" time="1"><error message="NPE"/></testcase></testsuite>"#,
        )
        .unwrap();
        let executor = executor_returning(
            finished(0),
            Some((
                "TEST-a.xml",
                r#"<testsuite><testcase name="a" time="1"/></testsuite>"#,
            )),
        );

        let result = run_batch(
            &executor,
            dir.path(),
            "mvn test",
            "TEST-*.xml",
            Duration::from_secs(10),
        )
        .await;

        let names: Vec<_> = result.tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(result.summary.errors, 1);
        assert_eq!(result.summary.failed, 1);
    }

    #[tokio::test]
    async fn test_errors_summed_across_reports() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("TEST-a.xml"),
            r#"<testsuites><testsuite>
                <testcase name="a1" time="0.5"/>
                <testcase name="a2" time="0.5"><error message="boom"/></testcase>
            </testsuite></testsuites>"#,
        )
        .unwrap();
        let executor = executor_returning(
            finished(1),
            Some((
                "TEST-b.xml",
                r#"<testsuite>
                    <testcase name="b1" time="0.25"><error/></testcase>
                    <testcase name="b2" time="0.25"><failure message="no"/></testcase>
                </testsuite>"#,
            )),
        );

        let result = run_batch(&executor, dir.path(), "mvn test", "TEST-*.xml", Duration::from_secs(10)).await;

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.summary.total, 4);
        assert_eq!(result.summary.passed, 1);
        assert_eq!(result.summary.failed, 3);
        assert_eq!(result.summary.errors, 2);
        assert_eq!(result.summary.time_seconds, 1.5);
    }

    #[tokio::test]
    async fn test_no_reports_is_build_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor_returning(finished(0), None);

        let result = run_batch(&executor, dir.path(), "make test", "*.xml", Duration::from_secs(10)).await;

        assert_eq!(result.status, RunStatus::BuildError);
        assert!(result.tests.is_empty());
        assert_eq!(result.stderr, "warning: deprecated\n");
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor_returning(
            ShellOutput {
                completion: Completion::TimedOut,
                stdout: "test_1 PASSED\n".to_string(),
                stderr: String::new(),
            },
            None,
        );

        let result = run_batch(&executor, dir.path(), "pytest", "*.xml", Duration::from_secs(1)).await;

        assert_eq!(result.status, RunStatus::Timeout);
        assert_eq!(result.stdout, "test_1 PASSED\n");
        assert_eq!(result.summary.total, 0);
    }

    #[tokio::test]
    async fn test_signal_death_is_runtime_error() {
        let dir = tempfile::tempdir().unwrap();
        for completion in [
            Completion::Finished(ExitOutcome::Signaled(Signal::SIGSEGV as i32)),
            Completion::Finished(ExitOutcome::Exited(137)),
        ] {
            let executor = executor_returning(
                ShellOutput {
                    completion,
                    stdout: String::new(),
                    stderr: "Killed\n".to_string(),
                },
                Some(("results.xml", PASSING_3_FAILING_1)),
            );

            let result = run_batch(&executor, dir.path(), "pytest", "*.xml", Duration::from_secs(10)).await;
            assert_eq!(result.status, RunStatus::RuntimeError);
            assert!(result.tests.is_empty());
        }
    }

    #[tokio::test]
    async fn test_malformed_report_is_build_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor_returning(finished(0), Some(("results.xml", "<testsuite><testcase")));

        let result = run_batch(&executor, dir.path(), "pytest", "*.xml", Duration::from_secs(10)).await;

        assert_eq!(result.status, RunStatus::BuildError);
        assert!(result.stderr.starts_with("warning: deprecated\n"));
        assert!(result.stderr.contains("results.xml"));
    }

    #[tokio::test]
    async fn test_shell_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut executor = MockExecutor::new();
        executor.expect_run_shell().returning(|_, _, _| {
            Err(ExecError::Spawn {
                program: "/bin/sh".to_string(),
                msg: "permission denied".to_string(),
            })
        });

        let result = run_batch(&executor, dir.path(), "pytest", "*.xml", Duration::from_secs(10)).await;

        assert_eq!(result.status, RunStatus::RuntimeError);
        assert!(result.stderr.contains("/bin/sh"));
    }
}
