use nix::sys::signal::Signal;

use crate::constants::{MESSAGE_MAX_CHARS, NO_RESULTS_MESSAGE};
use crate::core::domain::Verdict;
use crate::core::traits::executor::{ExitOutcome, LimitedRun};
use crate::reports::ParsedReport;

/// What the report glob turned up after a single test.
#[derive(Clone, Debug, PartialEq)]
pub enum Evidence {
    Missing,
    Report(ParsedReport),
    Unreadable(String),
}

/// First match wins: memory kill, CPU or wall-clock kill, exit code.
///
/// SIGKILL without a memory kill is read as the hard RLIMIT_CPU firing. This
/// is a heuristic: a SIGKILL from anywhere else is reported as a time limit too.
pub fn classify(run: &LimitedRun) -> Verdict {
    if run.killed_for_memory {
        return Verdict::MemoryLimitExceeded;
    }
    if run.timed_out {
        return Verdict::TimeLimitExceeded;
    }

    match run.exit {
        ExitOutcome::Signaled(signal)
            if signal == Signal::SIGXCPU as i32 || signal == Signal::SIGKILL as i32 =>
        {
            Verdict::TimeLimitExceeded
        }
        ExitOutcome::Exited(0) => Verdict::Passed,
        ExitOutcome::Exited(code) if code > 0 => Verdict::Failed,
        _ => Verdict::RuntimeError,
    }
}

/// Reconciles an exit-code verdict with the test's own report.
///
/// Only `passed`/`failed` are open to revision. A clean exit without a report
/// is not trusted.
pub fn settle(tentative: Verdict, evidence: Evidence, stderr: &str) -> (Verdict, Option<String>) {
    let (verdict, message) = match (tentative, evidence) {
        (Verdict::Passed | Verdict::Failed, Evidence::Report(report)) => {
            match report.cases.into_iter().next() {
                Some(case) if case.passed => (Verdict::Passed, None),
                Some(case) => (Verdict::Failed, case.message),
                None => (tentative, None),
            }
        }
        (Verdict::Passed | Verdict::Failed, Evidence::Unreadable(msg)) => (Verdict::Failed, Some(msg)),
        (Verdict::Passed, Evidence::Missing) => (Verdict::Failed, Some(NO_RESULTS_MESSAGE.to_string())),
        (verdict, _) => (verdict, None),
    };

    match (verdict, message) {
        (Verdict::Failed, None) => (Verdict::Failed, last_line(stderr)),
        (verdict, message) => (verdict, message),
    }
}

/// Last non-empty line, cut to a display-friendly length.
fn last_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .last()
        .map(|line| line.chars().take(MESSAGE_MAX_CHARS).collect())
}
