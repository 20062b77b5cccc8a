//! Locating and reading the structured test reports a harness writes.

use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::core::domain::{Summary, round_to};
use crate::core::errors::ReportError;

pub mod junit;

#[derive(Clone, Debug, PartialEq)]
pub struct ReportCase {
    pub name: String,
    pub passed: bool,
    /// Set for `<error>` results, which also count as not passed.
    pub errored: bool,
    pub time_seconds: f64,
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedReport {
    pub cases: Vec<ReportCase>,
}

impl ParsedReport {
    fn errors(&self) -> usize {
        self.cases.iter().filter(|case| case.errored).count()
    }

    /// Report-level counts: errored cases are counted apart from plain failures.
    pub fn summary(&self) -> Summary {
        let total = self.cases.len();
        let passed = self.cases.iter().filter(|case| case.passed).count();
        let errors = self.errors();
        let time = self.cases.iter().map(|case| case.time_seconds).sum();

        Summary {
            total,
            passed,
            failed: total - passed - errors,
            errors,
            time_seconds: round_to(time, 3),
        }
    }
}

/// Report files matching `pattern` relative to `work_dir`, sorted by path.
pub fn discover(work_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, ReportError> {
    let base = glob::Pattern::escape(&work_dir.to_string_lossy());
    let full = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        pattern.trim_start_matches("./")
    );
    let paths = glob::glob(&full).map_err(|e| ReportError::Pattern {
        pattern: pattern.to_string(),
        msg: e.to_string(),
    })?;

    Ok(paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("Skipping unreadable report path: {}", e);
                None
            }
        })
        .filter(|path| path.is_file())
        .sorted()
        .collect())
}

/// Removes stale reports so the next child's evidence is unambiguous.
pub fn clear(work_dir: &Path, pattern: &str) -> Result<usize, ReportError> {
    let mut removed = 0;
    for path in discover(work_dir, pattern)? {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("Failed to remove stale report {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}
