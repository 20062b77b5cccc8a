use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use crate::constants::HARNESS_SUBDIR;
use crate::core::errors::SetupError;

/// Run-scoped copy of a harness with the solution injected.
///
/// The backing temporary directory is removed when the value is dropped, so
/// every exit path of a run tears it down, including a failure half-way
/// through materialization.
#[derive(Debug)]
pub struct WorkDir {
    root: TempDir,
    harness: PathBuf,
}

impl WorkDir {
    pub fn materialize(
        scratch_dir: Option<&Path>,
        prefix: &str,
        harness_dir: &Path,
        solution_file: &Path,
        solution_code: &str,
    ) -> Result<Self, SetupError> {
        if !harness_dir.is_dir() {
            return Err(SetupError::HarnessNotFound(harness_dir.to_path_buf()));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let root = match scratch_dir {
            Some(dir) => builder.tempdir_in(dir)?,
            None => builder.tempdir()?,
        };

        let harness = root.path().join(HARNESS_SUBDIR);
        copy_tree(harness_dir, &harness)?;

        let solution_path = harness.join(solution_file);
        if let Some(parent) = solution_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&solution_path, solution_code)?;
        tracing::debug!(
            "Materialized harness {} into {}",
            harness_dir.display(),
            harness.display()
        );

        Ok(WorkDir { root, harness })
    }

    /// Directory all commands run in.
    pub fn path(&self) -> &Path {
        &self.harness
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Removes the directory, reporting failures that `Drop` would swallow.
    pub fn close(self) -> io::Result<()> {
        self.root.close()
    }
}

/// Deep copy; symlinks are followed and their targets copied.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/test")).unwrap();
        fs::write(dir.path().join("runner.json"), "{}").unwrap();
        fs::write(dir.path().join("src/test/SolutionTest.java"), "class T {}").unwrap();
        dir
    }

    #[test]
    fn test_materialize_copies_tree_and_injects_solution() {
        let harness = harness();
        let work_dir = WorkDir::materialize(
            None,
            "engine_test_",
            harness.path(),
            Path::new("src/main/Solution.java"),
            "class Solution {}",
        )
        .unwrap();

        let root = work_dir.path();
        assert!(root.join("runner.json").is_file());
        assert_eq!(
            fs::read_to_string(root.join("src/test/SolutionTest.java")).unwrap(),
            "class T {}"
        );
        assert_eq!(
            fs::read_to_string(root.join("src/main/Solution.java")).unwrap(),
            "class Solution {}"
        );
        // the source harness is untouched
        assert!(!harness.path().join("src/main").exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let harness = harness();
        let work_dir = WorkDir::materialize(
            None,
            "engine_test_",
            harness.path(),
            Path::new("solution.py"),
            "",
        )
        .unwrap();
        let root = work_dir.root().to_path_buf();
        assert!(root.is_dir());

        drop(work_dir);
        assert!(!root.exists());
    }

    #[test]
    fn test_failed_materialization_leaves_nothing_behind() {
        let harness = harness();
        let scratch = tempfile::tempdir().unwrap();

        // a directory already sits where the solution file should be written
        let result = WorkDir::materialize(
            Some(scratch.path()),
            "engine_test_",
            harness.path(),
            Path::new("src/test"),
            "print(1)",
        );

        assert!(matches!(result, Err(SetupError::Io(_))));
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_harness() {
        let result = WorkDir::materialize(
            None,
            "engine_test_",
            Path::new("/nonexistent/harness"),
            Path::new("solution.py"),
            "",
        );
        assert!(matches!(result, Err(SetupError::HarnessNotFound(_))));
    }
}
