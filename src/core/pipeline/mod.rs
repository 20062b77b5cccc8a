pub mod batch;
pub mod verdict;

/// Appends a diagnostic line to captured stderr.
fn append_line(stderr: String, line: &str) -> String {
    if stderr.is_empty() || stderr.ends_with('\n') {
        stderr + line
    } else {
        stderr + "\n" + line
    }
}
