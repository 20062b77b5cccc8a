use std::time::Duration;

pub const RUNNER_CONFIG_FILE: &str = "runner.json";
pub const TESTCASES_FILE: &str = "testcases.json";
pub const LANGUAGES_DIR: &str = "languages";
pub const HARNESS_SUBDIR: &str = "harness";

pub const TEST_ID_PLACEHOLDER: &str = "{test_id}";

pub const DEFAULT_TIME_SECONDS: u64 = 30;
pub const DEFAULT_MEMORY_MB: u64 = 256;
pub const MAX_TIME_SECONDS: u64 = 1_000_000;
pub const MAX_MEMORY_MB: u64 = u64::MAX / 1024;
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(120);

/// Extra seconds between the soft and hard RLIMIT_CPU.
pub const CPU_HARD_LIMIT_GRACE_SECS: u64 = 1;
/// Extra wall-clock time granted on top of the CPU ceiling before the child is killed.
pub const WALL_CLOCK_GRACE: Duration = Duration::from_secs(5);

pub const MONITOR_INTERVAL: Duration = Duration::from_millis(100);
pub const MONITOR_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub const SHELL: &str = "/bin/sh";

pub const MESSAGE_MAX_CHARS: usize = 200;
pub const NO_RESULTS_MESSAGE: &str = "No test results produced";
