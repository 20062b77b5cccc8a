use std::io;
use std::process::ExitStatus;

use nix::errno::Errno;
use nix::sys::resource::{Resource, setrlimit};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::{Pid, setpgid};

use crate::core::traits::executor::ExitOutcome;

/// SIGKILLs the process group led by `pid`. A group that no longer exists is
/// not an error: killing races with normal exit.
pub fn kill_group(pid: u32) {
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, "Failed to kill process group: {}", e),
    }
}

/// Runs in the forked child before exec. Only async-signal-safe calls here.
pub fn isolate_group() -> io::Result<()> {
    setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
    Ok(())
}

/// The kernel sends SIGXCPU at `soft` seconds of CPU and SIGKILL at `hard`.
pub fn limit_cpu(soft: u64, hard: u64) -> io::Result<()> {
    setrlimit(Resource::RLIMIT_CPU, soft, hard)?;
    Ok(())
}

pub fn exit_outcome(status: ExitStatus) -> ExitOutcome {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => ExitOutcome::Exited(code),
        (None, Some(signal)) => ExitOutcome::Signaled(signal),
        (None, None) => ExitOutcome::Exited(-1),
    }
}
