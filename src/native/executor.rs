use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::constants::{MONITOR_INTERVAL, OUTPUT_DRAIN_TIMEOUT, SHELL};
use crate::core::{
    domain::Limits,
    errors::ExecError,
    traits::executor::{Completion, Executor, LimitedRun, ShellOutput},
};
use crate::native::{
    monitor::{MemoryMonitor, MonitorReport},
    signal::{exit_outcome, isolate_group, kill_group, limit_cpu},
};

/// Runs harness commands as plain OS processes, each in its own process group.
#[derive(Clone, Debug)]
pub struct NativeExecutor {
    shell: PathBuf,
    monitor_interval: Duration,
}

impl Default for NativeExecutor {
    fn default() -> Self {
        NativeExecutor {
            shell: PathBuf::from(SHELL),
            monitor_interval: MONITOR_INTERVAL,
        }
    }
}

impl NativeExecutor {
    pub fn new<T: AsRef<Path>>(shell: T, monitor_interval: Duration) -> Self {
        NativeExecutor {
            shell: shell.as_ref().into(),
            monitor_interval,
        }
    }
}

struct Supervised {
    status: ExitStatus,
    timed_out: bool,
    finished_at: Instant,
    stdout: String,
    stderr: String,
}

#[async_trait::async_trait]
impl Executor for NativeExecutor {
    #[tracing::instrument(skip(self))]
    async fn run_shell(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ShellOutput, ExecError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);
        prepare(&mut cmd, cwd);

        let child = cmd.spawn().map_err(|e| ExecError::Spawn {
            program: self.shell.display().to_string(),
            msg: e.to_string(),
        })?;
        let supervised = supervise(child, timeout).await?;

        let completion = if supervised.timed_out {
            Completion::TimedOut
        } else {
            Completion::Finished(exit_outcome(supervised.status))
        };
        tracing::debug!(?completion, "Shell command finished");

        Ok(ShellOutput {
            completion,
            stdout: supervised.stdout,
            stderr: supervised.stderr,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn run_limited(
        &self,
        args: &[String],
        cwd: &Path,
        limits: &Limits,
    ) -> Result<LimitedRun, ExecError> {
        let Some((program, rest)) = args.split_first() else {
            return Err(ExecError::Spawn {
                program: String::new(),
                msg: "empty command".to_string(),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(rest);
        prepare(&mut cmd, cwd);
        let (soft, hard) = (limits.cpu_soft_secs(), limits.cpu_hard_secs());
        // SAFETY: the hook only issues setpgid and setrlimit, both async-signal-safe.
        unsafe {
            cmd.pre_exec(move || limit_cpu(soft, hard));
        }

        let started_at = Instant::now();
        let child = cmd.spawn().map_err(|e| ExecError::Spawn {
            program: program.clone(),
            msg: e.to_string(),
        })?;
        let monitor = child.id().map(|pid| {
            MemoryMonitor::spawn(pid, limits.memory_limit_kb(), self.monitor_interval)
        });

        let supervised = supervise(child, limits.wall_timeout()).await;
        let report = match monitor {
            Some(monitor) => monitor.stop().await,
            None => MonitorReport::default(),
        };
        let supervised = supervised?;

        let run = LimitedRun {
            exit: exit_outcome(supervised.status),
            timed_out: supervised.timed_out,
            wall_time: supervised.finished_at - started_at,
            peak_memory_kb: report.peak_kb,
            killed_for_memory: report.killed_for_memory,
            stdout: supervised.stdout,
            stderr: supervised.stderr,
        };
        tracing::debug!(
            exit = ?run.exit,
            timed_out = run.timed_out,
            peak_memory_kb = run.peak_memory_kb,
            killed_for_memory = run.killed_for_memory,
            "Limited run finished"
        );

        Ok(run)
    }
}

fn prepare(cmd: &mut Command, cwd: &Path) {
    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // SAFETY: setpgid is async-signal-safe.
    unsafe {
        cmd.pre_exec(isolate_group);
    }
}

/// Waits for `child` with a wall-clock bound and collects its output.
///
/// The child's process group is killed once the child is gone (or on timeout),
/// so helpers it left behind do not outlive the run.
async fn supervise(mut child: Child, timeout: Duration) -> Result<Supervised, ExecError> {
    let pid = child.id();
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());
    let wait_err = |e: std::io::Error| ExecError::Wait { msg: e.to_string() };

    let (status, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => (status.map_err(wait_err)?, false),
        Err(_) => {
            tracing::info!(?pid, ?timeout, "Wall-clock timeout, killing process group");
            if let Some(pid) = pid {
                kill_group(pid);
            }
            let _ = child.start_kill();
            (child.wait().await.map_err(wait_err)?, true)
        }
    };
    let finished_at = Instant::now();
    if let Some(pid) = pid {
        kill_group(pid);
    }

    Ok(Supervised {
        status,
        timed_out,
        finished_at,
        stdout: drain(stdout).await,
        stderr: drain(stderr).await,
    })
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                tracing::debug!("Output pipe read failed: {}", e);
            }
        }
        buf
    })
}

async fn drain(mut reader: JoinHandle<Vec<u8>>) -> String {
    match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader).await {
        Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
        Ok(Err(e)) => {
            tracing::warn!("Output reader failed: {}", e);
            String::new()
        }
        Err(_) => {
            tracing::warn!("Output pipe still open after process exit, discarding");
            reader.abort();
            String::new()
        }
    }
}
