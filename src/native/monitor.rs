use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::fs;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::constants::MONITOR_JOIN_TIMEOUT;
use crate::native::signal::kill_group;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub peak_kb: u64,
    pub killed_for_memory: bool,
}

#[derive(Debug)]
struct MonitorState {
    pid: u32,
    limit_kb: u64,
    peak_kb: AtomicU64,
    killed: AtomicBool,
    stop: AtomicBool,
    wake: Notify,
}

/// Background task sampling a child's peak resident memory (`VmHWM`) and
/// killing its process group once the ceiling is crossed.
///
/// Samples are taken every `interval`, so peaks shorter than that can be missed.
#[derive(Debug)]
pub struct MemoryMonitor {
    state: Arc<MonitorState>,
    handle: JoinHandle<()>,
}

impl MemoryMonitor {
    pub fn spawn(pid: u32, limit_kb: u64, interval: Duration) -> Self {
        let state = Arc::new(MonitorState {
            pid,
            limit_kb,
            peak_kb: AtomicU64::new(0),
            killed: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            wake: Notify::new(),
        });
        let handle = tokio::spawn(watch(state.clone(), interval));

        MemoryMonitor { state, handle }
    }

    /// Signals the task to finish, joins it, and returns what it observed.
    pub async fn stop(self) -> MonitorReport {
        self.state.stop.store(true, Ordering::SeqCst);
        self.state.wake.notify_one();

        let mut handle = self.handle;
        if tokio::time::timeout(MONITOR_JOIN_TIMEOUT, &mut handle)
            .await
            .is_err()
        {
            tracing::warn!(pid = self.state.pid, "Memory monitor did not stop in time");
            handle.abort();
        }

        MonitorReport {
            peak_kb: self.state.peak_kb.load(Ordering::SeqCst),
            killed_for_memory: self.state.killed.load(Ordering::SeqCst),
        }
    }
}

async fn watch(state: Arc<MonitorState>, interval: Duration) {
    let status_path = format!("/proc/{}/status", state.pid);

    while !state.stop.load(Ordering::SeqCst) {
        // The process may exit or be reaped at any moment; that ends the watch.
        let status = match fs::read_to_string(&status_path).await {
            Ok(status) => status,
            Err(e) => {
                tracing::debug!(pid = state.pid, "Memory monitor exiting: {}", e);
                return;
            }
        };

        if let Some(hwm_kb) = parse_vm_hwm(&status) {
            state.peak_kb.fetch_max(hwm_kb, Ordering::SeqCst);
            if hwm_kb > state.limit_kb {
                state.killed.store(true, Ordering::SeqCst);
                kill_group(state.pid);
                tracing::info!(
                    pid = state.pid,
                    hwm_kb,
                    limit_kb = state.limit_kb,
                    "Memory limit exceeded, process killed"
                );
                return;
            }
        }

        tokio::select! {
            _ = state.wake.notified() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// `VmHWM` in KiB from the contents of `/proc/<pid>/status`.
fn parse_vm_hwm(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmHWM:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}
