// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic subprocess liveness polling.

use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal;
use nix::unistd::Pid;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Checks whether a process with the given PID is alive.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    signal::kill(Pid::from_raw(pid_i32), None).is_ok()
}

/// Snapshot provider: `(session_id, pid)` for every session with a bound
/// subprocess.
pub type PidSnapshotFn = Arc<dyn Fn() -> Vec<(String, u32)> + Send + Sync>;

/// Polls each session's subprocess PID and reports sessions whose process
/// has died so the session manager can reap them.
pub struct ProcessMonitor {
    snapshot: PidSnapshotFn,
    poll_interval: Duration,
}

impl ProcessMonitor {
    pub fn new(snapshot: PidSnapshotFn) -> Self {
        Self { snapshot, poll_interval: Duration::from_secs(5) }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run until shutdown, sending the id of each session whose subprocess
    /// disappeared on `dead_tx`.
    pub async fn run(self, dead_tx: mpsc::Sender<String>, shutdown: CancellationToken) {
        info!("process monitor started");
        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("process monitor shutting down");
                    return;
                }
                _ = interval.tick() => {}
            }

            for (session_id, pid) in (self.snapshot)() {
                if !is_process_alive(pid) {
                    debug!(session = %session_id, pid, "subprocess died");
                    if dead_tx.send(session_id).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
