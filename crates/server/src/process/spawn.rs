// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawn the assistant binary in stream-json mode and wire up its pipes.

use std::path::Path;
use std::process::Stdio;

use bytes::{Bytes, BytesMut};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::monitor::is_process_alive;

/// Assistant invocation settings, fixed for the server's lifetime.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub binary: String,
    pub permission_mode: String,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub skip_permissions: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_owned(),
            permission_mode: "default".to_owned(),
            allowed_tools: vec!["Read".to_owned(), "Write".to_owned(), "Edit".to_owned()],
            disallowed_tools: Vec::new(),
            skip_permissions: false,
        }
    }
}

impl RunnerConfig {
    /// Build the argument list, optionally resuming a prior assistant session.
    pub fn args(&self, resume: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "--output-format".to_owned(),
            "stream-json".to_owned(),
            "--verbose".to_owned(),
            "--permission-mode".to_owned(),
            self.permission_mode.clone(),
        ];
        if !self.allowed_tools.is_empty() {
            args.push("--allowedTools".to_owned());
            args.push(self.allowed_tools.join(","));
        }
        if !self.disallowed_tools.is_empty() {
            args.push("--disallowedTools".to_owned());
            args.push(self.disallowed_tools.join(","));
        }
        if self.skip_permissions {
            args.push("--dangerously-skip-permissions".to_owned());
        }
        if let Some(id) = resume {
            args.push("--resume".to_owned());
            args.push(id.to_owned());
        }
        args
    }
}

/// Weak reference to a running assistant subprocess: enough to feed it,
/// signal it, and cancel its pipeline, without owning the child.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub pid: u32,
    stdin_tx: mpsc::Sender<String>,
    pub cancel: CancellationToken,
}

impl ProcessHandle {
    /// Queue one newline-terminated line for the subprocess stdin.
    pub async fn write_line(&self, line: &str) -> anyhow::Result<()> {
        self.stdin_tx
            .send(line.to_owned())
            .await
            .map_err(|_| anyhow::anyhow!("assistant stdin closed"))
    }

    /// Deliver a signal to the subprocess.
    pub fn signal(&self, sig: Signal) {
        let Ok(pid) = i32::try_from(self.pid) else {
            return;
        };
        let _ = signal::kill(Pid::from_raw(pid), sig);
    }

    pub fn is_alive(&self) -> bool {
        is_process_alive(self.pid)
    }
}

/// A freshly spawned assistant: the handle plus the receivers the pipeline
/// consumes.
pub struct Spawned {
    pub handle: ProcessHandle,
    pub stdout_rx: mpsc::Receiver<Bytes>,
    pub exit_rx: oneshot::Receiver<Option<i32>>,
}

/// Whether the assistant binary is runnable (absolute path or on `PATH`).
pub fn check_availability(binary: &str) -> bool {
    let path = Path::new(binary);
    if path.is_absolute() {
        return path.is_file();
    }
    let Some(search) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&search).any(|dir| dir.join(binary).is_file())
}

/// Spawn the assistant in `working_dir` and wire up stdin writer, stdout
/// reader, and stderr drain tasks.
pub fn spawn_assistant(
    config: &RunnerConfig,
    working_dir: &Path,
    resume: Option<&str>,
) -> anyhow::Result<Spawned> {
    let mut child = Command::new(&config.binary)
        .args(config.args(resume))
        .current_dir(working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let pid = child.id().ok_or_else(|| anyhow::anyhow!("assistant exited before start"))?;

    let mut stdin =
        child.stdin.take().ok_or_else(|| anyhow::anyhow!("assistant stdin not captured"))?;
    let mut stdout =
        child.stdout.take().ok_or_else(|| anyhow::anyhow!("assistant stdout not captured"))?;
    let stderr =
        child.stderr.take().ok_or_else(|| anyhow::anyhow!("assistant stderr not captured"))?;

    let cancel = CancellationToken::new();
    let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);
    let (stdout_tx, stdout_rx) = mpsc::channel::<Bytes>(256);
    let (exit_tx, exit_rx) = oneshot::channel();

    // stdin writer: one line per queued prompt/response.
    let stdin_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stdin_cancel.cancelled() => break,
                line = stdin_rx.recv() => {
                    let Some(line) = line else { break };
                    let payload = format!("{line}\n");
                    if stdin.write_all(payload.as_bytes()).await.is_err() {
                        debug!("assistant stdin write failed");
                        break;
                    }
                    let _ = stdin.flush().await;
                }
            }
        }
    });

    // stdout reader: raw byte frames for the parsing pipeline.
    let stdout_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(8192);
        loop {
            tokio::select! {
                _ = stdout_cancel.cancelled() => break,
                read = stdout.read_buf(&mut buf) => {
                    match read {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            let frame = buf.split().freeze();
                            if stdout_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
    });

    // stderr drain: log lines, never block the child.
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.trim().is_empty() {
                warn!(pid, "assistant stderr: {line}");
            }
        }
    });

    // reaper: wait for exit and report the code.
    tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(pid, "assistant wait failed: {e}");
                None
            }
        };
        debug!(pid, ?code, "assistant exited");
        let _ = exit_tx.send(code);
    });

    Ok(Spawned {
        handle: ProcessHandle { pid, stdin_tx, cancel },
        stdout_rx,
        exit_rx,
    })
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
