// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assistant subprocess control: spawning, stdin/stdout plumbing, prompt
//! timeout derivation, and PID liveness monitoring.

pub mod monitor;
pub mod spawn;
pub mod timeout;

pub use monitor::{is_process_alive, ProcessMonitor};
pub use spawn::{check_availability, spawn_assistant, ProcessHandle, RunnerConfig, Spawned};
pub use timeout::command_timeout;
