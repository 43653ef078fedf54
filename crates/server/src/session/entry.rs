// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session record: one client conversation bound to a working directory
//! and (while active) a single assistant subprocess.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{oneshot, RwLock};
use tokio_util::sync::CancellationToken;

use crate::event::epoch_ms;
use crate::message::{FinalOutcome, SessionBuffer};
use crate::process::ProcessHandle;

/// How a prompt execution ended.
#[derive(Debug)]
pub enum TurnResult {
    /// The assistant produced a `result` event.
    Final(Box<FinalOutcome>),
    /// The subprocess exited before finishing the turn.
    Exited(Option<i32>),
    /// The session was closed or timed out mid-turn.
    Cancelled,
}

/// Wire-facing snapshot of a session's state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub working_directory: String,
    pub created_at: u64,
    pub conversation_started: bool,
    pub is_processing: bool,
    pub is_backgrounded: bool,
    pub is_restored: bool,
    pub idle_ms: u64,
}

/// One session record. Mutation goes through these methods; other components
/// hold the record only behind `Arc` via the session manager.
#[derive(Debug)]
pub struct SessionEntry {
    pub id: String,
    pub working_dir: PathBuf,
    pub initial_prompt: String,
    pub created_at: Instant,
    pub created_at_ms: u64,
    pub skip_permissions: bool,
    pub cancel: CancellationToken,
    pub buffer: RwLock<SessionBuffer>,
    last_activity: Mutex<Instant>,
    conversation_started: AtomicBool,
    is_processing: AtomicBool,
    is_backgrounded: AtomicBool,
    is_restored: AtomicBool,
    warning_sent: AtomicBool,
    backgrounded_at: Mutex<Option<Instant>>,
    assistant_session_id: StdRwLock<Option<String>>,
    process: StdRwLock<Option<ProcessHandle>>,
    turn: Mutex<Option<oneshot::Sender<TurnResult>>>,
}

impl SessionEntry {
    pub fn new(
        id: String,
        working_dir: PathBuf,
        initial_prompt: String,
        skip_permissions: bool,
        restored: bool,
        buffer_capacity: usize,
    ) -> Self {
        Self {
            id,
            working_dir,
            initial_prompt,
            created_at: Instant::now(),
            created_at_ms: epoch_ms(),
            skip_permissions,
            cancel: CancellationToken::new(),
            buffer: RwLock::new(SessionBuffer::with_capacity(buffer_capacity)),
            last_activity: Mutex::new(Instant::now()),
            conversation_started: AtomicBool::new(false),
            is_processing: AtomicBool::new(false),
            is_backgrounded: AtomicBool::new(false),
            is_restored: AtomicBool::new(restored),
            warning_sent: AtomicBool::new(false),
            backgrounded_at: Mutex::new(None),
            assistant_session_id: StdRwLock::new(None),
            process: StdRwLock::new(None),
            turn: Mutex::new(None),
        }
    }

    /// Bump `last_activity`, which never moves backwards.
    pub fn touch(&self) {
        if let Ok(mut at) = self.last_activity.lock() {
            let now = Instant::now();
            if now > *at {
                *at = now;
            }
        }
        self.warning_sent.store(false, Ordering::Release);
    }

    pub fn idle_for(&self) -> Duration {
        match self.last_activity.lock() {
            Ok(at) => at.elapsed(),
            Err(poisoned) => poisoned.into_inner().elapsed(),
        }
    }

    pub fn conversation_started(&self) -> bool {
        self.conversation_started.load(Ordering::Acquire)
    }

    pub fn mark_conversation_started(&self) {
        self.conversation_started.store(true, Ordering::Release);
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::Acquire)
    }

    /// Claim the processing slot. False when a prompt is already in flight.
    pub fn try_begin_processing(&self) -> bool {
        self.is_processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn set_processing(&self, processing: bool) {
        self.is_processing.store(processing, Ordering::Release);
    }

    pub fn is_backgrounded(&self) -> bool {
        self.is_backgrounded.load(Ordering::Acquire)
    }

    pub fn backgrounded_at(&self) -> Option<Instant> {
        match self.backgrounded_at.lock() {
            Ok(at) => *at,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn mark_backgrounded(&self) {
        self.is_backgrounded.store(true, Ordering::Release);
        if let Ok(mut at) = self.backgrounded_at.lock() {
            *at = Some(Instant::now());
        }
        self.touch();
    }

    pub fn mark_foregrounded(&self) {
        self.is_backgrounded.store(false, Ordering::Release);
        if let Ok(mut at) = self.backgrounded_at.lock() {
            *at = None;
        }
        self.touch();
    }

    pub fn is_restored(&self) -> bool {
        self.is_restored.load(Ordering::Acquire)
    }

    /// One-shot latch for the idle warning; reset by [`touch`](Self::touch).
    pub fn claim_warning(&self) -> bool {
        self.warning_sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn assistant_session_id(&self) -> Option<String> {
        match self.assistant_session_id.read() {
            Ok(id) => id.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_assistant_session_id(&self, assistant_id: &str) {
        if let Ok(mut slot) = self.assistant_session_id.write() {
            *slot = Some(assistant_id.to_owned());
        }
    }

    pub fn attach_process(&self, handle: ProcessHandle) {
        if let Ok(mut slot) = self.process.write() {
            *slot = Some(handle);
        }
    }

    pub fn process(&self) -> Option<ProcessHandle> {
        match self.process.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn detach_process(&self) -> Option<ProcessHandle> {
        match self.process.write() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.process().map(|h| h.pid)
    }

    /// Install the waiter for the in-flight prompt. False when one is
    /// already installed.
    pub fn install_turn_waiter(&self, waiter: oneshot::Sender<TurnResult>) -> bool {
        let mut slot = match self.turn.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(waiter);
        true
    }

    /// Resolve the in-flight prompt, if any.
    pub fn resolve_turn(&self, result: TurnResult) {
        let waiter = match self.turn.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(waiter) = waiter {
            let _ = waiter.send(result);
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            working_directory: self.working_dir.display().to_string(),
            created_at: self.created_at_ms,
            conversation_started: self.conversation_started(),
            is_processing: self.is_processing(),
            is_backgrounded: self.is_backgrounded(),
            is_restored: self.is_restored(),
            idle_ms: self.idle_for().as_millis() as u64,
        }
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
