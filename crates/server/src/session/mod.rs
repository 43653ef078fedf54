// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: owns every session record, enforces the creation policy
//! (reuse-by-directory, restore, capacity), runs lifecycle operations, and
//! feeds the central timeout sweeper.

pub mod entry;
pub mod persist;
pub mod routing;
pub mod sweep;

pub use entry::{SessionEntry, SessionSnapshot, TurnResult};
pub use persist::{MemoryPersistence, PersistedSession, SessionPersistence};
pub use routing::RoutingTable;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ErrorCode, OperationError};
use crate::event::{CleanReason, ServerEvent, SessionEvent};
use crate::message::SessionBuffer;
use crate::queue::MessageQueue;
use crate::security::patterns::{is_within, normalize_path};

/// Policy knobs for the manager, fixed at startup.
#[derive(Debug, Clone)]
pub struct SessionLimits {
    pub max_sessions: usize,
    pub session_timeout: Duration,
    pub backgrounded_timeout: Duration,
    /// Idle span after which a warning fires; `None` disables warnings.
    pub warning_window: Option<Duration>,
    pub min_check_interval: Duration,
    /// All session working directories must resolve under this root.
    pub safe_root: Option<PathBuf>,
    pub buffer_capacity: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions: 10,
            session_timeout: Duration::from_secs(24 * 3600),
            backgrounded_timeout: Duration::from_secs(4 * 3600),
            warning_window: None,
            min_check_interval: Duration::from_secs(60),
            safe_root: None,
            buffer_capacity: 200,
        }
    }
}

/// Options for one create call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    pub skip_permissions: bool,
}

/// Result of a create: the bound session and how it was obtained.
#[derive(Debug)]
pub struct CreateOutcome {
    pub session_id: String,
    pub reused: bool,
    pub restored: bool,
    pub entry: Arc<SessionEntry>,
}

/// Result of a close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseResult {
    pub success: bool,
    pub message: Option<String>,
}

/// Replace anything outside `[A-Za-z0-9._-]` in a proposed session id.
pub fn sanitize_session_id(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

/// Exclusive owner of session records.
pub struct SessionManager {
    limits: SessionLimits,
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    pub routing: RoutingTable,
    persistence: Arc<dyn SessionPersistence>,
    queue: Arc<MessageQueue>,
    events: broadcast::Sender<ServerEvent>,
}

impl SessionManager {
    pub fn new(
        limits: SessionLimits,
        persistence: Arc<dyn SessionPersistence>,
        queue: Arc<MessageQueue>,
        events: broadcast::Sender<ServerEvent>,
    ) -> Self {
        Self {
            limits,
            sessions: RwLock::new(HashMap::new()),
            routing: RoutingTable::new(),
            persistence,
            queue,
            events,
        }
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    /// Find or create the session bound to `working_directory`.
    ///
    /// Policy, in order: an existing session with the requested id or the
    /// same directory is reused; a recent persisted session for the
    /// directory is restored (reuse, exempt from the cap); otherwise a fresh
    /// record is created, subject to the session cap.
    pub fn create_interactive_session(
        &self,
        requested_id: Option<&str>,
        prompt: &str,
        working_directory: &str,
        options: CreateOptions,
    ) -> Result<CreateOutcome, OperationError> {
        let id = match requested_id.map(sanitize_session_id).filter(|s| !s.is_empty()) {
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        if let Some(entry) = self.get_session(&id) {
            entry.touch();
            return Ok(CreateOutcome { session_id: id, reused: true, restored: false, entry });
        }

        let dir = self.validate_working_directory(working_directory)?;

        // Reuse by directory: the routing map is authoritative, the scan over
        // live sessions is the in-memory fallback.
        if let Some(route) = self.routing.session_for_dir(&dir) {
            if !route.is_temporary {
                if let Some(entry) = self.get_session(&route.session_id) {
                    entry.touch();
                    return Ok(CreateOutcome {
                        session_id: entry.id.clone(),
                        reused: true,
                        restored: false,
                        entry,
                    });
                }
            }
        }
        if let Some(entry) = self.find_by_directory(&dir) {
            entry.touch();
            return Ok(CreateOutcome {
                session_id: entry.id.clone(),
                reused: true,
                restored: false,
                entry,
            });
        }

        // Restore from the persistent directory map when a recent session
        // served this directory. Restores count as reuse and are not subject
        // to the session cap.
        if let Some(persisted) = self.persistence.recent_for_directory(&dir) {
            let entry = self.insert_session(
                persisted.session_id.clone(),
                dir,
                prompt,
                options.skip_permissions,
                true,
            );
            if let Some(assistant) = persisted.assistant_session_id.as_deref() {
                entry.set_assistant_session_id(assistant);
                self.routing.map_assistant(&entry.id, assistant);
                self.persistence.record(&entry.working_dir, &entry.id, Some(assistant));
            }
            info!(session = %entry.id, "restored session for directory");
            return Ok(CreateOutcome {
                session_id: entry.id.clone(),
                reused: true,
                restored: true,
                entry,
            });
        }

        if self.session_count() >= self.limits.max_sessions {
            return Err(OperationError::new(
                ErrorCode::MaxSessions,
                "Maximum number of sessions reached",
            ));
        }

        let entry = self.insert_session(id, dir, prompt, options.skip_permissions, false);
        Ok(CreateOutcome { session_id: entry.id.clone(), reused: false, restored: false, entry })
    }

    fn insert_session(
        &self,
        id: String,
        dir: PathBuf,
        prompt: &str,
        skip_permissions: bool,
        restored: bool,
    ) -> Arc<SessionEntry> {
        let entry = Arc::new(SessionEntry::new(
            id.clone(),
            dir.clone(),
            prompt.to_owned(),
            skip_permissions,
            restored,
            self.limits.buffer_capacity,
        ));
        self.write_sessions().insert(id.clone(), Arc::clone(&entry));
        self.routing.track(&id, &dir, None, false);
        self.persistence.record(&dir, &id, None);
        self.emit(SessionEvent::Created {
            session_id: id,
            working_dir: dir.display().to_string(),
        });
        entry
    }

    /// Validate a proposed working directory: absolute, existing, and under
    /// the safe root when one is configured.
    pub fn validate_directory(&self, raw: &str) -> Result<PathBuf, OperationError> {
        self.validate_working_directory(raw)
    }

    fn validate_working_directory(&self, raw: &str) -> Result<PathBuf, OperationError> {
        let path = Path::new(raw);
        if !path.is_absolute() || !path.is_dir() {
            return Err(OperationError::new(
                ErrorCode::InvalidDirectory,
                "Invalid directory path",
            ));
        }
        let normalized = normalize_path(raw, path);
        if let Some(root) = self.limits.safe_root.as_deref() {
            if !is_within(&normalized, root) {
                return Err(OperationError::new(
                    ErrorCode::AccessDenied,
                    format!("Access denied: directory {raw} is not allowed"),
                ));
            }
        }
        Ok(normalized)
    }

    fn find_by_directory(&self, dir: &Path) -> Option<Arc<SessionEntry>> {
        self.read_sessions().values().find(|e| e.working_dir == dir).cloned()
    }

    pub fn get_session(&self, id: &str) -> Option<Arc<SessionEntry>> {
        self.read_sessions().get(id).cloned()
    }

    pub fn sessions(&self) -> Vec<Arc<SessionEntry>> {
        self.read_sessions().values().cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.read_sessions().len()
    }

    /// How many sessions are mid-prompt right now.
    pub fn processing_count(&self) -> usize {
        self.read_sessions().values().filter(|e| e.is_processing()).count()
    }

    /// `(session_id, pid)` for every session with a live subprocess handle.
    pub fn pid_snapshot(&self) -> Vec<(String, u32)> {
        self.read_sessions()
            .values()
            .filter_map(|e| e.pid().map(|pid| (e.id.clone(), pid)))
            .collect()
    }

    // -- lifecycle operations (idempotent; unknown ids are no-ops) ------------

    pub fn update_session_activity(&self, id: &str) {
        if let Some(entry) = self.get_session(id) {
            entry.touch();
        }
    }

    pub fn set_session_processing(&self, id: &str, processing: bool) {
        if let Some(entry) = self.get_session(id) {
            entry.set_processing(processing);
            entry.touch();
        }
    }

    pub fn mark_conversation_started(&self, id: &str) {
        if let Some(entry) = self.get_session(id) {
            entry.mark_conversation_started();
            entry.touch();
        }
    }

    pub fn mark_session_backgrounded(&self, id: &str) {
        if let Some(entry) = self.get_session(id) {
            entry.mark_backgrounded();
        }
    }

    pub fn mark_session_foregrounded(&self, id: &str) {
        if let Some(entry) = self.get_session(id) {
            entry.mark_foregrounded();
        }
    }

    pub async fn get_session_buffer(&self, id: &str) -> Option<SessionBuffer> {
        let entry = self.get_session(id)?;
        let buffer = entry.buffer.read().await;
        Some(buffer.clone())
    }

    pub async fn clear_session_buffer(&self, id: &str) {
        if let Some(entry) = self.get_session(id) {
            entry.buffer.write().await.clear();
        }
    }

    /// True once the assistant conversation has begun (or was restored).
    pub fn is_claude_session_active(&self, id: &str) -> bool {
        self.get_session(id)
            .map(|e| e.conversation_started() || e.is_restored())
            .unwrap_or(false)
    }

    // -- routing --------------------------------------------------------------

    /// Track a session for message routing without a full record.
    pub fn track_session_for_routing(
        &self,
        session_id: &str,
        working_dir: &str,
        assistant_session_id: Option<&str>,
    ) {
        self.routing.track(session_id, Path::new(working_dir), assistant_session_id, true);
    }

    /// Bind our session id to the assistant's own session id.
    pub fn map_claude_session(&self, session_id: &str, assistant_session_id: &str) {
        self.routing.map_assistant(session_id, assistant_session_id);
        if let Some(entry) = self.get_session(session_id) {
            entry.set_assistant_session_id(assistant_session_id);
            self.persistence.record(&entry.working_dir, session_id, Some(assistant_session_id));
        }
    }

    // -- teardown -------------------------------------------------------------

    /// Close a session at the user's request.
    pub fn close_session(&self, id: &str) -> CloseResult {
        if self.remove_session(id, CleanReason::UserRequested, Some(Signal::SIGTERM)) {
            self.persistence.forget(id);
            CloseResult { success: true, message: None }
        } else {
            CloseResult { success: false, message: Some("Session not found".to_owned()) }
        }
    }

    /// Reap a session whose subprocess died underneath it.
    pub fn cleanup_dead_session(&self, id: &str) -> bool {
        self.remove_session(id, CleanReason::ProcessDied, None)
    }

    /// Hard-kill the subprocess, then clean up.
    pub fn kill_session(&self, id: &str) -> bool {
        if let Some(entry) = self.get_session(id) {
            if let Some(handle) = entry.process() {
                handle.signal(Signal::SIGKILL);
            }
        }
        self.remove_session(id, CleanReason::UserRequested, None)
    }

    /// Expire an idle session (sweeper only).
    fn expire_session(&self, id: &str) {
        self.emit(SessionEvent::Expired { session_id: id.to_owned() });
        self.remove_session(id, CleanReason::Expired, Some(Signal::SIGTERM));
    }

    fn remove_session(&self, id: &str, reason: CleanReason, sig: Option<Signal>) -> bool {
        let Some(entry) = self.write_sessions().remove(id) else {
            return false;
        };

        entry.resolve_turn(TurnResult::Cancelled);
        entry.cancel.cancel();
        if let Some(handle) = entry.detach_process() {
            if let Some(sig) = sig {
                handle.signal(sig);
            }
            handle.cancel.cancel();
        }
        self.routing.remove(id);
        self.queue.remove(id);
        self.emit(SessionEvent::Cleaned { session_id: id.to_owned(), reason });
        debug!(session = id, reason = reason.as_str(), "session cleaned");
        true
    }

    /// Close every session (server shutdown). Never fails.
    pub fn shutdown(&self) {
        let ids: Vec<String> = self.read_sessions().keys().cloned().collect();
        info!(count = ids.len(), "session manager shutting down");
        for id in ids {
            if !self.remove_session(&id, CleanReason::Shutdown, Some(Signal::SIGTERM)) {
                warn!(session = %id, "session vanished during shutdown");
            }
        }
    }

    // -- sweeping -------------------------------------------------------------

    /// How often the sweeper should scan, scaled down for short timeouts.
    pub fn check_interval(&self) -> Duration {
        self.limits
            .min_check_interval
            .min(self.limits.session_timeout / 4)
            .min(self.limits.backgrounded_timeout / 4)
            .max(Duration::from_millis(100))
    }

    /// One sweep pass: emit warnings, expire overdue sessions. Returns how
    /// many sessions were expired.
    pub fn sweep_once(&self) -> usize {
        let snapshot = self.sessions();
        let mut expired = 0;

        for entry in snapshot {
            let idle = entry.idle_for();
            let applicable = if entry.is_backgrounded() {
                self.limits.backgrounded_timeout
            } else {
                self.limits.session_timeout
            };

            if idle > applicable {
                // Undelivered messages keep a session alive.
                if !self.queue.is_empty(&entry.id) {
                    continue;
                }
                self.expire_session(&entry.id);
                expired += 1;
                continue;
            }

            if let Some(warning) = self.limits.warning_window {
                if idle > warning && entry.claim_warning() {
                    self.emit(SessionEvent::Warning {
                        session_id: entry.id.clone(),
                        idle_ms: idle.as_millis() as u64,
                    });
                }
            }
        }
        expired
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(ServerEvent::Session(event));
    }

    fn read_sessions(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<SessionEntry>>> {
        match self.sessions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_sessions(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<SessionEntry>>> {
        match self.sessions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
