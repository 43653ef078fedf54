// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session routing: ours↔assistant session id maps plus the per-directory
//! singleton lookup used for reuse-by-directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Directory route to the session that owns it.
#[derive(Debug, Clone)]
pub struct DirRoute {
    pub session_id: String,
    /// Routing-only entries do not count toward the session cap.
    pub is_temporary: bool,
}

#[derive(Debug, Default)]
struct RoutingInner {
    assistant_by_ours: HashMap<String, String>,
    ours_by_assistant: HashMap<String, String>,
    dir_routes: HashMap<PathBuf, DirRoute>,
}

/// All routing maps under one lock.
#[derive(Debug, Default)]
pub struct RoutingTable {
    inner: Mutex<RoutingInner>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a session for routing, optionally with a known assistant id.
    pub fn track(
        &self,
        session_id: &str,
        working_dir: &Path,
        assistant_session_id: Option<&str>,
        is_temporary: bool,
    ) {
        let mut inner = self.lock();
        inner.dir_routes.insert(
            working_dir.to_path_buf(),
            DirRoute { session_id: session_id.to_owned(), is_temporary },
        );
        if let Some(assistant) = assistant_session_id {
            inner.assistant_by_ours.insert(session_id.to_owned(), assistant.to_owned());
            inner.ours_by_assistant.insert(assistant.to_owned(), session_id.to_owned());
        }
    }

    /// Record the assistant-side id for one of our sessions.
    pub fn map_assistant(&self, session_id: &str, assistant_session_id: &str) {
        let mut inner = self.lock();
        if let Some(old) = inner
            .assistant_by_ours
            .insert(session_id.to_owned(), assistant_session_id.to_owned())
        {
            inner.ours_by_assistant.remove(&old);
        }
        inner
            .ours_by_assistant
            .insert(assistant_session_id.to_owned(), session_id.to_owned());
    }

    pub fn assistant_for(&self, session_id: &str) -> Option<String> {
        self.lock().assistant_by_ours.get(session_id).cloned()
    }

    pub fn ours_for(&self, assistant_session_id: &str) -> Option<String> {
        self.lock().ours_by_assistant.get(assistant_session_id).cloned()
    }

    pub fn session_for_dir(&self, working_dir: &Path) -> Option<DirRoute> {
        self.lock().dir_routes.get(working_dir).cloned()
    }

    /// Drop every route touching `session_id`.
    pub fn remove(&self, session_id: &str) {
        let mut inner = self.lock();
        if let Some(assistant) = inner.assistant_by_ours.remove(session_id) {
            inner.ours_by_assistant.remove(&assistant);
        }
        inner.dir_routes.retain(|_, route| route.session_id != session_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RoutingInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[path = "routing_tests.rs"]
mod tests;
