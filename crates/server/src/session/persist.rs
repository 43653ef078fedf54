// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence seam for restore-by-directory. The manager records which
//! session last served a directory; a later create for the same directory
//! can resume it instead of starting cold.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A remembered directory→session binding.
#[derive(Debug, Clone)]
pub struct PersistedSession {
    pub session_id: String,
    pub assistant_session_id: Option<String>,
}

/// Injected persistence contract. Implementations decide durability; the
/// manager only consumes recency.
pub trait SessionPersistence: Send + Sync {
    fn record(&self, directory: &Path, session_id: &str, assistant_session_id: Option<&str>);
    fn recent_for_directory(&self, directory: &Path) -> Option<PersistedSession>;
    fn forget(&self, session_id: &str);
}

#[derive(Debug, Clone)]
struct StoredEntry {
    session: PersistedSession,
    recorded_at: Instant,
}

/// Default in-memory implementation with a recency window.
pub struct MemoryPersistence {
    retention: Duration,
    entries: Mutex<HashMap<PathBuf, StoredEntry>>,
}

impl MemoryPersistence {
    pub fn new(retention: Duration) -> Self {
        Self { retention, entries: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, StoredEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SessionPersistence for MemoryPersistence {
    fn record(&self, directory: &Path, session_id: &str, assistant_session_id: Option<&str>) {
        self.lock().insert(
            directory.to_path_buf(),
            StoredEntry {
                session: PersistedSession {
                    session_id: session_id.to_owned(),
                    assistant_session_id: assistant_session_id.map(str::to_owned),
                },
                recorded_at: Instant::now(),
            },
        );
    }

    fn recent_for_directory(&self, directory: &Path) -> Option<PersistedSession> {
        let entries = self.lock();
        let entry = entries.get(directory)?;
        if entry.recorded_at.elapsed() > self.retention {
            return None;
        }
        Some(entry.session.clone())
    }

    fn forget(&self, session_id: &str) {
        self.lock().retain(|_, e| e.session.session_id != session_id);
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
