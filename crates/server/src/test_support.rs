// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared builders for unit tests.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::event::ServerEvent;
use crate::queue::MessageQueue;
use crate::session::{MemoryPersistence, SessionLimits, SessionManager};

/// A session manager wired to fresh in-memory collaborators plus a real
/// temporary working directory.
pub struct Harness {
    pub manager: Arc<SessionManager>,
    pub queue: Arc<MessageQueue>,
    pub events_tx: broadcast::Sender<ServerEvent>,
    pub workdir: tempfile::TempDir,
}

impl Harness {
    /// The temp working directory as an absolute string path.
    pub fn dir(&self) -> String {
        self.workdir.path().display().to_string()
    }

    /// A fresh subdirectory under the temp root.
    pub fn subdir(&self, name: &str) -> String {
        let path = self.workdir.path().join(name);
        let _ = std::fs::create_dir_all(&path);
        path.display().to_string()
    }
}

pub fn harness() -> Harness {
    harness_with_limits(SessionLimits::default())
}

pub fn harness_with_limits(limits: SessionLimits) -> Harness {
    let queue = Arc::new(MessageQueue::default());
    let (events_tx, _) = broadcast::channel(256);
    let persistence = Arc::new(MemoryPersistence::new(std::time::Duration::from_secs(3600)));
    let manager = Arc::new(SessionManager::new(
        limits,
        persistence,
        Arc::clone(&queue),
        events_tx.clone(),
    ));
    let workdir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    Harness { manager, queue, events_tx, workdir }
}

/// Drain everything currently sitting in an event receiver.
pub fn drain_events(rx: &mut broadcast::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}
