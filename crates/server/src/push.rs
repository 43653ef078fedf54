// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push-notification collaborator seam. The server hands a note to the
//! notifier whenever a session-scoped message finds no ready subscriber;
//! the transport that actually reaches devices lives behind this trait.

use tracing::info;

/// Metadata for one undeliverable message.
#[derive(Debug, Clone)]
pub struct PushNote {
    pub session_id: String,
    pub kind: &'static str,
    pub summary: String,
}

/// Collaborator contract for the offline-delivery channel.
pub trait PushNotifier: Send + Sync {
    fn notify(&self, note: PushNote);
}

/// Default notifier: records the hand-off in the log stream only.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl PushNotifier for LogNotifier {
    fn notify(&self, note: PushNote) {
        info!(
            session = %note.session_id,
            kind = note.kind,
            "push hand-off: {}",
            note.summary
        );
    }
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;
