// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Mutex;

use super::{LogNotifier, PushNote, PushNotifier};

/// Test double that records every note.
#[derive(Default)]
pub struct RecordingNotifier {
    pub notes: Mutex<Vec<PushNote>>,
}

impl PushNotifier for RecordingNotifier {
    fn notify(&self, note: PushNote) {
        if let Ok(mut notes) = self.notes.lock() {
            notes.push(note);
        }
    }
}

#[test]
fn log_notifier_accepts_notes() {
    let notifier = LogNotifier;
    notifier.notify(PushNote {
        session_id: "s1".to_owned(),
        kind: "assistantMessage",
        summary: "done".to_owned(),
    });
}

#[test]
fn recording_notifier_captures_notes() {
    let notifier = RecordingNotifier::default();
    notifier.notify(PushNote {
        session_id: "s1".to_owned(),
        kind: "conversationResult",
        summary: "finished".to_owned(),
    });
    let notes = notifier.notes.lock().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].session_id, "s1");
}
