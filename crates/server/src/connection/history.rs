// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fingerprint-keyed connection history for reconnection matching.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// History record for one fingerprint.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub last_client_id: String,
    pub last_seen: Instant,
    pub session_ids: HashSet<String>,
}

/// What a reconnecting fingerprint gets back.
#[derive(Debug, Clone)]
pub struct ReconnectMatch {
    pub previous_client_id: String,
    /// True when the disconnect happened within the reconnection window.
    pub is_reconnection: bool,
    /// Subscriptions to restore; empty once past the retention horizon.
    pub session_ids: HashSet<String>,
}

/// Bounded-lifetime fingerprint history.
///
/// The short `reconnection_window` bounds the `isReconnection` flag; the
/// longer `retention` bounds subscription restore. Entries are purged once
/// older than the larger of `2×window` and `retention`.
pub struct ConnectionHistory {
    reconnection_window: Duration,
    retention: Duration,
    entries: Mutex<HashMap<String, HistoryEntry>>,
}

impl ConnectionHistory {
    pub fn new(reconnection_window: Duration, retention: Duration) -> Self {
        Self { reconnection_window, retention, entries: Mutex::new(HashMap::new()) }
    }

    /// Record a disconnect for later matching.
    pub fn record_disconnect(
        &self,
        fingerprint: &str,
        client_id: &str,
        session_ids: HashSet<String>,
    ) {
        let mut entries = self.lock();
        entries.insert(
            fingerprint.to_owned(),
            HistoryEntry {
                last_client_id: client_id.to_owned(),
                last_seen: Instant::now(),
                session_ids,
            },
        );
    }

    /// Look up a connecting fingerprint against recorded disconnects.
    pub fn lookup(&self, fingerprint: &str) -> Option<ReconnectMatch> {
        let entries = self.lock();
        let entry = entries.get(fingerprint)?;
        let age = entry.last_seen.elapsed();

        if age > self.purge_horizon() {
            return None;
        }

        let session_ids = if age <= self.retention {
            entry.session_ids.clone()
        } else {
            HashSet::new()
        };

        Some(ReconnectMatch {
            previous_client_id: entry.last_client_id.clone(),
            is_reconnection: age <= self.reconnection_window,
            session_ids,
        })
    }

    /// Drop entries past the purge horizon; returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let horizon = self.purge_horizon();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.last_seen.elapsed() <= horizon);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_horizon(&self) -> Duration {
        self.retention.max(self.reconnection_window * 2)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HistoryEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
