// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only in-memory audit ring for command decisions.

use std::collections::VecDeque;

use serde::Serialize;

use crate::event::epoch_ms;

/// Ring capacity; the oldest entry falls off when exceeded.
const CAPACITY: usize = 1000;

/// One audited command decision.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: u64,
    pub command: String,
    pub cwd: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Bounded audit log. Callers hold the surrounding lock.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        command: &str,
        cwd: &str,
        allowed: bool,
        reason: Option<String>,
        request_id: Option<String>,
    ) {
        if self.entries.len() >= CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(AuditEntry {
            timestamp: epoch_ms(),
            command: command.to_owned(),
            cwd: cwd.to_owned(),
            allowed,
            reason,
            request_id,
        });
    }

    /// Snapshot entries, optionally filtered by their allowed flag.
    pub fn entries(&self, allowed: Option<bool>) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| allowed.is_none_or(|want| e.allowed == want))
            .cloned()
            .collect()
    }

    /// Drop everything, returning how many entries were cleared.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
