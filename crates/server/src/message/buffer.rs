// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session accumulator of assistant messages awaiting aggregation.

use indexmap::IndexMap;
use serde_json::Value;

use super::codeblock::Deliverable;

/// Default ceiling on buffered assistant messages per session.
const DEFAULT_MAX_MESSAGES: usize = 200;

/// Ordered accumulator for one session: assistant messages, extracted
/// deliverables, the last system-init event, and a bounded by-id map of
/// recent messages for paginated catch-up.
#[derive(Debug, Clone)]
pub struct SessionBuffer {
    pub assistant_messages: Vec<Value>,
    pub deliverables: Vec<Deliverable>,
    pub system_init: Option<Value>,
    pub permission_request_sent: bool,
    pub tool_use_in_progress: bool,
    /// Recent messages keyed by `message.id`, oldest first.
    pub recent: IndexMap<String, Value>,
    max_messages: usize,
}

impl Default for SessionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_MESSAGES)
    }

    /// Build a buffer holding at most `max_messages` assistant messages;
    /// older ones are evicted first.
    pub fn with_capacity(max_messages: usize) -> Self {
        Self {
            assistant_messages: Vec::new(),
            deliverables: Vec::new(),
            system_init: None,
            permission_request_sent: false,
            tool_use_in_progress: false,
            recent: IndexMap::new(),
            max_messages: max_messages.max(1),
        }
    }

    /// Append an assistant `message`, tracking it by id for catch-up.
    pub fn push_assistant(&mut self, message: Value) {
        if let Some(id) = message.get("id").and_then(|v| v.as_str()) {
            self.recent.insert(id.to_owned(), message.clone());
            while self.recent.len() > self.max_messages {
                self.recent.shift_remove_index(0);
            }
        }
        self.assistant_messages.push(message);
        while self.assistant_messages.len() > self.max_messages {
            self.assistant_messages.remove(0);
        }
    }

    /// Messages recorded after the one with `after` (all of them when `after`
    /// is unknown or absent), capped at `limit`.
    pub fn recent_after(&self, after: Option<&str>, limit: usize) -> Vec<Value> {
        let skip = after
            .and_then(|id| self.recent.get_index_of(id))
            .map(|i| i + 1)
            .unwrap_or(0);
        self.recent.values().skip(skip).take(limit).cloned().collect()
    }

    /// Reset to the empty state (new prompt, explicit clear, session close).
    pub fn clear(&mut self) {
        self.assistant_messages.clear();
        self.deliverables.clear();
        self.system_init = None;
        self.permission_request_sent = false;
        self.tool_use_in_progress = false;
        self.recent.clear();
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
