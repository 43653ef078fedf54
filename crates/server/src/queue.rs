// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session FIFO of undelivered fan-out messages, replayed when a client
//! subscribes. Messages age out; under length pressure non-critical messages
//! are dropped first.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::transport::ws_msg::{Envelope, OutboundKind};

/// One held message with its enqueue time and drop priority.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub message: Envelope,
    pub enqueued_at: Instant,
    pub critical: bool,
}

/// Queue caps.
#[derive(Debug, Clone, Copy)]
pub struct QueueLimits {
    pub max_age: Duration,
    pub max_length: usize,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self { max_age: Duration::from_secs(3600), max_length: 100 }
    }
}

/// Session-keyed message queues under one lock.
pub struct MessageQueue {
    limits: QueueLimits,
    queues: Mutex<HashMap<String, VecDeque<QueuedMessage>>>,
}

impl MessageQueue {
    pub fn new(limits: QueueLimits) -> Self {
        Self { limits, queues: Mutex::new(HashMap::new()) }
    }

    /// Hold a message for a session with no ready subscriber. Ping/pong
    /// traffic is never queued.
    pub fn enqueue(&self, session_id: &str, message: Envelope) {
        if matches!(message.kind, OutboundKind::Ping | OutboundKind::Pong) {
            return;
        }

        let mut queues = self.lock();
        let queue = queues.entry(session_id.to_owned()).or_default();
        expire(queue, self.limits.max_age);

        if queue.len() >= self.limits.max_length {
            // Drop the oldest non-critical message first; fall back to the
            // oldest overall so the queue never exceeds its cap.
            if let Some(pos) = queue.iter().position(|m| !m.critical) {
                queue.remove(pos);
            } else {
                queue.pop_front();
            }
            debug!(session = session_id, "queue over capacity, dropped one message");
        }

        queue.push_back(QueuedMessage {
            critical: message.is_critical(),
            message,
            enqueued_at: Instant::now(),
        });
    }

    /// Drain a session's backlog in FIFO order (called on subscribe).
    pub fn drain(&self, session_id: &str) -> Vec<Envelope> {
        let mut queues = self.lock();
        let Some(mut queue) = queues.remove(session_id) else {
            return Vec::new();
        };
        expire(&mut queue, self.limits.max_age);
        queue.into_iter().map(|m| m.message).collect()
    }

    /// Evict everything for a session (session close).
    pub fn remove(&self, session_id: &str) {
        self.lock().remove(session_id);
    }

    pub fn len(&self, session_id: &str) -> usize {
        self.lock().get(session_id).map(VecDeque::len).unwrap_or(0)
    }

    pub fn is_empty(&self, session_id: &str) -> bool {
        self.len(session_id) == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<QueuedMessage>>> {
        match self.queues.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new(QueueLimits::default())
    }
}

fn expire(queue: &mut VecDeque<QueuedMessage>, max_age: Duration) {
    while queue.front().is_some_and(|m| m.enqueued_at.elapsed() > max_age) {
        queue.pop_front();
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
