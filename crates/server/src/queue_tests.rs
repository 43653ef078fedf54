// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serde_json::json;

use crate::transport::ws_msg::{Envelope, OutboundKind};

use super::{MessageQueue, QueueLimits};

fn msg(kind: OutboundKind, n: u64) -> Envelope {
    Envelope::event(kind, json!({ "n": n }))
}

#[test]
fn fifo_enqueue_and_drain() {
    let queue = MessageQueue::default();
    queue.enqueue("s1", msg(OutboundKind::StreamData, 1));
    queue.enqueue("s1", msg(OutboundKind::StreamData, 2));

    let drained = queue.drain("s1");
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].data["n"], 1);
    assert_eq!(drained[1].data["n"], 2);

    assert!(queue.drain("s1").is_empty());
}

#[test]
fn sessions_are_independent() {
    let queue = MessageQueue::default();
    queue.enqueue("a", msg(OutboundKind::StreamData, 1));
    queue.enqueue("b", msg(OutboundKind::StreamData, 2));
    assert_eq!(queue.len("a"), 1);
    assert_eq!(queue.len("b"), 1);
    queue.remove("a");
    assert!(queue.is_empty("a"));
    assert_eq!(queue.len("b"), 1);
}

#[test]
fn ping_pong_are_never_queued() {
    let queue = MessageQueue::default();
    queue.enqueue("s1", msg(OutboundKind::Ping, 1));
    queue.enqueue("s1", msg(OutboundKind::Pong, 2));
    assert!(queue.is_empty("s1"));
}

#[test]
fn overflow_drops_non_critical_first() {
    let limits = QueueLimits { max_age: Duration::from_secs(60), max_length: 3 };
    let queue = MessageQueue::new(limits);

    queue.enqueue("s1", msg(OutboundKind::ConversationResult, 1)); // critical
    queue.enqueue("s1", msg(OutboundKind::StreamData, 2));
    queue.enqueue("s1", msg(OutboundKind::StreamData, 3));
    queue.enqueue("s1", msg(OutboundKind::StreamData, 4));

    let drained = queue.drain("s1");
    assert_eq!(drained.len(), 3);
    // The critical result survived; the oldest stream frame was dropped.
    assert_eq!(drained[0].kind, OutboundKind::ConversationResult);
    assert_eq!(drained[1].data["n"], 3);
    assert_eq!(drained[2].data["n"], 4);
}

#[test]
fn overflow_falls_back_to_oldest_when_all_critical() {
    let limits = QueueLimits { max_age: Duration::from_secs(60), max_length: 2 };
    let queue = MessageQueue::new(limits);

    queue.enqueue("s1", msg(OutboundKind::ConversationResult, 1));
    queue.enqueue("s1", msg(OutboundKind::PermissionRequired, 2));
    queue.enqueue("s1", msg(OutboundKind::ProcessExit, 3));

    let drained = queue.drain("s1");
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].data["n"], 2);
    assert_eq!(drained[1].data["n"], 3);
}

#[test]
fn aged_messages_expire_on_access() {
    let limits = QueueLimits { max_age: Duration::from_millis(0), max_length: 10 };
    let queue = MessageQueue::new(limits);
    queue.enqueue("s1", msg(OutboundKind::StreamData, 1));
    std::thread::sleep(Duration::from_millis(5));
    assert!(queue.drain("s1").is_empty());
}
