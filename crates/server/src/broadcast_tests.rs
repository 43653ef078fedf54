// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use crate::connection::{ClientInfo, ConnectionManager};
use crate::error::ErrorCode;
use crate::event::{ProcessEvent, ServerEvent, SessionEvent, StreamEvent};
use crate::push::{PushNote, PushNotifier};
use crate::queue::MessageQueue;
use crate::transport::ws_msg::{Envelope, OutboundKind};

use super::{translate, Broadcaster};

#[derive(Default)]
struct RecordingPush {
    notes: Mutex<Vec<PushNote>>,
}

impl PushNotifier for RecordingPush {
    fn notify(&self, note: PushNote) {
        if let Ok(mut notes) = self.notes.lock() {
            notes.push(note);
        }
    }
}

struct Fixture {
    connections: Arc<ConnectionManager>,
    queue: Arc<MessageQueue>,
    push: Arc<RecordingPush>,
    broadcaster: Broadcaster,
}

fn fixture() -> Fixture {
    let connections = Arc::new(ConnectionManager::new(
        Duration::from_secs(60),
        Duration::from_secs(3600),
        Duration::from_secs(30),
    ));
    let queue = Arc::new(MessageQueue::default());
    let push = Arc::new(RecordingPush::default());
    let broadcaster = Broadcaster::new(
        Arc::clone(&connections),
        Arc::clone(&queue),
        Arc::clone(&push) as Arc<dyn PushNotifier>,
    );
    Fixture { connections, queue, push, broadcaster }
}

fn subscribed_client(
    fixture: &Fixture,
    session: &str,
) -> (String, mpsc::Receiver<Envelope>) {
    let (tx, rx) = mpsc::channel(16);
    let outcome = fixture.connections.register(ClientInfo::default(), tx);
    fixture.connections.subscribe(&outcome.client.id, session);
    (outcome.client.id.clone(), rx)
}

#[test]
fn broadcast_reaches_subscribers() {
    let f = fixture();
    let (_id, mut rx) = subscribed_client(&f, "s1");

    f.broadcaster
        .broadcast_to_session("s1", Envelope::event(OutboundKind::StreamData, json!({"n": 1})));

    let got = rx.try_recv().unwrap();
    assert_eq!(got.kind, OutboundKind::StreamData);
    assert!(f.queue.is_empty("s1"));
    assert!(f.push.notes.lock().unwrap().is_empty());
}

#[test]
fn broadcast_skips_other_sessions() {
    let f = fixture();
    let (_id, mut rx) = subscribed_client(&f, "other");

    f.broadcaster
        .broadcast_to_session("s1", Envelope::event(OutboundKind::StreamData, json!({})));

    assert!(rx.try_recv().is_err());
}

#[test]
fn no_subscriber_queues_and_pushes() {
    let f = fixture();
    f.broadcaster.broadcast_to_session(
        "lonely",
        Envelope::event(
            OutboundKind::AssistantMessage,
            json!({"content": "hello there"}),
        ),
    );

    assert_eq!(f.queue.len("lonely"), 1);
    let notes = f.push.notes.lock().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].session_id, "lonely");
    assert_eq!(notes[0].kind, "assistantMessage");
    assert_eq!(notes[0].summary, "hello there");
}

#[test]
fn dead_transport_counts_as_no_subscriber() {
    let f = fixture();
    let (tx, rx) = mpsc::channel(16);
    let outcome = f.connections.register(ClientInfo::default(), tx);
    f.connections.subscribe(&outcome.client.id, "s1");
    drop(rx);

    f.broadcaster
        .broadcast_to_session("s1", Envelope::event(OutboundKind::StreamData, json!({})));
    assert_eq!(f.queue.len("s1"), 1);
}

#[test]
fn send_message_semantics() {
    let f = fixture();
    let (id, mut rx) = subscribed_client(&f, "s1");

    assert!(f
        .broadcaster
        .send_message(&id, Envelope::event(OutboundKind::Pong, serde_json::Value::Null)));
    assert_eq!(rx.try_recv().unwrap().kind, OutboundKind::Pong);

    assert!(!f.broadcaster.send_message(
        "missing",
        Envelope::event(OutboundKind::Pong, serde_json::Value::Null)
    ));
}

#[test]
fn send_error_message_wraps_the_code() {
    let f = fixture();
    let (id, mut rx) = subscribed_client(&f, "s1");

    assert!(f.broadcaster.send_error_message(
        &id,
        Some("r9".to_owned()),
        ErrorCode::SessionNotFound,
        "no such session",
    ));
    let got = rx.try_recv().unwrap();
    assert_eq!(got.kind, OutboundKind::Error);
    assert_eq!(got.request_id.as_deref(), Some("r9"));
    assert_eq!(got.error.unwrap().code, "SESSION_NOT_FOUND");
}

// -- translation --------------------------------------------------------------

#[test]
fn session_events_translate() {
    let created = translate(&ServerEvent::Session(SessionEvent::Created {
        session_id: "s1".to_owned(),
        working_dir: "/proj".to_owned(),
    }))
    .unwrap();
    assert_eq!(created.kind, OutboundKind::SessionCreated);
    assert_eq!(created.data["sessionId"], "s1");
    assert_eq!(created.data["workingDirectory"], "/proj");

    let cleaned = translate(&ServerEvent::Session(SessionEvent::Cleaned {
        session_id: "s1".to_owned(),
        reason: crate::event::CleanReason::ProcessDied,
    }))
    .unwrap();
    assert_eq!(cleaned.kind, OutboundKind::SessionCleaned);
    assert_eq!(cleaned.data["reason"], "process_died");
}

#[test]
fn process_events_translate() {
    let started = translate(&ServerEvent::Process(ProcessEvent::Started {
        session_id: "s1".to_owned(),
        pid: 77,
    }))
    .unwrap();
    assert_eq!(started.kind, OutboundKind::ProcessStart);
    assert_eq!(started.data["pid"], 77);

    let exited = translate(&ServerEvent::Process(ProcessEvent::Exited {
        session_id: "s1".to_owned(),
        code: Some(1),
    }))
    .unwrap();
    assert_eq!(exited.kind, OutboundKind::ProcessExit);
    assert!(exited.is_critical());
}

#[test]
fn stream_events_translate() {
    let init = translate(&ServerEvent::Stream(StreamEvent::SystemInit {
        session_id: "s1".to_owned(),
        init: json!({"model": "m", "cwd": "/proj"}),
    }))
    .unwrap();
    assert_eq!(init.kind, OutboundKind::SystemInit);
    assert_eq!(init.data["sessionId"], "s1");
    assert_eq!(init.data["model"], "m");

    let chunk = translate(&ServerEvent::Stream(StreamEvent::Chunk {
        session_id: "s1".to_owned(),
        chunk: crate::stream::TextChunker::new()
            .parse_data(b"hello\n\n", false)
            .remove(0),
        is_final: true,
    }))
    .unwrap();
    assert_eq!(chunk.kind, OutboundKind::StreamChunk);
    assert_eq!(chunk.data["isFinal"], true);
    assert!(chunk.is_final_marker());
}

#[test]
fn permission_required_is_critical() {
    let env = translate(&ServerEvent::Stream(StreamEvent::PermissionRequired {
        session_id: "s1".to_owned(),
        prompt: "Proceed? (y/n)".to_owned(),
        request_id: Some("p1".to_owned()),
    }))
    .unwrap();
    assert_eq!(env.kind, OutboundKind::PermissionRequired);
    assert!(env.is_critical());
    assert_eq!(env.data["prompt"], "Proceed? (y/n)");
}
