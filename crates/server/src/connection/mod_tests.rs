// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio::sync::mpsc;

use crate::transport::ws_msg::Envelope;

use super::{ClientInfo, ConnectionManager};

fn manager() -> ConnectionManager {
    ConnectionManager::new(
        Duration::from_secs(60),
        Duration::from_secs(3600),
        Duration::from_secs(30),
    )
}

fn device(info_id: &str) -> ClientInfo {
    ClientInfo { device_id: Some(info_id.to_owned()), ..Default::default() }
}

fn channel() -> (mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>) {
    mpsc::channel(16)
}

#[test]
fn register_creates_a_fresh_client() {
    let manager = manager();
    let (tx, _rx) = channel();
    let outcome = manager.register(device("d1"), tx);

    assert!(!outcome.is_reconnection);
    assert!(outcome.previous_client_id.is_none());
    assert!(outcome.restored_sessions.is_empty());
    assert_eq!(manager.client_count(), 1);
}

#[test]
fn reconnection_restores_subscriptions() {
    let manager = manager();

    let (tx, _rx) = channel();
    let first = manager.register(device("d1"), tx);
    manager.subscribe(&first.client.id, "s1");
    manager.subscribe(&first.client.id, "s2");
    let first_id = first.client.id.clone();
    manager.disconnect(&first_id);
    assert_eq!(manager.client_count(), 0);

    let (tx, _rx) = channel();
    let second = manager.register(device("d1"), tx);
    assert!(second.is_reconnection);
    assert_eq!(second.previous_client_id.as_deref(), Some(first_id.as_str()));
    assert_eq!(second.restored_sessions, vec!["s1".to_owned(), "s2".to_owned()]);
    assert!(second.client.is_subscribed("s1"));
    assert!(second.client.is_subscribed("s2"));
}

#[test]
fn different_device_is_not_a_reconnection() {
    let manager = manager();
    let (tx, _rx) = channel();
    let first = manager.register(device("d1"), tx);
    manager.disconnect(&first.client.id);

    let (tx, _rx) = channel();
    let other = manager.register(device("d2"), tx);
    assert!(!other.is_reconnection);
}

#[test]
fn subscribers_of_filters_by_session() {
    let manager = manager();
    let (tx, _rx) = channel();
    let a = manager.register(device("a"), tx);
    let (tx, _rx) = channel();
    let b = manager.register(device("b"), tx);

    manager.subscribe(&a.client.id, "s1");
    manager.subscribe(&b.client.id, "s2");

    let subs = manager.subscribers_of("s1");
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].id, a.client.id);
}

#[test]
fn register_device_rekeys_the_fingerprint() {
    let manager = manager();
    let (tx, _rx) = channel();
    let outcome = manager.register(ClientInfo::default(), tx);

    let fp = manager.register_device(&outcome.client.id, "tablet-7").unwrap();
    assert_eq!(fp, "device:tablet-7");
    assert_eq!(outcome.client.fingerprint(), "device:tablet-7");

    // A later connection with that device id now matches history.
    manager.subscribe(&outcome.client.id, "s1");
    manager.disconnect(&outcome.client.id);
    let (tx, _rx) = channel();
    let back = manager.register(device("tablet-7"), tx);
    assert!(back.is_reconnection);
    assert_eq!(back.restored_sessions, vec!["s1".to_owned()]);
}

#[test]
fn try_send_delivers_and_updates_activity() {
    let manager = manager();
    let (tx, mut rx) = channel();
    let outcome = manager.register(device("d1"), tx);

    let before = outcome.client.last_activity();
    assert!(outcome.client.try_send(Envelope::event(
        crate::transport::ws_msg::OutboundKind::StreamData,
        serde_json::json!({"n": 1}),
    )));
    assert!(rx.try_recv().is_ok());
    assert!(outcome.client.last_activity() >= before);
}

#[test]
fn try_send_fails_when_transport_gone() {
    let manager = manager();
    let (tx, rx) = channel();
    let outcome = manager.register(device("d1"), tx);
    drop(rx);

    assert!(!outcome.client.is_ready());
    assert!(!outcome.client.try_send(Envelope::event(
        crate::transport::ws_msg::OutboundKind::StreamData,
        serde_json::Value::Null,
    )));
}

#[tokio::test]
async fn health_loop_drops_silent_clients() {
    let manager = std::sync::Arc::new(ConnectionManager::new(
        Duration::from_secs(60),
        Duration::from_secs(3600),
        Duration::from_millis(20),
    ));
    let (tx, _rx) = channel();
    let outcome = manager.register(device("d1"), tx);
    let client_id = outcome.client.id.clone();

    let shutdown = tokio_util::sync::CancellationToken::new();
    let task = tokio::spawn(
        std::sync::Arc::clone(&manager).run_health_checks(shutdown.clone()),
    );

    // First pass marks the client unproven and pings; with no pong, the
    // second pass drops it.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while manager.get(&client_id).is_some() {
        if tokio::time::Instant::now() > deadline {
            panic!("client was never dropped");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.cancel();
    let _ = task.await;
}

#[tokio::test]
async fn health_loop_keeps_responsive_clients() {
    let manager = std::sync::Arc::new(ConnectionManager::new(
        Duration::from_secs(60),
        Duration::from_secs(3600),
        Duration::from_millis(20),
    ));
    let (tx, mut rx) = channel();
    let outcome = manager.register(device("d1"), tx);
    let client_id = outcome.client.id.clone();

    let shutdown = tokio_util::sync::CancellationToken::new();
    let task = tokio::spawn(
        std::sync::Arc::clone(&manager).run_health_checks(shutdown.clone()),
    );

    // Answer every ping for a few cycles.
    for _ in 0..5 {
        if tokio::time::timeout(Duration::from_millis(200), rx.recv()).await.is_ok() {
            manager.mark_alive(&client_id);
        }
    }
    assert!(manager.get(&client_id).is_some());

    shutdown.cancel();
    let _ = task.await;
}
