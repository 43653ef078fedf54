// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{is_process_alive, ProcessMonitor};

#[test]
fn own_pid_is_alive() {
    assert!(is_process_alive(std::process::id()));
}

#[test]
fn bogus_pid_is_dead() {
    // PID 0 targets the caller's process group; use an id far beyond
    // pid_max instead.
    assert!(!is_process_alive(u32::MAX - 1));
}

#[tokio::test]
async fn reports_dead_sessions() {
    let snapshot = Arc::new(|| vec![("gone".to_owned(), u32::MAX - 1)]);
    let monitor = ProcessMonitor::new(snapshot).with_poll_interval(Duration::from_millis(10));

    let (dead_tx, mut dead_rx) = mpsc::channel(4);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(monitor.run(dead_tx, shutdown.clone()));

    let dead = tokio::time::timeout(Duration::from_secs(2), dead_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dead, "gone");

    shutdown.cancel();
    let _ = task.await;
}

#[tokio::test]
async fn live_sessions_are_not_reported() {
    let snapshot = Arc::new(|| vec![("me".to_owned(), std::process::id())]);
    let monitor = ProcessMonitor::new(snapshot).with_poll_interval(Duration::from_millis(10));

    let (dead_tx, mut dead_rx) = mpsc::channel(4);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(monitor.run(dead_tx, shutdown.clone()));

    let outcome = tokio::time::timeout(Duration::from_millis(100), dead_rx.recv()).await;
    assert!(outcome.is_err(), "live session should not be reported dead");

    shutdown.cancel();
    let _ = task.await;
}
