// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::time::Duration;

use super::ConnectionHistory;

fn sessions(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|s| (*s).to_owned()).collect()
}

#[test]
fn lookup_within_window_is_a_reconnection() {
    let history = ConnectionHistory::new(Duration::from_secs(60), Duration::from_secs(3600));
    history.record_disconnect("device:d1", "c1", sessions(&["s1", "s2"]));

    let matched = history.lookup("device:d1").unwrap();
    assert!(matched.is_reconnection);
    assert_eq!(matched.previous_client_id, "c1");
    assert_eq!(matched.session_ids, sessions(&["s1", "s2"]));
}

#[test]
fn unknown_fingerprint_is_none() {
    let history = ConnectionHistory::new(Duration::from_secs(60), Duration::from_secs(3600));
    assert!(history.lookup("device:ghost").is_none());
}

#[test]
fn past_window_still_restores_subscriptions() {
    let history = ConnectionHistory::new(Duration::from_millis(1), Duration::from_secs(3600));
    history.record_disconnect("device:d1", "c1", sessions(&["s1"]));
    std::thread::sleep(Duration::from_millis(10));

    let matched = history.lookup("device:d1").unwrap();
    assert!(!matched.is_reconnection);
    assert_eq!(matched.session_ids, sessions(&["s1"]));
}

#[test]
fn past_retention_is_gone() {
    let history = ConnectionHistory::new(Duration::from_millis(1), Duration::from_millis(2));
    history.record_disconnect("device:d1", "c1", sessions(&["s1"]));
    std::thread::sleep(Duration::from_millis(10));
    assert!(history.lookup("device:d1").is_none());
}

#[test]
fn cleanup_prunes_old_entries() {
    let history = ConnectionHistory::new(Duration::from_millis(1), Duration::from_millis(2));
    history.record_disconnect("a", "c1", sessions(&[]));
    history.record_disconnect("b", "c2", sessions(&[]));
    assert_eq!(history.len(), 2);

    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(history.cleanup(), 2);
    assert!(history.is_empty());
}

#[test]
fn newer_disconnect_replaces_older() {
    let history = ConnectionHistory::new(Duration::from_secs(60), Duration::from_secs(3600));
    history.record_disconnect("device:d1", "c1", sessions(&["s1"]));
    history.record_disconnect("device:d1", "c2", sessions(&["s2"]));

    let matched = history.lookup("device:d1").unwrap();
    assert_eq!(matched.previous_client_id, "c2");
    assert_eq!(matched.session_ids, sessions(&["s2"]));
}
