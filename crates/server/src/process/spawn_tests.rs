// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

use super::{check_availability, spawn_assistant, RunnerConfig};

#[test]
fn args_carry_stream_json_and_tools() {
    let config = RunnerConfig::default();
    let args = config.args(None);
    assert!(args.windows(2).any(|w| w == ["--output-format", "stream-json"]));
    assert!(args.windows(2).any(|w| w == ["--allowedTools", "Read,Write,Edit"]));
    assert!(args.windows(2).any(|w| w == ["--permission-mode", "default"]));
    assert!(!args.iter().any(|a| a == "--dangerously-skip-permissions"));
    assert!(!args.iter().any(|a| a == "--resume"));
}

#[test]
fn args_honor_skip_permissions_and_resume() {
    let config = RunnerConfig {
        skip_permissions: true,
        disallowed_tools: vec!["Bash".to_owned()],
        ..Default::default()
    };
    let args = config.args(Some("abc-123"));
    assert!(args.iter().any(|a| a == "--dangerously-skip-permissions"));
    assert!(args.windows(2).any(|w| w == ["--disallowedTools", "Bash"]));
    assert!(args.windows(2).any(|w| w == ["--resume", "abc-123"]));
}

#[test]
fn availability_checks_path_and_absolute() {
    assert!(check_availability("sh"));
    assert!(check_availability("/bin/sh"));
    assert!(!check_availability("surely-not-a-real-binary-name"));
    assert!(!check_availability("/no/such/binary"));
}

fn fake_assistant(dir: &std::path::Path, body: &str) -> String {
    let script = dir.join("fake-assistant");
    std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script.display().to_string()
}

#[tokio::test]
async fn spawn_round_trips_stdin_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let binary = fake_assistant(
        dir.path(),
        r#"read line
echo "{\"type\":\"result\",\"result\":\"ok\"}""#,
    );
    let config = RunnerConfig { binary, ..Default::default() };

    let mut spawned = spawn_assistant(&config, dir.path(), None).unwrap();
    assert!(spawned.handle.pid > 0);
    spawned.handle.write_line("hello").await.unwrap();

    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !String::from_utf8_lossy(&collected).contains("result") {
        let Ok(Some(frame)) =
            tokio::time::timeout_at(deadline, spawned.stdout_rx.recv()).await
        else {
            panic!("no stdout before deadline");
        };
        collected.extend_from_slice(&frame);
    }

    let code = tokio::time::timeout(Duration::from_secs(5), spawned.exit_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(code, Some(0));
}

#[tokio::test]
async fn handle_reports_liveness() {
    let dir = tempfile::tempdir().unwrap();
    let binary = fake_assistant(dir.path(), "sleep 30");
    let config = RunnerConfig { binary, ..Default::default() };

    let spawned = spawn_assistant(&config, dir.path(), None).unwrap();
    assert!(spawned.handle.is_alive());

    spawned.handle.signal(nix::sys::signal::Signal::SIGKILL);
    let _ = tokio::time::timeout(Duration::from_secs(5), spawned.exit_rx).await;
}
