// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `companion` binary and drive
//! it over HTTP and WebSocket with a scripted assistant.

use std::time::Duration;

use serde_json::json;

use companion::error::ErrorCode;
use companion_specs::{connect_ws, recv_kind, send_json, CompanionProcess};

const TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::test]
async fn http_health() -> anyhow::Result<()> {
    let server = CompanionProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value =
        reqwest::get(format!("{}/health", server.base_url())).await?.json().await?;

    assert_eq!(resp["status"], "running");
    assert_eq!(resp["activeSessions"], 0);
    assert!(resp["uptimeSecs"].is_u64());
    Ok(())
}

#[tokio::test]
async fn welcome_greets_new_clients() -> anyhow::Result<()> {
    let server = CompanionProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;

    let mut ws = connect_ws(&server.ws_url(), None).await?;
    let welcome = recv_kind(&mut ws, "welcome", TIMEOUT).await?;
    assert!(welcome["data"]["clientId"].is_string());
    assert_eq!(welcome["data"]["isReconnection"], false);
    Ok(())
}

#[tokio::test]
async fn ping_pong() -> anyhow::Result<()> {
    let server = CompanionProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;

    let mut ws = connect_ws(&server.ws_url(), None).await?;
    recv_kind(&mut ws, "welcome", TIMEOUT).await?;

    send_json(&mut ws, json!({"type": "ping", "requestId": "p1"})).await?;
    let pong = recv_kind(&mut ws, "pong", TIMEOUT).await?;
    assert_eq!(pong["requestId"], "p1");
    Ok(())
}

#[tokio::test]
async fn invalid_frames_get_stable_error_codes() -> anyhow::Result<()> {
    let server = CompanionProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;

    let mut ws = connect_ws(&server.ws_url(), None).await?;
    recv_kind(&mut ws, "welcome", TIMEOUT).await?;

    send_json(&mut ws, json!({"prompt": "no type"})).await?;
    let err = recv_kind(&mut ws, "error", TIMEOUT).await?;
    assert_eq!(err["error"]["code"], ErrorCode::InvalidMessage.as_str());

    send_json(&mut ws, json!({"type": "mystery"})).await?;
    let err = recv_kind(&mut ws, "error", TIMEOUT).await?;
    assert_eq!(err["error"]["code"], ErrorCode::InvalidMessage.as_str());
    Ok(())
}

#[tokio::test]
async fn ask_streams_to_a_final_result() -> anyhow::Result<()> {
    let server = CompanionProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;

    let mut ws = connect_ws(&server.ws_url(), None).await?;
    recv_kind(&mut ws, "welcome", TIMEOUT).await?;

    send_json(
        &mut ws,
        json!({
            "type": "ask",
            "requestId": "r1",
            "prompt": "say hello",
            "workingDirectory": server.project_dir(),
        }),
    )
    .await?;

    let created = recv_kind(&mut ws, "sessionCreated", TIMEOUT).await?;
    let session_id = created["data"]["sessionId"].as_str().map(str::to_owned);
    assert!(session_id.is_some());

    let message = recv_kind(&mut ws, "assistantMessage", TIMEOUT).await?;
    assert_eq!(message["data"]["content"], "Hello");
    assert_eq!(message["isComplete"], true);

    let result = recv_kind(&mut ws, "conversationResult", TIMEOUT).await?;
    assert_eq!(result["data"]["success"], true);
    assert_eq!(result["data"]["result"], "Done");
    Ok(())
}

#[tokio::test]
async fn stream_session_lifecycle() -> anyhow::Result<()> {
    let server = CompanionProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;

    let mut ws = connect_ws(&server.ws_url(), None).await?;
    recv_kind(&mut ws, "welcome", TIMEOUT).await?;

    send_json(
        &mut ws,
        json!({
            "type": "streamStart",
            "requestId": "start",
            "workingDirectory": server.project_dir(),
        }),
    )
    .await?;
    let created = recv_kind(&mut ws, "sessionCreated", TIMEOUT).await?;
    let session_id = created["data"]["sessionId"].as_str().unwrap().to_owned();

    send_json(
        &mut ws,
        json!({"type": "streamSend", "sessionId": session_id, "prompt": "go"}),
    )
    .await?;
    recv_kind(&mut ws, "conversationResult", TIMEOUT).await?;

    send_json(&mut ws, json!({"type": "streamClose", "sessionId": session_id})).await?;
    let cleaned = recv_kind(&mut ws, "sessionCleaned", TIMEOUT).await?;
    assert_eq!(cleaned["data"]["reason"], "user_requested");

    // Closing again reports the missing session.
    send_json(&mut ws, json!({"type": "streamClose", "sessionId": session_id})).await?;
    let err = recv_kind(&mut ws, "error", TIMEOUT).await?;
    assert_eq!(err["error"]["code"], "SESSION_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn permission_round_trip() -> anyhow::Result<()> {
    let assistant = r#"echo '{"type":"system","subtype":"init","session_id":"assist-perm"}'
read line
echo '{"type":"assistant","message":{"id":"m1","content":[{"type":"text","text":"Would you like me to proceed? (y/n)"}]}}'
read answer
echo "{\"type\":\"result\",\"result\":\"answer was $answer\",\"session_id\":\"assist-perm\"}"
"#;
    let server = CompanionProcess::start_with_assistant(assistant)?;
    server.wait_healthy(TIMEOUT).await?;

    let mut ws = connect_ws(&server.ws_url(), None).await?;
    recv_kind(&mut ws, "welcome", TIMEOUT).await?;

    send_json(
        &mut ws,
        json!({
            "type": "ask",
            "prompt": "do the thing",
            "workingDirectory": server.project_dir(),
        }),
    )
    .await?;
    let created = recv_kind(&mut ws, "sessionCreated", TIMEOUT).await?;
    let session_id = created["data"]["sessionId"].as_str().unwrap().to_owned();

    let permission = recv_kind(&mut ws, "permissionRequired", TIMEOUT).await?;
    assert!(permission["data"]["prompt"]
        .as_str()
        .unwrap()
        .contains("Would you like me to proceed"));

    send_json(
        &mut ws,
        json!({"type": "permission", "sessionId": session_id, "response": "approve"}),
    )
    .await?;

    let result = recv_kind(&mut ws, "conversationResult", TIMEOUT).await?;
    assert_eq!(result["data"]["result"], "answer was y");
    Ok(())
}

#[tokio::test]
async fn reconnection_restores_subscriptions() -> anyhow::Result<()> {
    let server = CompanionProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;

    // First connection subscribes to two sessions, then drops.
    let mut ws = connect_ws(&server.ws_url(), Some("device-77")).await?;
    recv_kind(&mut ws, "welcome", TIMEOUT).await?;

    send_json(&mut ws, json!({"type": "subscribe", "sessionId": "s1"})).await?;
    recv_kind(&mut ws, "subscribed", TIMEOUT).await?;
    send_json(&mut ws, json!({"type": "subscribe", "sessionId": "s2"})).await?;
    recv_kind(&mut ws, "subscribed", TIMEOUT).await?;
    drop(ws);

    // Give the server a beat to record the disconnect.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut ws = connect_ws(&server.ws_url(), Some("device-77")).await?;
    let welcome = recv_kind(&mut ws, "welcome", TIMEOUT).await?;
    assert_eq!(welcome["data"]["isReconnection"], true);
    let restored: Vec<&str> = welcome["data"]["restoredSessions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(restored, vec!["s1", "s2"]);
    Ok(())
}

#[tokio::test]
async fn blocked_command_is_rejected() -> anyhow::Result<()> {
    let server = CompanionProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;

    let mut ws = connect_ws(&server.ws_url(), None).await?;
    recv_kind(&mut ws, "welcome", TIMEOUT).await?;

    send_json(
        &mut ws,
        json!({
            "type": "aicliCommand",
            "requestId": "c1",
            "command": "rm -rf /",
            "cwd": server.project_dir(),
        }),
    )
    .await?;
    let err = recv_kind(&mut ws, "error", TIMEOUT).await?;
    assert_eq!(err["error"]["code"], ErrorCode::BlockedCommand.as_str());
    assert_eq!(err["requestId"], "c1");
    Ok(())
}
