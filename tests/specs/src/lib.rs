// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `companion` binary with a scripted fake assistant and
//! exercises it over HTTP and WebSocket.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Fake assistant used by most tests: an init event, then a canned reply per
/// prompt line.
pub const SIMPLE_ASSISTANT: &str = r#"echo '{"type":"system","subtype":"init","session_id":"assist-e2e"}'
while read line; do
  echo '{"type":"assistant","message":{"id":"m1","content":[{"type":"text","text":"Hello"}]}}'
  echo '{"type":"result","result":"Done","session_id":"assist-e2e"}'
done"#;

/// Resolve the path to the compiled `companion` binary.
pub fn companion_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("companion")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `companion` process that is killed on drop.
pub struct CompanionProcess {
    child: Child,
    port: u16,
    workspace: tempfile::TempDir,
}

impl CompanionProcess {
    /// Start with the default scripted assistant.
    pub fn start() -> anyhow::Result<Self> {
        Self::start_with_assistant(SIMPLE_ASSISTANT)
    }

    /// Start with a custom fake-assistant script body.
    pub fn start_with_assistant(assistant_body: &str) -> anyhow::Result<Self> {
        let workspace = tempfile::tempdir()?;
        let script = workspace.path().join("fake-assistant");
        std::fs::write(&script, format!("#!/bin/sh\n{assistant_body}\n"))?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

        let port = free_port()?;
        let child = Command::new(companion_binary())
            .args([
                "--host",
                "127.0.0.1",
                "--port",
                &port.to_string(),
                "--assistant-bin",
                &script.display().to_string(),
                "--log-format",
                "text",
                "--log-level",
                "debug",
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, port, workspace })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    /// An absolute project directory inside the harness workspace.
    pub fn project_dir(&self) -> String {
        let dir = self.workspace.path().join("project");
        let _ = std::fs::create_dir_all(&dir);
        dir.display().to_string()
    }

    /// Poll `/health` until the server answers or the deadline passes.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let url = format!("{}/health", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(resp) = reqwest::get(&url).await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("server never became healthy");
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for CompanionProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Open a WebSocket, optionally tagging the connection with a device id.
pub async fn connect_ws(url: &str, device_id: Option<&str>) -> anyhow::Result<Ws> {
    let mut request = url.into_client_request()?;
    if let Some(device_id) = device_id {
        request.headers_mut().insert("x-device-id", device_id.parse()?);
    }
    let (ws, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(ws)
}

/// Send one JSON frame.
pub async fn send_json(ws: &mut Ws, value: Value) -> anyhow::Result<()> {
    ws.send(Message::Text(value.to_string().into())).await?;
    Ok(())
}

/// Receive frames until one satisfies `pred` (ignoring the rest), bounded by
/// `timeout`.
pub async fn recv_until<F>(ws: &mut Ws, timeout: Duration, mut pred: F) -> anyhow::Result<Value>
where
    F: FnMut(&Value) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let frame = tokio::time::timeout_at(deadline, ws.next())
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting for frame"))?
            .ok_or_else(|| anyhow::anyhow!("websocket closed"))??;
        if let Message::Text(text) = frame {
            let value: Value = serde_json::from_str(&text)?;
            if pred(&value) {
                return Ok(value);
            }
        }
    }
}

/// Receive until a frame of the given `type` arrives.
pub async fn recv_kind(ws: &mut Ws, kind: &str, timeout: Duration) -> anyhow::Result<Value> {
    recv_until(ws, timeout, |v| v["type"] == kind).await
}
