// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session parsing pipeline: subprocess stdout → JSONL events → message
//! classification → bus events. One pipeline task runs for the life of each
//! assistant subprocess and survives across prompts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::event::{ProcessEvent, ServerEvent, StreamEvent};
use crate::message::{self, Action, AggregateOptions};
use crate::session::{SessionEntry, SessionManager, TurnResult};
use crate::stream::{JsonlParser, TextChunker};

/// Turns longer than this ship their aggregated content inline on the final
/// payload, for clients that missed the stream.
const LONG_RUNNING_TURN: Duration = Duration::from_secs(30);

/// Run the pipeline until the subprocess stdout closes or the session is
/// cancelled. Emits everything onto the shared event bus; never returns an
/// error (stream failures become `streamError` events).
pub async fn run_pipeline(
    entry: Arc<SessionEntry>,
    mut stdout_rx: mpsc::Receiver<Bytes>,
    exit_rx: oneshot::Receiver<Option<i32>>,
    sessions: Arc<SessionManager>,
    events: broadcast::Sender<ServerEvent>,
) {
    let mut state = PipelineState {
        entry,
        sessions,
        events,
        jsonl: JsonlParser::new(),
        chunker: TextChunker::new(),
        turn_started: None,
    };

    loop {
        tokio::select! {
            _ = state.entry.cancel.cancelled() => {
                debug!(session = %state.entry.id, "pipeline cancelled");
                return;
            }
            frame = stdout_rx.recv() => {
                match frame {
                    Some(bytes) => state.consume(&bytes).await,
                    None => break,
                }
            }
        }
    }

    // stdout closed: flush both parsers, then account for the exit.
    state.flush().await;

    let code = exit_rx.await.unwrap_or(None);
    state.on_exit(code).await;
}

struct PipelineState {
    entry: Arc<SessionEntry>,
    sessions: Arc<SessionManager>,
    events: broadcast::Sender<ServerEvent>,
    jsonl: JsonlParser,
    chunker: TextChunker,
    turn_started: Option<Instant>,
}

impl PipelineState {
    async fn consume(&mut self, bytes: &[u8]) {
        let parsed = self.jsonl.feed(bytes);
        for event in parsed.events {
            self.process_event(event).await;
        }
        for line in parsed.text {
            let mut framed = line;
            framed.push('\n');
            for chunk in self.chunker.parse_data(framed.as_bytes(), false) {
                self.emit(ServerEvent::Stream(StreamEvent::Chunk {
                    session_id: self.entry.id.clone(),
                    chunk,
                    is_final: false,
                }));
            }
        }
    }

    async fn flush(&mut self) {
        let parsed = self.jsonl.finish();
        for event in parsed.events {
            self.process_event(event).await;
        }
        for chunk in self.chunker.parse_data(b"", true) {
            self.emit(ServerEvent::Stream(StreamEvent::Chunk {
                session_id: self.entry.id.clone(),
                chunk,
                is_final: true,
            }));
        }
    }

    async fn process_event(&mut self, event: Value) {
        let session_id = self.entry.id.clone();
        self.turn_started.get_or_insert_with(Instant::now);
        self.sessions.update_session_activity(&session_id);

        self.emit(ServerEvent::Stream(StreamEvent::Raw {
            session_id: session_id.clone(),
            event: event.clone(),
        }));

        // The init event carries the assistant's own session id; bind it for
        // routing and resume.
        if event.get("type").and_then(Value::as_str) == Some("system")
            && event.get("subtype").and_then(Value::as_str) == Some("init")
        {
            if let Some(assistant_id) = event.get("session_id").and_then(Value::as_str) {
                self.sessions.map_claude_session(&session_id, assistant_id);
            }
        }

        let options = AggregateOptions {
            is_long_running_completion: self
                .turn_started
                .is_some_and(|started| started.elapsed() > LONG_RUNNING_TURN),
        };

        let action = {
            let mut buffer = self.entry.buffer.write().await;
            message::classify(&event, Some(&mut buffer), &options)
        };

        match action {
            Action::Buffer => {
                if event.get("type").and_then(Value::as_str) == Some("system") {
                    self.emit(ServerEvent::Stream(StreamEvent::SystemInit {
                        session_id,
                        init: event,
                    }));
                }
            }
            Action::ToolUse { tool_name, tool_id, tool_input } => {
                let stage = tool_name.as_deref().unwrap_or("tool").to_owned();
                self.emit(ServerEvent::Stream(StreamEvent::ToolUse {
                    session_id: session_id.clone(),
                    tool_name,
                    tool_id,
                    tool_input,
                }));
                self.emit(ServerEvent::Process(ProcessEvent::Progress {
                    session_id,
                    stage: format!("tool:{stage}"),
                }));
            }
            Action::PermissionRequest { prompt } => {
                self.emit(ServerEvent::Stream(StreamEvent::PermissionRequired {
                    session_id,
                    prompt,
                    request_id: None,
                }));
            }
            Action::FinalResult { outcome } => {
                if let Some(assistant_id) = outcome.conversation_result.session_id.as_deref() {
                    self.sessions.map_claude_session(&session_id, assistant_id);
                }
                self.emit(ServerEvent::Stream(StreamEvent::AssistantMessage {
                    session_id: session_id.clone(),
                    payload: outcome.assistant_message.clone(),
                    is_complete: true,
                }));
                self.emit(ServerEvent::Stream(StreamEvent::ConversationResult {
                    session_id: session_id.clone(),
                    payload: outcome.conversation_result.clone(),
                }));
                self.entry.resolve_turn(TurnResult::Final(outcome));
                self.sessions.set_session_processing(&session_id, false);
                self.turn_started = None;
            }
            Action::Skip => {
                if let Some(tool_result) = as_tool_result(&event) {
                    self.emit(ServerEvent::Stream(StreamEvent::ToolResult {
                        session_id,
                        tool_id: tool_result.0,
                        result: tool_result.1,
                    }));
                }
            }
            Action::Error { message } => {
                warn!(session = %session_id, "stream handling error: {message}");
                self.emit(ServerEvent::Process(ProcessEvent::StreamError {
                    session_id,
                    message,
                }));
            }
        }
    }

    async fn on_exit(&mut self, code: Option<i32>) {
        let session_id = self.entry.id.clone();
        debug!(session = %session_id, ?code, "pipeline observed subprocess exit");

        self.entry.resolve_turn(TurnResult::Exited(code));
        self.emit(ServerEvent::Process(ProcessEvent::Exited {
            session_id: session_id.clone(),
            code,
        }));
        self.sessions.cleanup_dead_session(&session_id);
    }

    fn emit(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }
}

/// Pull a tool result out of a `tool_result` or `user` event, if present.
fn as_tool_result(event: &Value) -> Option<(Option<String>, Value)> {
    match event.get("type").and_then(Value::as_str) {
        Some("tool_result") => Some((
            event.get("tool_id").and_then(Value::as_str).map(str::to_owned),
            event.get("result").cloned().unwrap_or(Value::Null),
        )),
        Some("user") => {
            let content = event.get("message")?.get("content")?.as_array()?;
            let block = content
                .iter()
                .find(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"))?;
            Some((
                block.get("tool_use_id").and_then(Value::as_str).map(str::to_owned),
                block.get("content").cloned().unwrap_or(Value::Null),
            ))
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
