// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event broadcaster: translate internal events into wire envelopes, fan
//! them out to session subscribers, and hand undeliverable traffic to the
//! message queue plus the push channel.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::ConnectionManager;
use crate::error::ErrorCode;
use crate::event::{ProcessEvent, ServerEvent, SessionEvent, StreamEvent};
use crate::push::{PushNote, PushNotifier};
use crate::queue::MessageQueue;
use crate::transport::ws_msg::{Envelope, OutboundKind};

/// Stateless fan-out hub; all state lives in the collaborators it delegates
/// to.
pub struct Broadcaster {
    connections: Arc<ConnectionManager>,
    queue: Arc<MessageQueue>,
    push: Arc<dyn PushNotifier>,
}

impl Broadcaster {
    pub fn new(
        connections: Arc<ConnectionManager>,
        queue: Arc<MessageQueue>,
        push: Arc<dyn PushNotifier>,
    ) -> Self {
        Self { connections, queue, push }
    }

    /// Consume the event bus until shutdown, fanning each event out.
    pub async fn run(
        self: Arc<Self>,
        mut rx: broadcast::Receiver<ServerEvent>,
        shutdown: CancellationToken,
    ) {
        info!("broadcaster started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("broadcaster shutting down");
                    return;
                }
                event = rx.recv() => {
                    match event {
                        Ok(event) => self.dispatch(&event),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "broadcaster lagged behind the event bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        }
    }

    fn dispatch(&self, event: &ServerEvent) {
        let session_id = event.session_id().to_owned();
        if let Some(envelope) = translate(event) {
            self.broadcast_to_session(&session_id, envelope);
        }
    }

    /// Deliver one envelope to every ready subscriber of a session. With no
    /// ready subscriber the message is queued and the push channel notified.
    pub fn broadcast_to_session(&self, session_id: &str, envelope: Envelope) {
        if envelope.is_final_marker() {
            debug!(session = session_id, kind = envelope.kind.as_str(), "delivering final message");
        }

        let mut delivered = 0usize;
        for client in self.connections.subscribers_of(session_id) {
            if client.is_ready() && client.try_send(envelope.clone()) {
                delivered += 1;
            }
        }

        if delivered == 0 {
            self.push.notify(PushNote {
                session_id: session_id.to_owned(),
                kind: envelope.kind.as_str(),
                summary: summarize(&envelope),
            });
            self.queue.enqueue(session_id, envelope);
        }
    }

    /// Send one envelope to one client. False when the client is absent,
    /// not ready, or its transport refuses the message.
    pub fn send_message(&self, client_id: &str, envelope: Envelope) -> bool {
        let Some(client) = self.connections.get(client_id) else {
            return false;
        };
        if !client.is_ready() {
            return false;
        }
        client.try_send(envelope)
    }

    /// Wrap and send an error message to one client.
    pub fn send_error_message(
        &self,
        client_id: &str,
        request_id: Option<String>,
        code: ErrorCode,
        message: &str,
    ) -> bool {
        self.send_message(client_id, Envelope::error(request_id, code, message))
    }
}

/// Short human summary for the push channel.
fn summarize(envelope: &Envelope) -> String {
    let text = match envelope.kind {
        OutboundKind::AssistantMessage => envelope.data.get("content").and_then(Value::as_str),
        OutboundKind::ConversationResult => envelope.data.get("result").and_then(Value::as_str),
        OutboundKind::PermissionRequired => envelope.data.get("prompt").and_then(Value::as_str),
        _ => None,
    };
    match text {
        Some(text) if text.len() > 120 => {
            let cut = text
                .char_indices()
                .take_while(|(i, _)| *i < 120)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            format!("{}…", &text[..cut])
        }
        Some(text) => text.to_owned(),
        None => envelope.kind.as_str().to_owned(),
    }
}

/// Merge a serializable payload with its session id into envelope data.
fn with_session(session_id: &str, payload: Value) -> Value {
    match payload {
        Value::Object(mut map) => {
            map.insert("sessionId".to_owned(), Value::String(session_id.to_owned()));
            Value::Object(map)
        }
        other => json!({ "sessionId": session_id, "payload": other }),
    }
}

/// Translate one internal event into its wire envelope, if it has one.
pub fn translate(event: &ServerEvent) -> Option<Envelope> {
    let envelope = match event {
        ServerEvent::Session(event) => match event {
            SessionEvent::Created { session_id, working_dir } => Envelope::event(
                OutboundKind::SessionCreated,
                json!({ "sessionId": session_id, "workingDirectory": working_dir }),
            ),
            SessionEvent::Warning { session_id, idle_ms } => Envelope::event(
                OutboundKind::SessionWarning,
                json!({ "sessionId": session_id, "idleMs": idle_ms }),
            ),
            SessionEvent::Expired { session_id } => Envelope::event(
                OutboundKind::SessionExpired,
                json!({ "sessionId": session_id }),
            ),
            SessionEvent::Cleaned { session_id, reason } => Envelope::event(
                OutboundKind::SessionCleaned,
                json!({ "sessionId": session_id, "reason": reason.as_str() }),
            ),
        },
        ServerEvent::Process(event) => match event {
            ProcessEvent::Started { session_id, pid } => Envelope::event(
                OutboundKind::ProcessStart,
                json!({ "sessionId": session_id, "pid": pid }),
            ),
            ProcessEvent::Exited { session_id, code } => Envelope::event(
                OutboundKind::ProcessExit,
                json!({ "sessionId": session_id, "code": code }),
            ),
            ProcessEvent::Progress { session_id, stage } => Envelope::event(
                OutboundKind::CommandProgress,
                json!({ "sessionId": session_id, "stage": stage }),
            ),
            ProcessEvent::StreamError { session_id, message } => Envelope::event(
                OutboundKind::StreamError,
                json!({ "sessionId": session_id, "message": message }),
            ),
        },
        ServerEvent::Stream(event) => match event {
            StreamEvent::Raw { session_id, event } => Envelope::event(
                OutboundKind::StreamData,
                json!({ "sessionId": session_id, "event": event }),
            ),
            StreamEvent::SystemInit { session_id, init } => Envelope::event(
                OutboundKind::SystemInit,
                with_session(session_id, init.clone()),
            ),
            StreamEvent::ToolUse { session_id, tool_name, tool_id, tool_input } => {
                Envelope::event(
                    OutboundKind::ToolUse,
                    json!({
                        "sessionId": session_id,
                        "toolName": tool_name,
                        "toolId": tool_id,
                        "toolInput": tool_input,
                    }),
                )
            }
            StreamEvent::ToolResult { session_id, tool_id, result } => Envelope::event(
                OutboundKind::ToolResult,
                json!({ "sessionId": session_id, "toolId": tool_id, "result": result }),
            ),
            StreamEvent::PermissionRequired { session_id, prompt, request_id } => {
                Envelope::event(
                    OutboundKind::PermissionRequired,
                    json!({
                        "sessionId": session_id,
                        "prompt": prompt,
                        "requestId": request_id,
                    }),
                )
            }
            StreamEvent::AssistantMessage { session_id, payload, is_complete } => {
                let data = serde_json::to_value(payload).unwrap_or(Value::Null);
                Envelope::event(OutboundKind::AssistantMessage, with_session(session_id, data))
                    .with_complete(*is_complete)
            }
            StreamEvent::ConversationResult { session_id, payload } => {
                let data = serde_json::to_value(payload).unwrap_or(Value::Null);
                Envelope::event(
                    OutboundKind::ConversationResult,
                    with_session(session_id, data),
                )
            }
            StreamEvent::Chunk { session_id, chunk, is_final } => {
                let data = serde_json::to_value(chunk).unwrap_or(Value::Null);
                Envelope::event(
                    OutboundKind::StreamChunk,
                    json!({ "sessionId": session_id, "chunk": data, "isFinal": is_final }),
                )
            }
        },
    };
    Some(envelope)
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
