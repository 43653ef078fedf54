// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Internal event bus types. Components publish typed events tagged with the
//! owning session id; the broadcaster translates them into wire messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{AssistantResponse, ConversationResult};
use crate::stream::Chunk;

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Why a session was cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanReason {
    UserRequested,
    ProcessDied,
    Expired,
    Shutdown,
}

impl CleanReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserRequested => "user_requested",
            Self::ProcessDied => "process_died",
            Self::Expired => "expired",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Session lifecycle events emitted by the session manager.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Created { session_id: String, working_dir: String },
    Warning { session_id: String, idle_ms: u64 },
    Expired { session_id: String },
    Cleaned { session_id: String, reason: CleanReason },
}

/// Subprocess lifecycle events emitted by the process runner.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Started { session_id: String, pid: u32 },
    Exited { session_id: String, code: Option<i32> },
    Progress { session_id: String, stage: String },
    StreamError { session_id: String, message: String },
}

/// Classified stream events emitted by the parsing pipeline.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Raw parsed assistant event, passed through for live clients.
    Raw { session_id: String, event: Value },
    SystemInit { session_id: String, init: Value },
    ToolUse {
        session_id: String,
        tool_name: Option<String>,
        tool_id: Option<String>,
        tool_input: Option<Value>,
    },
    ToolResult { session_id: String, tool_id: Option<String>, result: Value },
    PermissionRequired { session_id: String, prompt: String, request_id: Option<String> },
    AssistantMessage { session_id: String, payload: AssistantResponse, is_complete: bool },
    ConversationResult { session_id: String, payload: ConversationResult },
    /// Free-text display chunk from the text pathway.
    Chunk { session_id: String, chunk: Chunk, is_final: bool },
}

/// Union of everything the bus carries.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Session(SessionEvent),
    Process(ProcessEvent),
    Stream(StreamEvent),
}

impl ServerEvent {
    /// The session this event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            Self::Session(e) => match e {
                SessionEvent::Created { session_id, .. }
                | SessionEvent::Warning { session_id, .. }
                | SessionEvent::Expired { session_id }
                | SessionEvent::Cleaned { session_id, .. } => session_id,
            },
            Self::Process(e) => match e {
                ProcessEvent::Started { session_id, .. }
                | ProcessEvent::Exited { session_id, .. }
                | ProcessEvent::Progress { session_id, .. }
                | ProcessEvent::StreamError { session_id, .. } => session_id,
            },
            Self::Stream(e) => match e {
                StreamEvent::Raw { session_id, .. }
                | StreamEvent::SystemInit { session_id, .. }
                | StreamEvent::ToolUse { session_id, .. }
                | StreamEvent::ToolResult { session_id, .. }
                | StreamEvent::PermissionRequired { session_id, .. }
                | StreamEvent::AssistantMessage { session_id, .. }
                | StreamEvent::ConversationResult { session_id, .. }
                | StreamEvent::Chunk { session_id, .. } => session_id,
            },
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
