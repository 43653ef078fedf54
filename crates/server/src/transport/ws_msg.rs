// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket wire types: the shared egress envelope, outbound message kinds,
//! and the tagged ingress enum.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorBody, ErrorCode, OperationError};
use crate::event::epoch_ms;

/// Outbound wire message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutboundKind {
    StreamData,
    SystemInit,
    AssistantMessage,
    ToolUse,
    ToolResult,
    ConversationResult,
    PermissionRequired,
    ProcessStart,
    ProcessExit,
    StreamChunk,
    CommandProgress,
    StreamError,
    SessionCreated,
    SessionWarning,
    SessionExpired,
    SessionCleaned,
    Subscribed,
    Welcome,
    DeviceRegistered,
    WorkingDirectorySet,
    Ping,
    Pong,
    Error,
}

impl OutboundKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StreamData => "streamData",
            Self::SystemInit => "systemInit",
            Self::AssistantMessage => "assistantMessage",
            Self::ToolUse => "toolUse",
            Self::ToolResult => "toolResult",
            Self::ConversationResult => "conversationResult",
            Self::PermissionRequired => "permissionRequired",
            Self::ProcessStart => "processStart",
            Self::ProcessExit => "processExit",
            Self::StreamChunk => "streamChunk",
            Self::CommandProgress => "commandProgress",
            Self::StreamError => "streamError",
            Self::SessionCreated => "sessionCreated",
            Self::SessionWarning => "sessionWarning",
            Self::SessionExpired => "sessionExpired",
            Self::SessionCleaned => "sessionCleaned",
            Self::Subscribed => "subscribed",
            Self::Welcome => "welcome",
            Self::DeviceRegistered => "deviceRegistered",
            Self::WorkingDirectorySet => "workingDirectorySet",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Error => "error",
        }
    }
}

/// Shared egress envelope: `{type, requestId?, data, timestamp, error?,
/// isComplete?}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: OutboundKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
}

impl Envelope {
    /// Session-scoped event with no originating request.
    pub fn event(kind: OutboundKind, data: Value) -> Self {
        Self {
            kind,
            request_id: None,
            data,
            timestamp: epoch_ms(),
            error: None,
            is_complete: None,
        }
    }

    /// Direct reply to a client request.
    pub fn reply(kind: OutboundKind, request_id: Option<String>, data: Value) -> Self {
        Self { request_id, ..Self::event(kind, data) }
    }

    /// Error reply with a stable code.
    pub fn error(request_id: Option<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind: OutboundKind::Error,
            request_id,
            data: Value::Null,
            timestamp: epoch_ms(),
            error: Some(ErrorBody::new(code, message)),
            is_complete: None,
        }
    }

    pub fn from_operation_error(request_id: Option<String>, err: &OperationError) -> Self {
        Self::error(request_id, err.code, err.message.clone())
    }

    pub fn with_complete(mut self, is_complete: bool) -> Self {
        self.is_complete = Some(is_complete);
        self
    }

    /// Critical messages survive queue pressure longest.
    pub fn is_critical(&self) -> bool {
        matches!(
            self.kind,
            OutboundKind::ConversationResult
                | OutboundKind::PermissionRequired
                | OutboundKind::ProcessExit
                | OutboundKind::SessionExpired
                | OutboundKind::Error
        )
    }

    /// True for messages that mark the end of a turn (delivery-logged).
    pub fn is_final_marker(&self) -> bool {
        match self.kind {
            OutboundKind::ConversationResult => true,
            OutboundKind::AssistantMessage => self.is_complete == Some(true),
            OutboundKind::StreamChunk => {
                self.data.get("isFinal").and_then(|v| v.as_bool()).unwrap_or(false)
            }
            _ => false,
        }
    }
}

/// Client→server messages, tagged by `type`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Ask {
        prompt: String,
        session_id: Option<String>,
        working_directory: Option<String>,
        format: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    StreamStart {
        working_directory: String,
        session_id: Option<String>,
        #[serde(default)]
        skip_permissions: bool,
    },
    #[serde(rename_all = "camelCase")]
    StreamSend { session_id: String, prompt: String },
    #[serde(rename_all = "camelCase")]
    StreamClose { session_id: String },
    #[serde(rename_all = "camelCase")]
    Permission { session_id: String, response: String },
    #[serde(rename_all = "camelCase")]
    Subscribe { session_id: String },
    #[serde(rename_all = "camelCase")]
    SetWorkingDirectory { path: String },
    Ping,
    Pong,
    #[serde(rename_all = "camelCase", alias = "client_backgrounding")]
    ClientBackgrounding { session_id: String },
    #[serde(rename_all = "camelCase")]
    RegisterDevice { device_id: String },
    #[serde(rename_all = "camelCase")]
    AicliCommand { command: String, cwd: String },
}

/// A validated ingress message: the envelope-level request id plus the
/// decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub request_id: Option<String>,
    pub message: ClientMessage,
}

/// Validate and decode one raw ingress frame.
///
/// The frame must be a JSON object with a string `type`; `requestId`, when
/// present, must be a string. Anything else is an `INVALID_MESSAGE`.
pub fn parse_inbound(text: &str) -> Result<Inbound, OperationError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|_| OperationError::new(ErrorCode::InvalidMessage, "message is not valid JSON"))?;

    let Some(object) = value.as_object() else {
        return Err(OperationError::new(ErrorCode::InvalidMessage, "message must be an object"));
    };

    if !object.get("type").is_some_and(Value::is_string) {
        return Err(OperationError::new(
            ErrorCode::InvalidMessage,
            "message requires a string `type` field",
        ));
    }

    let request_id = match object.get("requestId") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err(OperationError::new(
                ErrorCode::InvalidMessage,
                "requestId must be a string",
            ))
        }
    };

    let message = serde_json::from_value::<ClientMessage>(value).map_err(|e| {
        OperationError::new(ErrorCode::InvalidMessage, format!("unrecognized message: {e}"))
    })?;

    Ok(Inbound { request_id, message })
}

#[cfg(test)]
#[path = "ws_msg_tests.rs"]
mod tests;
