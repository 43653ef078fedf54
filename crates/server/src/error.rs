// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error codes surfaced on the WebSocket wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidMessage,
    BlockedCommand,
    ReadonlyMode,
    SessionNotFound,
    MaxSessions,
    SessionBusy,
    InvalidDirectory,
    AccessDenied,
    AssistantUnavailable,
    ProcessFailed,
    Timeout,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::BlockedCommand => "BLOCKED_COMMAND",
            Self::ReadonlyMode => "READONLY_MODE",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::MaxSessions => "MAX_SESSIONS",
            Self::SessionBusy => "SESSION_BUSY",
            Self::InvalidDirectory => "INVALID_DIRECTORY",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::AssistantUnavailable => "ASSISTANT_UNAVAILABLE",
            Self::ProcessFailed => "PROCESS_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code: code.as_str().to_owned(), message: message.into() }
    }
}

/// A rejected operation: stable code plus the message shown to the caller.
#[derive(Debug, Clone)]
pub struct OperationError {
    pub code: ErrorCode,
    pub message: String,
}

impl OperationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody { code: self.code.as_str().to_owned(), message: self.message.clone() }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for OperationError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
