// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{ErrorBody, ErrorCode, OperationError};

#[test]
fn codes_are_stable_strings() {
    assert_eq!(ErrorCode::InvalidMessage.as_str(), "INVALID_MESSAGE");
    assert_eq!(ErrorCode::BlockedCommand.as_str(), "BLOCKED_COMMAND");
    assert_eq!(ErrorCode::ReadonlyMode.as_str(), "READONLY_MODE");
    assert_eq!(ErrorCode::SessionNotFound.as_str(), "SESSION_NOT_FOUND");
    assert_eq!(ErrorCode::MaxSessions.as_str(), "MAX_SESSIONS");
}

#[test]
fn display_matches_as_str() {
    assert_eq!(ErrorCode::Timeout.to_string(), "TIMEOUT");
}

#[test]
fn body_carries_code_and_message() {
    let body = ErrorBody::new(ErrorCode::AccessDenied, "nope");
    assert_eq!(body.code, "ACCESS_DENIED");
    assert_eq!(body.message, "nope");
}

#[test]
fn operation_error_round_trips_to_body() {
    let err = OperationError::new(ErrorCode::SessionBusy, "busy");
    let body = err.body();
    assert_eq!(body.code, "SESSION_BUSY");
    assert_eq!(err.to_string(), "SESSION_BUSY: busy");
}
