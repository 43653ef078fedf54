// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::{classify, Action, AggregateOptions, SessionBuffer};

fn assistant_text(text: &str) -> serde_json::Value {
    json!({
        "type": "assistant",
        "message": { "id": "msg-1", "content": [{ "type": "text", "text": text }] }
    })
}

#[test]
fn system_init_is_buffered() {
    let mut buffer = SessionBuffer::new();
    let event = json!({"type": "system", "subtype": "init", "session_id": "abc"});
    let action = classify(&event, Some(&mut buffer), &AggregateOptions::default());
    assert_eq!(action, Action::Buffer);
    assert!(buffer.system_init.is_some());
}

#[test]
fn other_system_subtypes_are_skipped() {
    let mut buffer = SessionBuffer::new();
    let event = json!({"type": "system", "subtype": "status"});
    let action = classify(&event, Some(&mut buffer), &AggregateOptions::default());
    assert_eq!(action, Action::Skip);
    assert!(buffer.system_init.is_none());
}

#[test]
fn assistant_text_is_buffered() {
    let mut buffer = SessionBuffer::new();
    let action =
        classify(&assistant_text("Hello"), Some(&mut buffer), &AggregateOptions::default());
    assert_eq!(action, Action::Buffer);
    assert_eq!(buffer.assistant_messages.len(), 1);
}

#[test]
fn assistant_without_content_is_skipped() {
    let mut buffer = SessionBuffer::new();
    let event = json!({"type": "assistant", "message": {}});
    let action = classify(&event, Some(&mut buffer), &AggregateOptions::default());
    assert_eq!(action, Action::Skip);
}

#[test]
fn tool_use_sets_flag_and_reports_tool() {
    let mut buffer = SessionBuffer::new();
    let event = json!({
        "type": "assistant",
        "message": { "content": [
            { "type": "tool_use", "name": "Bash", "id": "tu-1", "input": {"command": "ls"} }
        ]}
    });
    let action = classify(&event, Some(&mut buffer), &AggregateOptions::default());
    match action {
        Action::ToolUse { tool_name, tool_id, tool_input } => {
            assert_eq!(tool_name.as_deref(), Some("Bash"));
            assert_eq!(tool_id.as_deref(), Some("tu-1"));
            assert_eq!(tool_input, Some(json!({"command": "ls"})));
        }
        other => panic!("expected ToolUse, got {other:?}"),
    }
    assert!(buffer.tool_use_in_progress);
}

#[test]
fn permission_question_is_detected() {
    let mut buffer = SessionBuffer::new();
    let event = assistant_text("Would you like me to proceed with the changes? (y/n)");
    let action = classify(&event, Some(&mut buffer), &AggregateOptions::default());
    match action {
        Action::PermissionRequest { prompt } => {
            assert!(prompt.contains("Would you like"));
        }
        other => panic!("expected PermissionRequest, got {other:?}"),
    }
    assert!(buffer.permission_request_sent);
    assert!(buffer.assistant_messages.is_empty());
}

#[test]
fn code_blocks_become_deliverables() {
    let mut buffer = SessionBuffer::new();
    let text = "Here is code:\n```javascript\nconst x = 1;\n```\nAnd:\n```python\nprint('hi')\n```";
    classify(&assistant_text(text), Some(&mut buffer), &AggregateOptions::default());
    assert_eq!(buffer.deliverables.len(), 2);
    assert_eq!(buffer.deliverables[0].language, "javascript");
    assert_eq!(buffer.deliverables[1].language, "python");
}

#[test]
fn user_and_tool_result_are_skipped() {
    let mut buffer = SessionBuffer::new();
    for t in ["user", "tool_result"] {
        let action =
            classify(&json!({"type": t}), Some(&mut buffer), &AggregateOptions::default());
        assert_eq!(action, Action::Skip);
    }
}

#[test]
fn result_aggregates_the_buffer() {
    let mut buffer = SessionBuffer::new();
    classify(&assistant_text("Hello"), Some(&mut buffer), &AggregateOptions::default());

    let result = json!({"type": "result", "result": "Done", "session_id": "s1"});
    let action = classify(&result, Some(&mut buffer), &AggregateOptions::default());
    match action {
        Action::FinalResult { outcome } => {
            assert_eq!(outcome.assistant_message.content, "Hello");
            assert!(outcome.conversation_result.success);
            assert_eq!(outcome.conversation_result.session_id.as_deref(), Some("s1"));
        }
        other => panic!("expected FinalResult, got {other:?}"),
    }
}

#[test]
fn unknown_types_are_skipped() {
    let mut buffer = SessionBuffer::new();
    let action =
        classify(&json!({"type": "mystery"}), Some(&mut buffer), &AggregateOptions::default());
    assert_eq!(action, Action::Skip);
}

#[test]
fn missing_buffer_is_an_error() {
    let action = classify(&json!({"type": "assistant"}), None, &AggregateOptions::default());
    assert!(matches!(action, Action::Error { .. }));
}
