// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-event message handling: classify one parsed assistant event against a
//! session buffer and decide what the pipeline should do with it.

pub mod aggregate;
pub mod buffer;
pub mod codeblock;
pub mod permission;

pub use aggregate::{AggregateOptions, AssistantResponse, ConversationResult, FinalOutcome};
pub use buffer::SessionBuffer;
pub use codeblock::Deliverable;

use serde_json::Value;

use permission::{contains_permission_request, extract_permission_prompt};

/// Verdict for one classified assistant event.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Event stored on the buffer; nothing to deliver yet.
    Buffer,
    /// The assistant is asking the human for permission.
    PermissionRequest { prompt: String },
    /// The assistant invoked a tool.
    ToolUse { tool_name: Option<String>, tool_id: Option<String>, tool_input: Option<Value> },
    /// Terminal event; carries the aggregated wire payloads.
    FinalResult { outcome: Box<FinalOutcome> },
    /// Event is not interesting at this layer.
    Skip,
    /// The event could not be handled.
    Error { message: String },
}

/// Classify one parsed assistant event, updating `buffer` as a side effect.
pub fn classify(
    event: &Value,
    buffer: Option<&mut SessionBuffer>,
    options: &AggregateOptions,
) -> Action {
    let Some(buffer) = buffer else {
        return Action::Error { message: "session buffer unavailable".to_owned() };
    };

    let Some(event_type) = event.get("type").and_then(|v| v.as_str()) else {
        return Action::Skip;
    };

    match event_type {
        "system" => {
            if event.get("subtype").and_then(|v| v.as_str()) == Some("init") {
                buffer.system_init = Some(event.clone());
                Action::Buffer
            } else {
                Action::Skip
            }
        }
        "assistant" => classify_assistant(event, buffer),
        "user" | "tool_result" => Action::Skip,
        "result" => Action::FinalResult {
            outcome: Box::new(aggregate::aggregate(buffer, event, options)),
        },
        _ => Action::Skip,
    }
}

fn classify_assistant(event: &Value, buffer: &mut SessionBuffer) -> Action {
    let Some(message) = event.get("message") else {
        return Action::Skip;
    };
    let Some(content) = message.get("content").and_then(|c| c.as_array()) else {
        return Action::Skip;
    };

    if let Some(block) = content
        .iter()
        .find(|b| b.get("type").and_then(|v| v.as_str()) == Some("tool_use"))
    {
        buffer.tool_use_in_progress = true;
        return Action::ToolUse {
            tool_name: block.get("name").and_then(|v| v.as_str()).map(str::to_owned),
            tool_id: block.get("id").and_then(|v| v.as_str()).map(str::to_owned),
            tool_input: block.get("input").cloned(),
        };
    }

    let text = concat_text_blocks(content);

    if contains_permission_request(content) {
        buffer.permission_request_sent = true;
        return Action::PermissionRequest { prompt: extract_permission_prompt(&text) };
    }

    buffer.deliverables.extend(codeblock::extract_code_blocks(&text));
    buffer.push_assistant(message.clone());
    Action::Buffer
}

/// Join the `text` blocks of a content array with newlines.
pub fn concat_text_blocks(content: &[Value]) -> String {
    content
        .iter()
        .filter(|b| b.get("type").and_then(|v| v.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|v| v.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
