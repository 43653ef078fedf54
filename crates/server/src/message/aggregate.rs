// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Final-result aggregation: collapse a session buffer into the two
//! wire-ready payloads delivered when the assistant finishes a turn.

use serde::Serialize;
use serde_json::Value;

use super::buffer::SessionBuffer;
use super::codeblock::Deliverable;
use super::permission::{extract_permission_prompt, text_has_permission_pattern};

/// Caller-supplied aggregation knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateOptions {
    /// Long-running completions additionally ship the aggregated content
    /// inline so clients that missed the stream can render it.
    pub is_long_running_completion: bool,
}

/// Aggregated assistant prose plus extracted deliverables.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub content: String,
    pub message_count: usize,
    pub deliverables: Vec<Deliverable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregated_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_aggregated: Option<bool>,
}

/// A permission prompt embedded in the final result text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddedPermission {
    pub prompt: String,
}

/// Terminal outcome of one conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResult {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_permission: Option<EmbeddedPermission>,
}

/// Both aggregation payloads for one `result` event.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalOutcome {
    pub assistant_message: AssistantResponse,
    pub conversation_result: ConversationResult,
}

/// Build the final payloads from the buffered turn and the `result` event.
pub fn aggregate(
    buffer: &SessionBuffer,
    result_event: &Value,
    options: &AggregateOptions,
) -> FinalOutcome {
    let content = aggregated_text(buffer);

    let (aggregated_content, send_aggregated) = if options.is_long_running_completion {
        (Some(content.clone()), Some(true))
    } else {
        (None, None)
    };

    let assistant_message = AssistantResponse {
        kind: "assistant_response",
        content,
        message_count: buffer.assistant_messages.len(),
        deliverables: buffer.deliverables.clone(),
        aggregated_content,
        send_aggregated,
    };

    let result_text = result_event.get("result").and_then(|v| v.as_str());
    let is_error = result_event.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false);

    let embedded_permission = result_text
        .filter(|text| buffer.permission_request_sent && text_has_permission_pattern(text))
        .map(|text| EmbeddedPermission { prompt: extract_permission_prompt(text) });

    let conversation_result = ConversationResult {
        kind: "final_result",
        success: !is_error,
        result: result_text.map(str::to_owned),
        session_id: result_event.get("session_id").and_then(|v| v.as_str()).map(str::to_owned),
        duration: result_event.get("duration_ms").and_then(|v| v.as_u64()),
        cost: result_event.get("total_cost_usd").and_then(|v| v.as_f64()),
        usage: result_event.get("usage").cloned(),
        embedded_permission,
    };

    FinalOutcome { assistant_message, conversation_result }
}

/// All text blocks across the buffered assistant messages, joined by blank
/// lines.
fn aggregated_text(buffer: &SessionBuffer) -> String {
    buffer
        .assistant_messages
        .iter()
        .filter_map(|m| m.get("content").and_then(|c| c.as_array()))
        .flat_map(|content| {
            content
                .iter()
                .filter(|b| b.get("type").and_then(|v| v.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|v| v.as_str()))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
#[path = "aggregate_tests.rs"]
mod tests;
