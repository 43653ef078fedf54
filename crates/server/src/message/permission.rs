// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heuristics for spotting a permission request in assistant prose.

use serde_json::Value;

/// Question openers that mark a sentence as asking the human for a go-ahead.
const QUESTION_LEADS: [&str; 5] =
    ["would you like", "should i", "may i", "can i", "do you want"];

/// True when any text block in `content` reads as a permission request.
pub fn contains_permission_request(content: &[Value]) -> bool {
    content
        .iter()
        .filter(|b| b.get("type").and_then(|v| v.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|v| v.as_str()))
        .any(text_has_permission_pattern)
}

/// True when `text` contains a y/n affordance, a known question opener, or a
/// question followed by a yes/no affordance on a later line.
pub fn text_has_permission_pattern(text: &str) -> bool {
    let lower = text.to_lowercase();

    if lower.contains("(y/n)") || lower.contains("(yes/no)") {
        return true;
    }

    // A question sentence beginning with one of the known openers.
    for segment in lower.split_inclusive('?') {
        if !segment.ends_with('?') {
            continue;
        }
        let start = segment
            .rfind(['.', '!', '\n'])
            .map(|i| i + 1)
            .unwrap_or(0);
        let sentence = segment[start..].trim_start_matches(|c: char| !c.is_alphanumeric());
        if QUESTION_LEADS.iter().any(|lead| sentence.starts_with(lead)) {
            return true;
        }
    }

    // A line ending in `?` with a yes/no affordance somewhere after it.
    let mut question_seen = false;
    for line in lower.lines() {
        let trimmed = line.trim();
        if question_seen && has_yes_no_affordance(trimmed) {
            return true;
        }
        if trimmed.ends_with('?') {
            question_seen = true;
        }
    }

    false
}

fn has_yes_no_affordance(line: &str) -> bool {
    line.contains("y/n")
        || line.contains("yes/no")
        || (line.contains("yes") && line.contains("no"))
}

/// Reduce a permission request to its minimal prompt sentence: the last
/// sentence ending in `?`, else the last non-empty line, else a fixed string.
pub fn extract_permission_prompt(text: &str) -> String {
    if let Some(end) = text.rfind('?') {
        let head = &text[..end];
        let start = head.rfind(['.', '!', '?', '\n']).map(|i| i + 1).unwrap_or(0);
        let sentence = text[start..=end].trim();
        if !sentence.is_empty() {
            return sentence.to_owned();
        }
    }

    if let Some(line) = text.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
        return line.to_owned();
    }

    "Permission required to proceed".to_owned()
}

#[cfg(test)]
#[path = "permission_tests.rs"]
mod tests;
