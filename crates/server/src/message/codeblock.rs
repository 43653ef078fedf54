// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fenced code-block extraction from assistant text.

use serde::Serialize;

/// A code block extracted from assistant output, tagged with its language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deliverable {
    pub language: String,
    pub code: String,
}

/// Extract every fenced block from `text`. The language defaults to `text`
/// when the fence carries none. An unclosed trailing fence is ignored.
pub fn extract_code_blocks(text: &str) -> Vec<Deliverable> {
    let mut out = Vec::new();
    let mut language: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        match language.as_ref() {
            None => {
                if let Some(rest) = trimmed.strip_prefix("```") {
                    let lang = rest.trim();
                    language =
                        Some(if lang.is_empty() { "text".to_owned() } else { lang.to_owned() });
                }
            }
            Some(_) => {
                if trimmed == "```" {
                    if let Some(language) = language.take() {
                        out.push(Deliverable { language, code: body.join("\n") });
                    }
                    body.clear();
                } else {
                    body.push(line);
                }
            }
        }
    }

    out
}

#[cfg(test)]
#[path = "codeblock_tests.rs"]
mod tests;
