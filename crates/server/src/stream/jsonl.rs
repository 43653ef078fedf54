// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental parser for the assistant's stream-json stdout.
//!
//! The assistant normally emits one JSON object per line, but objects can be
//! fragmented across read boundaries, pretty-printed across several lines, or
//! wrapped in a top-level array. The parser never fails on malformed input:
//! bad fragments are logged at debug level and skipped, and plain-text lines
//! are handed back to the caller for the text pathway.

use serde_json::Value;
use tracing::debug;

/// Ceiling for a pending multi-line object before it is declared malformed.
const MAX_PENDING_BYTES: usize = 256 * 1024;

/// Output of one [`JsonlParser::feed`] call.
#[derive(Debug, Default)]
pub struct Parsed {
    /// Fully parsed JSON events, in stream order.
    pub events: Vec<Value>,
    /// Complete lines that contained no JSON (free-text passthrough).
    pub text: Vec<String>,
}

/// Line-buffered parser for newline-delimited JSON on stdout.
#[derive(Debug, Default)]
pub struct JsonlParser {
    line_buf: String,
    /// Accumulates a JSON value that spans multiple lines.
    pending: String,
}

impl JsonlParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a fragment of stdout. Complete lines are parsed immediately;
    /// a trailing partial line (no newline yet) stays buffered for the next
    /// feed.
    pub fn feed(&mut self, data: &[u8]) -> Parsed {
        let mut out = Parsed::default();
        self.line_buf.push_str(&String::from_utf8_lossy(data));

        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            self.process_line(line.trim_end_matches(['\n', '\r']), &mut out);
        }

        out
    }

    /// Best-effort parse of whatever remains in the buffers (stream ended).
    pub fn finish(&mut self) -> Parsed {
        let mut out = Parsed::default();
        if !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.process_line(line.trim_end_matches('\r'), &mut out);
        }
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            let found = extract_complete_objects_from_line(&pending);
            if found.is_empty() {
                debug!(bytes = pending.len(), "dropping unterminated JSON at stream end");
            }
            out.events.extend(found);
        }
        out
    }

    /// Drop all buffered state.
    pub fn reset(&mut self) {
        self.line_buf.clear();
        self.pending.clear();
    }

    fn process_line(&mut self, line: &str, out: &mut Parsed) {
        if !self.pending.is_empty() {
            self.pending.push_str(line);
            self.pending.push('\n');
            let pending = self.pending.trim();
            if let Some(value) = complete_value(pending) {
                push_value(value, out);
                self.pending.clear();
            } else if balanced(pending) {
                // Balanced but malformed: salvage what parses, move on so
                // later well-formed lines are not swallowed.
                let salvaged = extract_complete_objects_from_line(pending);
                if salvaged.is_empty() {
                    debug!(bytes = pending.len(), "dropping malformed multi-line JSON");
                }
                out.events.extend(salvaged);
                self.pending.clear();
            } else if self.pending.len() > MAX_PENDING_BYTES {
                debug!(bytes = self.pending.len(), "discarding oversized partial JSON");
                self.pending.clear();
            }
            return;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            // Blank lines matter to the free-text pathway (paragraph breaks).
            out.text.push(String::new());
            return;
        }

        if let Some(value) = complete_value(trimmed) {
            push_value(value, out);
            return;
        }

        // A line that opens an object or array but does not close it is the
        // start of a pretty-printed value; hold it for continuation lines.
        if (trimmed.starts_with('{') || trimmed.starts_with('[')) && !balanced(trimmed) {
            self.pending.push_str(trimmed);
            self.pending.push('\n');
            return;
        }

        // Embedded objects amid prefix text (e.g. log decoration).
        let embedded = extract_complete_objects_from_line(trimmed);
        if embedded.is_empty() {
            out.text.push(line.to_owned());
        } else {
            out.events.extend(embedded);
        }
    }
}

fn push_value(value: Value, out: &mut Parsed) {
    match value {
        Value::Array(items) => out.events.extend(items),
        other => out.events.push(other),
    }
}

/// Parse `s` as one complete JSON value, if it is one.
fn complete_value(s: &str) -> Option<Value> {
    serde_json::from_str(s).ok()
}

/// True when `s` parses as a single complete JSON value.
pub fn is_valid_complete_json(s: &str) -> bool {
    serde_json::from_str::<Value>(s).is_ok()
}

/// True when every brace/bracket opened in `s` is closed (string-aware).
fn balanced(s: &str) -> bool {
    matches!(scan_value(s, 0), Scan::Complete(_))
}

/// Outcome of a balanced-delimiter scan from a value start.
enum Scan {
    /// End offset (exclusive) of the complete value.
    Complete(usize),
    Incomplete,
}

/// Scan a JSON object/array starting at `start` (which must point at `{` or
/// `[`), honoring string literals and escapes. Returns where the value ends.
fn scan_value(s: &str, start: usize) -> Scan {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Scan::Complete(offset + 1);
                }
            }
            _ => {}
        }
    }
    Scan::Incomplete
}

/// Greedily extract every fully-terminated top-level JSON object embedded in
/// `line`, skipping malformed spans and surrounding text.
pub fn extract_complete_objects_from_line(line: &str) -> Vec<Value> {
    let mut out = Vec::new();
    let mut cursor = 0usize;

    while let Some(rel) = line[cursor..].find(['{', '[']) {
        let start = cursor + rel;
        match scan_value(line, start) {
            Scan::Complete(end) => {
                match serde_json::from_str::<Value>(&line[start..end]) {
                    Ok(value) => out.push(value),
                    Err(e) => debug!(error = %e, "skipping malformed JSON span"),
                }
                cursor = end;
            }
            Scan::Incomplete => break,
        }
    }
    out
}

/// Byte offset where the last complete top-level JSON value in `s` begins.
pub fn find_last_complete_json_start(s: &str) -> Option<usize> {
    let mut found = None;
    let mut cursor = 0usize;

    while let Some(rel) = s[cursor..].find(['{', '[']) {
        let start = cursor + rel;
        match scan_value(s, start) {
            Scan::Complete(end) => {
                if serde_json::from_str::<Value>(&s[start..end]).is_ok() {
                    found = Some(start);
                }
                cursor = end;
            }
            Scan::Incomplete => break,
        }
    }
    found
}

/// Extract objects from a (possibly partial) top-level JSON array.
///
/// A complete array yields its elements; a truncated one yields every
/// complete element that precedes the cut.
pub fn extract_complete_objects_from_array(s: &str) -> Vec<Value> {
    let trimmed = s.trim();
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
        return items;
    }
    let Some(rest) = trimmed.strip_prefix('[') else {
        return Vec::new();
    };
    extract_complete_objects_from_line(rest)
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
