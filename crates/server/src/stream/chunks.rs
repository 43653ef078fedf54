// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-buffered chunker for free-form assistant output.
//!
//! Bytes go in (possibly mid-line, possibly mid-code-fence), display chunks
//! come out. An open code fence is never emitted partially: its lines are
//! held until the closing fence arrives or the caller signals final input.

use serde::Serialize;

/// Section labels promoted to level-1 section headers when a line ends in `:`.
const SECTION_LABELS: [&str; 6] = ["Plan", "Code", "Summary", "Steps", "Analysis", "Result"];

/// Kind tag for a parsed display chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Text,
    Code,
    Section,
    Header,
    List,
    Divider,
    Complete,
}

/// One parsed display chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
}

impl Chunk {
    fn text(content: String) -> Self {
        Self { kind: ChunkKind::Text, content, language: None, level: None }
    }

    fn code(language: String, content: String) -> Self {
        Self { kind: ChunkKind::Code, content, language: Some(language), level: None }
    }

    fn section(label: String) -> Self {
        Self { kind: ChunkKind::Section, content: label, language: None, level: Some(1) }
    }

    fn header(level: u8, content: String) -> Self {
        Self { kind: ChunkKind::Header, content, language: None, level: Some(level) }
    }

    fn list(content: String) -> Self {
        Self { kind: ChunkKind::List, content, language: None, level: None }
    }

    fn divider() -> Self {
        Self { kind: ChunkKind::Divider, content: String::new(), language: None, level: None }
    }

    fn complete() -> Self {
        Self { kind: ChunkKind::Complete, content: String::new(), language: None, level: None }
    }
}

/// Open code-fence state: captured language plus buffered body lines.
#[derive(Debug)]
struct OpenFence {
    language: String,
    lines: Vec<String>,
}

/// Incremental chunker. Feed byte fragments with [`TextChunker::parse_data`];
/// call with `is_final = true` to flush whatever remains.
#[derive(Debug, Default)]
pub struct TextChunker {
    line_buf: String,
    paragraph: Vec<String>,
    list_items: Vec<String>,
    fence: Option<OpenFence>,
}

impl TextChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a fragment of stdout. Complete lines are classified immediately;
    /// a trailing partial line is buffered. With `is_final`, the partial line
    /// and any open structures (including an unclosed code fence) are flushed
    /// best-effort.
    pub fn parse_data(&mut self, data: &[u8], is_final: bool) -> Vec<Chunk> {
        let mut out = Vec::new();

        if data.is_empty() && is_final && self.is_empty() {
            out.push(Chunk::complete());
            return out;
        }

        self.line_buf.push_str(&String::from_utf8_lossy(data));

        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            self.process_line(line.trim_end_matches(['\n', '\r']), &mut out);
        }

        if is_final {
            if !self.line_buf.is_empty() {
                let line = std::mem::take(&mut self.line_buf);
                self.process_line(line.trim_end_matches('\r'), &mut out);
            }
            self.flush_paragraph(&mut out);
            self.flush_list(&mut out);
            if let Some(fence) = self.fence.take() {
                out.push(Chunk::code(fence.language, fence.lines.join("\n")));
            }
        }

        out
    }

    /// Clear the line buffer and all open structures.
    pub fn reset(&mut self) {
        self.line_buf.clear();
        self.paragraph.clear();
        self.list_items.clear();
        self.fence = None;
    }

    fn is_empty(&self) -> bool {
        self.line_buf.is_empty()
            && self.paragraph.is_empty()
            && self.list_items.is_empty()
            && self.fence.is_none()
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<Chunk>) {
        if self.fence.is_some() {
            if line.trim() == "```" {
                if let Some(fence) = self.fence.take() {
                    out.push(Chunk::code(fence.language, fence.lines.join("\n")));
                }
            } else if let Some(fence) = self.fence.as_mut() {
                fence.lines.push(line.to_owned());
            }
            return;
        }

        if let Some(rest) = line.trim_start().strip_prefix("```") {
            self.flush_paragraph(out);
            self.flush_list(out);
            let language = rest.trim();
            let language = if language.is_empty() { "text" } else { language };
            self.fence = Some(OpenFence { language: language.to_owned(), lines: Vec::new() });
            return;
        }

        let trimmed = line.trim();

        if trimmed.is_empty() {
            self.flush_paragraph(out);
            self.flush_list(out);
            return;
        }

        if trimmed == "---" {
            self.flush_paragraph(out);
            self.flush_list(out);
            out.push(Chunk::divider());
            return;
        }

        if let Some((level, text)) = markdown_header(trimmed) {
            self.flush_paragraph(out);
            self.flush_list(out);
            out.push(Chunk::header(level, text.to_owned()));
            return;
        }

        if let Some(label) = section_label(trimmed) {
            self.flush_paragraph(out);
            self.flush_list(out);
            out.push(Chunk::section(label.to_owned()));
            return;
        }

        if is_list_item(trimmed) {
            self.flush_paragraph(out);
            self.list_items.push(trimmed.to_owned());
            return;
        }

        self.flush_list(out);
        self.paragraph.push(trimmed.to_owned());
    }

    fn flush_paragraph(&mut self, out: &mut Vec<Chunk>) {
        if !self.paragraph.is_empty() {
            let lines = std::mem::take(&mut self.paragraph);
            out.push(Chunk::text(lines.join("\n")));
        }
    }

    fn flush_list(&mut self, out: &mut Vec<Chunk>) {
        if !self.list_items.is_empty() {
            let items = std::mem::take(&mut self.list_items);
            out.push(Chunk::list(items.join("\n")));
        }
    }
}

/// Parse `#{1..6} text` into `(level, text)`.
fn markdown_header(line: &str) -> Option<(u8, &str)> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if (1..=6).contains(&hashes) {
        let rest = &line[hashes..];
        if let Some(text) = rest.strip_prefix(' ') {
            return Some((hashes as u8, text.trim()));
        }
    }
    None
}

/// Match a known section label line (`Plan:`, `Summary:`, ...), returning the label.
fn section_label(line: &str) -> Option<&'static str> {
    let label = line.strip_suffix(':')?;
    SECTION_LABELS.iter().find(|known| label.eq_ignore_ascii_case(known)).copied()
}

/// True for bullet (`-`, `*`, `+`) and numbered (`1.`, `2)`) list items.
fn is_list_item(line: &str) -> bool {
    if let Some(rest) = line.strip_prefix(['-', '*', '+']) {
        return rest.starts_with(' ');
    }
    let digits = line.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    let rest = &line[digits..];
    (rest.starts_with('.') || rest.starts_with(')')) && rest[1..].starts_with(' ')
}

#[cfg(test)]
#[path = "chunks_tests.rs"]
mod tests;
