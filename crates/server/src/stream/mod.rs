// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream parsing: raw subprocess stdout → typed chunks and JSON events.
//!
//! Two pathways. [`chunks::TextChunker`] turns free-form assistant text into
//! display chunks (paragraphs, fenced code, headers, lists). [`jsonl`] turns
//! the assistant's machine-readable stream-json output into parsed events,
//! recovering objects that arrive fragmented across chunk boundaries.

pub mod chunks;
pub mod jsonl;

pub use chunks::{Chunk, ChunkKind, TextChunker};
pub use jsonl::JsonlParser;
