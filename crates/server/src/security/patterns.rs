// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure classification helpers for the command gate: blocked-entry matching,
//! path extraction, and write/destructive detection.

use std::path::{Component, Path, PathBuf};

use regex::Regex;
use tracing::warn;

/// The literal fork-bomb string the standard preset blocks.
pub const FORK_BOMB: &str = ":(){ :|:& };:";

/// A compiled blocked-commands entry. Entries are literal unless prefixed
/// with `re:`.
#[derive(Debug, Clone)]
pub enum BlockedPattern {
    Literal(String),
    Regex(Regex),
}

impl BlockedPattern {
    /// Literal entries match on exact equality or `entry + space` prefix, so
    /// `rm` blocks `rm file` but not `rmdir`, and `rm -rf /` does not block
    /// `rm -rf /home/user`.
    pub fn matches(&self, command: &str) -> bool {
        match self {
            Self::Literal(entry) => {
                command == entry || command.starts_with(&format!("{entry} "))
            }
            Self::Regex(re) => re.is_match(command),
        }
    }
}

/// Compile raw blocked-commands entries. An invalid `re:` pattern degrades to
/// a literal match on its pattern text.
pub fn compile_blocked(entries: &[String]) -> Vec<BlockedPattern> {
    entries
        .iter()
        .map(|entry| match entry.strip_prefix("re:") {
            Some(pattern) => match Regex::new(pattern) {
                Ok(re) => BlockedPattern::Regex(re),
                Err(e) => {
                    warn!(pattern, error = %e, "invalid blocked-command regex, using literal");
                    BlockedPattern::Literal(pattern.to_owned())
                }
            },
            None => BlockedPattern::Literal(entry.clone()),
        })
        .collect()
}

/// Extract filesystem paths referenced by a command string: absolute paths,
/// relative paths containing `/`, and the values of `--file=`, `--path=`,
/// `-f`, and `-o` flags.
pub fn extract_paths(command: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut tokens = command.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        if let Some(value) = token.strip_prefix("--file=").or_else(|| token.strip_prefix("--path="))
        {
            if !value.is_empty() {
                out.push(value.to_owned());
            }
            continue;
        }
        if token == "-f" || token == "-o" {
            if let Some(value) = tokens.peek() {
                if !value.starts_with('-') {
                    out.push((*value).to_owned());
                    tokens.next();
                }
            }
            continue;
        }
        if token.starts_with('-') {
            continue;
        }
        if token.starts_with('/') || token.contains('/') {
            out.push(token.to_owned());
        }
    }
    out
}

/// Resolve `path` against `cwd` and collapse `.` / `..` lexically, without
/// touching the filesystem.
pub fn normalize_path(path: &str, cwd: &Path) -> PathBuf {
    let raw = Path::new(path);
    let joined = if raw.is_absolute() { raw.to_path_buf() } else { cwd.join(raw) };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// True when `path` equals `root` or sits beneath it.
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

const WRITE_LEADERS: [&str; 7] = ["rm", "mkdir", "rmdir", "touch", "mv", "chmod", "chown"];
const GIT_WRITE_VERBS: [&str; 4] = ["add", "commit", "push", "rm"];

/// True for commands that mutate the filesystem: output redirection, the
/// usual file-mutating leaders, forced copies, and git write verbs.
pub fn is_write_command(command: &str) -> bool {
    if command.contains('>') || command.contains("|tee") || command.contains("| tee") {
        return true;
    }

    let mut tokens = command.split_whitespace();
    let Some(first) = tokens.next() else {
        return false;
    };

    if WRITE_LEADERS.contains(&first) {
        return true;
    }
    if first == "cp" && tokens.clone().any(|t| t == "-f") {
        return true;
    }
    if first == "git" {
        if let Some(verb) = tokens.next() {
            if GIT_WRITE_VERBS.contains(&verb) {
                return true;
            }
            if verb == "reset" && command.contains("--hard") {
                return true;
            }
            if verb == "checkout" && command.contains(" -- ") {
                return true;
            }
        }
    }
    false
}

/// True for commands that can irreversibly destroy data.
pub fn is_destructive_command(command: &str) -> bool {
    if command.contains("rm -rf")
        || command.contains("diskutil eraseDisk")
        || command.contains(FORK_BOMB)
    {
        return true;
    }
    if command.split_whitespace().next() == Some("format") {
        return true;
    }
    // dd writing straight to a device node
    (command.starts_with("dd ") || command.contains(" dd "))
        && command.contains("if=")
        && command.contains("of=/dev/")
}

#[cfg(test)]
#[path = "patterns_tests.rs"]
mod tests;
