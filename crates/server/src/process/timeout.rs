// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-prompt timeout derivation from prompt complexity.

use std::time::Duration;

/// Keywords that mark a prompt as complex (code review, debugging, ...).
const COMPLEX_TERMS: [&str; 6] = ["review", "analyze", "audit", "debug", "test", "document"];

/// Keywords that mark a prompt as very complex; this tier overrides the
/// complex tier.
const VERY_COMPLEX_TERMS: [&str; 5] = ["expert", "comprehensive", "thorough", "complete", "full"];

/// Derive the execution timeout for a prompt.
///
/// Tiers: 2 min baseline, 3 min at ≥100 chars, 5 min at ≥250 chars or a
/// complex keyword, 10 min for very-complex keywords. A blank prompt gets
/// the 1 min floor.
pub fn command_timeout(prompt: &str) -> Duration {
    if prompt.trim().is_empty() {
        return Duration::from_secs(60);
    }

    let lower = prompt.to_lowercase();

    if VERY_COMPLEX_TERMS.iter().any(|t| lower.contains(t)) {
        return Duration::from_secs(10 * 60);
    }
    if COMPLEX_TERMS.iter().any(|t| lower.contains(t)) {
        return Duration::from_secs(5 * 60);
    }
    if prompt.len() >= 250 {
        return Duration::from_secs(5 * 60);
    }
    if prompt.len() >= 100 {
        return Duration::from_secs(3 * 60);
    }
    Duration::from_secs(2 * 60)
}

#[cfg(test)]
#[path = "timeout_tests.rs"]
mod tests;
