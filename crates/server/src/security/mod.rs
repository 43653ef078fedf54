// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command security: preset-driven policy validation for assistant-invoked
//! shell commands, with an audit trail and human-approval queue.

pub mod approvals;
pub mod audit;
pub mod patterns;

pub use approvals::ApprovalStatus;
pub use audit::AuditEntry;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

use approvals::ApprovalLedger;
use audit::AuditLog;
use patterns::{compile_blocked, BlockedPattern, FORK_BOMB};

/// Named bundle of command-security defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPreset {
    Unrestricted,
    Standard,
    Restricted,
}

impl SecurityPreset {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unrestricted" => Some(Self::Unrestricted),
            "standard" => Some(Self::Standard),
            "restricted" => Some(Self::Restricted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unrestricted => "unrestricted",
            Self::Standard => "standard",
            Self::Restricted => "restricted",
        }
    }
}

/// Blocked commands baked into the `standard` preset.
fn standard_blocked() -> Vec<String> {
    vec![
        "rm -rf /".to_owned(),
        "rm -rf /*".to_owned(),
        r"re:^mkfs(\.\w+)?\b".to_owned(),
        "dd".to_owned(),
        "format".to_owned(),
        FORK_BOMB.to_owned(),
        "shutdown".to_owned(),
        "reboot".to_owned(),
    ]
}

/// Caller overrides layered on top of a preset.
#[derive(Debug, Clone, Default)]
pub struct SecurityOverrides {
    pub blocked_commands: Vec<String>,
    pub safe_directories: Vec<PathBuf>,
    pub require_confirmation: Option<bool>,
    pub read_only_mode: Option<bool>,
    pub enable_audit: Option<bool>,
    pub max_file_size: Option<u64>,
}

/// Immutable security configuration resolved from a preset plus overrides.
#[derive(Debug)]
pub struct SecurityConfig {
    pub preset: SecurityPreset,
    pub blocked_commands: Vec<String>,
    pub safe_directories: Vec<PathBuf>,
    pub require_confirmation: bool,
    pub read_only_mode: bool,
    pub enable_audit: bool,
    pub max_file_size: u64,
    compiled: Vec<BlockedPattern>,
}

impl SecurityConfig {
    pub fn from_preset(preset: SecurityPreset) -> Self {
        Self::new(preset, SecurityOverrides::default())
    }

    pub fn new(preset: SecurityPreset, overrides: SecurityOverrides) -> Self {
        let (mut blocked, require_confirmation, read_only_mode) = match preset {
            SecurityPreset::Unrestricted => (Vec::new(), false, false),
            SecurityPreset::Standard => (standard_blocked(), true, false),
            SecurityPreset::Restricted => (vec!["*".to_owned()], true, true),
        };
        blocked.extend(overrides.blocked_commands);

        let compiled = compile_blocked(&blocked);
        Self {
            preset,
            blocked_commands: blocked,
            safe_directories: overrides.safe_directories,
            require_confirmation: overrides.require_confirmation.unwrap_or(require_confirmation),
            read_only_mode: overrides.read_only_mode.unwrap_or(read_only_mode),
            enable_audit: overrides.enable_audit.unwrap_or(true),
            max_file_size: overrides.max_file_size.unwrap_or(10 * 1024 * 1024),
            compiled,
        }
    }
}

/// Outcome of validating one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub requires_confirmation: bool,
}

impl Verdict {
    fn allow() -> Self {
        Self { allowed: true, reason: None, code: None, requires_confirmation: false }
    }

    fn allow_with_confirmation() -> Self {
        Self { allowed: true, reason: None, code: None, requires_confirmation: true }
    }

    fn deny(code: ErrorCode, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            code: Some(code),
            requires_confirmation: false,
        }
    }
}

/// The command gate: immutable config plus the mutable audit ring and
/// pending-approval ledger, each under its own lock.
pub struct CommandGate {
    config: SecurityConfig,
    audit: Mutex<AuditLog>,
    approvals: Mutex<ApprovalLedger>,
}

impl CommandGate {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            config,
            audit: Mutex::new(AuditLog::new()),
            approvals: Mutex::new(ApprovalLedger::new()),
        }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Validate a command against the policy, recording an audit entry when
    /// auditing is enabled.
    pub fn validate_command(&self, command: &str, cwd: &Path) -> Verdict {
        let verdict = self.evaluate(command, cwd);
        if self.config.enable_audit {
            if let Ok(mut audit) = self.audit.lock() {
                audit.append(
                    command,
                    &cwd.display().to_string(),
                    verdict.allowed,
                    verdict.reason.clone(),
                    None,
                );
            }
        }
        verdict
    }

    /// Run the validator without touching the audit log.
    pub fn test_command(&self, command: &str, cwd: &Path) -> Verdict {
        self.evaluate(command, cwd)
    }

    fn evaluate(&self, command: &str, cwd: &Path) -> Verdict {
        if self.config.blocked_commands.iter().any(|e| e == "*") {
            return Verdict::deny(ErrorCode::BlockedCommand, "Command matches blocked pattern");
        }

        if self.config.compiled.iter().any(|p| p.matches(command)) {
            return Verdict::deny(ErrorCode::BlockedCommand, "Command matches blocked pattern");
        }

        if self.config.read_only_mode && patterns::is_write_command(command) {
            return Verdict::deny(
                ErrorCode::ReadonlyMode,
                "Write commands are disabled in read-only mode",
            );
        }

        if !self.config.safe_directories.is_empty() {
            for raw in patterns::extract_paths(command) {
                let normalized = patterns::normalize_path(&raw, cwd);
                let inside = self
                    .config
                    .safe_directories
                    .iter()
                    .any(|root| patterns::is_within(&normalized, root));
                if !inside {
                    return Verdict::deny(
                        ErrorCode::AccessDenied,
                        format!("Path {raw} is outside configured safe directories"),
                    );
                }
            }
        }

        if self.config.require_confirmation && patterns::is_destructive_command(command) {
            return Verdict::allow_with_confirmation();
        }

        Verdict::allow()
    }

    /// Open a human-approval request for a command, returning its id.
    pub fn request_permission(&self, command: &str, cwd: &Path) -> String {
        match self.approvals.lock() {
            Ok(mut ledger) => ledger.open(command, &cwd.display().to_string()),
            Err(poisoned) => poisoned.into_inner().open(command, &cwd.display().to_string()),
        }
    }

    pub fn approve_permission(&self, id: &str) -> bool {
        self.with_ledger(|ledger| ledger.approve(id))
    }

    pub fn deny_permission(&self, id: &str, reason: &str) -> bool {
        self.with_ledger(|ledger| ledger.deny(id, reason))
    }

    pub fn permission_status(&self, id: &str) -> Option<ApprovalStatus> {
        self.with_ledger(|ledger| ledger.status(id))
    }

    /// Snapshot audit entries, optionally filtered by allowed flag.
    pub fn audit_entries(&self, allowed: Option<bool>) -> Vec<AuditEntry> {
        match self.audit.lock() {
            Ok(audit) => audit.entries(allowed),
            Err(poisoned) => poisoned.into_inner().entries(allowed),
        }
    }

    /// Clear the audit log, returning the number of entries removed.
    pub fn clear_audit_log(&self) -> usize {
        match self.audit.lock() {
            Ok(mut audit) => audit.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    fn with_ledger<T>(&self, f: impl FnOnce(&mut ApprovalLedger) -> T) -> T {
        match self.approvals.lock() {
            Ok(mut ledger) => f(&mut ledger),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
