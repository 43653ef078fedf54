// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::process::RunnerConfig;
use crate::queue::QueueLimits;
use crate::security::{SecurityConfig, SecurityOverrides, SecurityPreset};
use crate::session::SessionLimits;

/// Companion server for AI coding assistants.
#[derive(Debug, Parser)]
#[command(name = "companion", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "COMPANION_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP/WebSocket port to listen on.
    #[arg(long, env = "COMPANION_PORT", default_value = "3001")]
    pub port: u16,

    /// Assistant binary name or absolute path.
    #[arg(long, env = "COMPANION_ASSISTANT_BIN", default_value = "claude")]
    pub assistant_bin: String,

    /// Maximum number of concurrent session records.
    #[arg(long, env = "COMPANION_MAX_SESSIONS", default_value = "10")]
    pub max_sessions: usize,

    /// Idle timeout for foreground sessions, in seconds.
    #[arg(long, env = "COMPANION_SESSION_TIMEOUT", default_value = "86400")]
    pub session_timeout_secs: u64,

    /// Idle timeout for backgrounded sessions, in seconds.
    #[arg(long, env = "COMPANION_BACKGROUNDED_SESSION_TIMEOUT", default_value = "14400")]
    pub backgrounded_session_timeout_secs: u64,

    /// Idle span before a warning fires, in seconds (0 = derive from the
    /// session timeout).
    #[arg(long, env = "COMPANION_SESSION_WARNING_TIME", default_value = "0")]
    pub session_warning_secs: u64,

    /// Floor for the timeout sweeper interval, in seconds.
    #[arg(long, env = "COMPANION_MIN_TIMEOUT_CHECK_INTERVAL", default_value = "60")]
    pub min_timeout_check_interval_secs: u64,

    /// Maximum number of sessions processing prompts at once.
    #[arg(long, env = "COMPANION_MAX_CONCURRENT_SESSIONS", default_value = "5")]
    pub max_concurrent_sessions: usize,

    /// Approximate per-session message buffer budget, in bytes.
    #[arg(long, env = "COMPANION_MAX_MEMORY_PER_SESSION", default_value = "8388608")]
    pub max_memory_per_session: u64,

    /// Approximate total buffer budget across sessions, in bytes.
    #[arg(long, env = "COMPANION_MAX_TOTAL_MEMORY", default_value = "134217728")]
    pub max_total_memory: u64,

    /// Client liveness ping interval, in seconds.
    #[arg(long, env = "COMPANION_HEALTH_CHECK_INTERVAL", default_value = "30")]
    pub health_check_interval_secs: u64,

    /// Window in which a returning device counts as a reconnection, in
    /// seconds.
    #[arg(long, env = "COMPANION_RECONNECTION_WINDOW", default_value = "300")]
    pub reconnection_window_secs: u64,

    /// How long subscription history survives for restore, in seconds.
    #[arg(long, env = "COMPANION_HISTORY_RETENTION", default_value = "86400")]
    pub history_retention_secs: u64,

    /// Command security preset (unrestricted, standard, restricted).
    #[arg(long, env = "COMPANION_SECURITY_PRESET", default_value = "standard")]
    pub security_preset: String,

    /// Directories commands may touch (comma-separated; empty = no check).
    #[arg(long, env = "COMPANION_SAFE_DIRECTORIES", value_delimiter = ',')]
    pub safe_directories: Vec<PathBuf>,

    /// Extra blocked command entries (`re:` prefix for regex).
    #[arg(long, env = "COMPANION_BLOCKED_COMMANDS", value_delimiter = ',')]
    pub blocked_commands: Vec<String>,

    /// Override the preset's read-only mode.
    #[arg(long, env = "COMPANION_READ_ONLY_MODE")]
    pub read_only_mode: Option<bool>,

    /// Override the preset's confirmation requirement.
    #[arg(long, env = "COMPANION_REQUIRE_CONFIRMATION")]
    pub require_confirmation: Option<bool>,

    /// Record command decisions in the audit ring.
    #[arg(long, env = "COMPANION_ENABLE_AUDIT")]
    pub enable_audit: Option<bool>,

    /// Maximum file size commands may reference, in bytes.
    #[arg(long, env = "COMPANION_MAX_FILE_SIZE", default_value = "10485760")]
    pub max_file_size: u64,

    /// Assistant permission mode.
    #[arg(long, env = "COMPANION_PERMISSION_MODE", default_value = "default")]
    pub permission_mode: String,

    /// Tools the assistant may use (comma-separated).
    #[arg(
        long,
        env = "COMPANION_ALLOWED_TOOLS",
        value_delimiter = ',',
        default_values_t = ["Read".to_owned(), "Write".to_owned(), "Edit".to_owned()]
    )]
    pub allowed_tools: Vec<String>,

    /// Tools the assistant may not use (comma-separated).
    #[arg(long, env = "COMPANION_DISALLOWED_TOOLS", value_delimiter = ',')]
    pub disallowed_tools: Vec<String>,

    /// Skip the assistant's own permission prompts.
    #[arg(long, env = "COMPANION_SKIP_PERMISSIONS", default_value = "false")]
    pub skip_permissions: bool,

    /// Restrict all session working directories to this root.
    #[arg(long, env = "COMPANION_SAFE_ROOT")]
    pub safe_root: Option<PathBuf>,

    /// Queued-message age cap, in seconds.
    #[arg(long, env = "COMPANION_MAX_QUEUE_AGE", default_value = "3600")]
    pub max_queue_age_secs: u64,

    /// Queued-message length cap per session.
    #[arg(long, env = "COMPANION_MAX_QUEUE_LENGTH", default_value = "100")]
    pub max_queue_length: usize,

    /// Log format (json or text).
    #[arg(long, env = "COMPANION_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "COMPANION_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("--port must be non-zero");
        }
        if self.max_sessions == 0 {
            anyhow::bail!("--max-sessions must be at least 1");
        }
        if SecurityPreset::parse(&self.security_preset).is_none() {
            anyhow::bail!(
                "unknown --security-preset '{}' (expected unrestricted, standard, restricted)",
                self.security_preset
            );
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("--log-format must be 'json' or 'text'");
        }
        if self.session_warning_secs > 0
            && self.session_warning_secs >= self.session_timeout_secs
        {
            anyhow::bail!("--session-warning-time must be below --session-timeout");
        }
        if let Some(root) = self.safe_root.as_deref() {
            if !root.is_absolute() {
                anyhow::bail!("--safe-root must be an absolute path");
            }
        }
        Ok(())
    }

    pub fn preset(&self) -> SecurityPreset {
        SecurityPreset::parse(&self.security_preset).unwrap_or(SecurityPreset::Standard)
    }

    pub fn session_limits(&self) -> SessionLimits {
        let session_timeout = Duration::from_secs(self.session_timeout_secs);
        let warning_window = if self.session_warning_secs > 0 {
            Some(Duration::from_secs(self.session_warning_secs))
        } else if self.session_timeout_secs > 600 {
            // Warn five minutes before expiry by default.
            Some(session_timeout - Duration::from_secs(300))
        } else {
            None
        };

        SessionLimits {
            max_sessions: self.max_sessions,
            session_timeout,
            backgrounded_timeout: Duration::from_secs(self.backgrounded_session_timeout_secs),
            warning_window,
            min_check_interval: Duration::from_secs(self.min_timeout_check_interval_secs),
            safe_root: self.safe_root.clone(),
            buffer_capacity: self.buffer_capacity(),
        }
    }

    /// Derive the per-session buffered-message cap from the memory budgets,
    /// assuming a few KiB per message.
    fn buffer_capacity(&self) -> usize {
        let per_session = self.max_memory_per_session;
        let fair_share = self.max_total_memory / self.max_sessions.max(1) as u64;
        let budget = per_session.min(fair_share);
        usize::try_from(budget / 4096).unwrap_or(usize::MAX).clamp(16, 2000)
    }

    pub fn queue_limits(&self) -> QueueLimits {
        QueueLimits {
            max_age: Duration::from_secs(self.max_queue_age_secs),
            max_length: self.max_queue_length,
        }
    }

    pub fn security_config(&self) -> SecurityConfig {
        SecurityConfig::new(
            self.preset(),
            SecurityOverrides {
                blocked_commands: self.blocked_commands.clone(),
                safe_directories: self.safe_directories.clone(),
                require_confirmation: self.require_confirmation,
                read_only_mode: self.read_only_mode,
                enable_audit: self.enable_audit,
                max_file_size: Some(self.max_file_size),
            },
        )
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            binary: self.assistant_bin.clone(),
            permission_mode: self.permission_mode.clone(),
            allowed_tools: self.allowed_tools.clone(),
            disallowed_tools: self.disallowed_tools.clone(),
            skip_permissions: self.skip_permissions,
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn reconnection_window(&self) -> Duration {
        Duration::from_secs(self.reconnection_window_secs)
    }

    pub fn history_retention(&self) -> Duration {
        Duration::from_secs(self.history_retention_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
