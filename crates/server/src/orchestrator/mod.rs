// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator: ingress dispatch. A client message comes in; the
//! orchestrator routes it through the security gate, the session manager,
//! and the process runner, and lets the pipeline/broadcaster pair carry the
//! results back out.

pub mod pipeline;

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::connection::{ClientEntry, ConnectionManager};
use crate::error::{ErrorCode, OperationError};
use crate::event::{ProcessEvent, ServerEvent};
use crate::process::{self, command_timeout, RunnerConfig};
use crate::queue::MessageQueue;
use crate::security::CommandGate;
use crate::session::{CreateOptions, SessionEntry, SessionManager, TurnResult};
use crate::transport::ws_msg::{ClientMessage, Envelope, Inbound, OutboundKind};

/// Words accepted as a permission approval.
const APPROVALS: [&str; 7] = ["y", "yes", "approve", "allow", "ok", "proceed", "continue"];
/// Words accepted as a permission denial.
const DENIALS: [&str; 4] = ["n", "no", "deny", "reject"];

/// Normalize a permission response: `Some(true)` approve, `Some(false)`
/// deny, `None` unrecognized.
pub fn normalize_permission_response(raw: &str) -> Option<bool> {
    let normalized = raw.trim().to_lowercase();
    if APPROVALS.contains(&normalized.as_str()) {
        return Some(true);
    }
    if DENIALS.contains(&normalized.as_str()) {
        return Some(false);
    }
    None
}

/// Wires ingress through security, sessions, and the runner.
pub struct Orchestrator {
    pub sessions: Arc<SessionManager>,
    pub connections: Arc<ConnectionManager>,
    pub broadcaster: Arc<Broadcaster>,
    pub security: Arc<CommandGate>,
    pub queue: Arc<MessageQueue>,
    pub runner: RunnerConfig,
    events: broadcast::Sender<ServerEvent>,
    max_concurrent: usize,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        connections: Arc<ConnectionManager>,
        broadcaster: Arc<Broadcaster>,
        security: Arc<CommandGate>,
        queue: Arc<MessageQueue>,
        runner: RunnerConfig,
        events: broadcast::Sender<ServerEvent>,
    ) -> Self {
        Self {
            sessions,
            connections,
            broadcaster,
            security,
            queue,
            runner,
            events,
            max_concurrent: usize::MAX,
        }
    }

    /// Cap how many sessions may process prompts at the same time.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Whether the assistant binary can be executed at all.
    pub fn check_availability(&self) -> bool {
        process::check_availability(&self.runner.binary)
    }

    /// Handle one validated ingress message, returning the direct reply (if
    /// any). Session-scoped results are fanned out by the broadcaster, not
    /// returned here.
    pub async fn handle_message(
        &self,
        client: &Arc<ClientEntry>,
        inbound: Inbound,
    ) -> Option<Envelope> {
        let request_id = inbound.request_id.clone();
        match inbound.message {
            ClientMessage::Ask { prompt, session_id, working_directory, format: _ } => self
                .start_prompt(
                    client,
                    request_id,
                    session_id.as_deref(),
                    working_directory.as_deref(),
                    &prompt,
                    false,
                )
                .await,

            ClientMessage::StreamStart { working_directory, session_id, skip_permissions } => {
                match self
                    .open_session(
                        client,
                        session_id.as_deref(),
                        Some(&working_directory),
                        "",
                        skip_permissions,
                    )
                    .await
                {
                    Ok((entry, reused)) => Some(Envelope::reply(
                        OutboundKind::SessionCreated,
                        request_id,
                        json!({ "sessionId": entry.id, "reused": reused }),
                    )),
                    Err(err) => Some(Envelope::from_operation_error(request_id, &err)),
                }
            }

            ClientMessage::StreamSend { session_id, prompt } => self
                .start_prompt(client, request_id, Some(&session_id), None, &prompt, true)
                .await,

            ClientMessage::StreamClose { session_id } => {
                let result = self.sessions.close_session(&session_id);
                if result.success {
                    Some(Envelope::reply(
                        OutboundKind::SessionCleaned,
                        request_id,
                        json!({ "sessionId": session_id, "reason": "user_requested" }),
                    ))
                } else {
                    Some(Envelope::error(
                        request_id,
                        ErrorCode::SessionNotFound,
                        result.message.unwrap_or_else(|| "Session not found".to_owned()),
                    ))
                }
            }

            ClientMessage::Permission { session_id, response } => {
                match self.handle_permission_prompt(&session_id, &response).await {
                    Ok(approved) => {
                        // A requestId on a permission message names the
                        // pending approval it answers.
                        if let Some(id) = request_id.as_deref() {
                            if approved {
                                self.security.approve_permission(id);
                            } else {
                                self.security.deny_permission(id, "denied by client");
                            }
                        }
                        request_id.map(|rid| {
                            Envelope::reply(
                                OutboundKind::CommandProgress,
                                Some(rid),
                                json!({
                                    "sessionId": session_id,
                                    "stage": "permission_forwarded",
                                    "approved": approved,
                                }),
                            )
                        })
                    }
                    Err(err) => Some(Envelope::from_operation_error(request_id, &err)),
                }
            }

            ClientMessage::Subscribe { session_id } => {
                self.connections.subscribe(&client.id, &session_id);
                let backlog = self.queue.drain(&session_id);
                let replayed = backlog.len();
                for message in backlog {
                    if !client.try_send(message) {
                        break;
                    }
                }
                Some(Envelope::reply(
                    OutboundKind::Subscribed,
                    request_id,
                    json!({ "sessionId": session_id, "replayed": replayed }),
                ))
            }

            ClientMessage::SetWorkingDirectory { path } => {
                match self.sessions.validate_directory(&path) {
                    Ok(normalized) => Some(Envelope::reply(
                        OutboundKind::WorkingDirectorySet,
                        request_id,
                        json!({ "path": normalized.display().to_string() }),
                    )),
                    Err(err) => Some(Envelope::from_operation_error(request_id, &err)),
                }
            }

            ClientMessage::Ping => {
                Some(Envelope::reply(OutboundKind::Pong, request_id, Value::Null))
            }

            ClientMessage::Pong => {
                self.connections.mark_alive(&client.id);
                None
            }

            ClientMessage::ClientBackgrounding { session_id } => {
                self.sessions.mark_session_backgrounded(&session_id);
                request_id.map(|rid| {
                    Envelope::reply(
                        OutboundKind::CommandProgress,
                        Some(rid),
                        json!({ "sessionId": session_id, "stage": "backgrounded" }),
                    )
                })
            }

            ClientMessage::RegisterDevice { device_id } => {
                match self.connections.register_device(&client.id, &device_id) {
                    Some(fingerprint) => Some(Envelope::reply(
                        OutboundKind::DeviceRegistered,
                        request_id,
                        json!({ "deviceId": device_id, "fingerprint": fingerprint }),
                    )),
                    None => Some(Envelope::error(
                        request_id,
                        ErrorCode::Internal,
                        "client record missing",
                    )),
                }
            }

            ClientMessage::AicliCommand { command, cwd } => {
                self.handle_aicli_command(client, request_id, &command, &cwd).await
            }
        }
    }

    /// Gate a client-proposed command, then route it like a prompt.
    async fn handle_aicli_command(
        &self,
        client: &Arc<ClientEntry>,
        request_id: Option<String>,
        command: &str,
        cwd: &str,
    ) -> Option<Envelope> {
        let verdict = self.security.validate_command(command, Path::new(cwd));

        if !verdict.allowed {
            let code = verdict.code.unwrap_or(ErrorCode::BlockedCommand);
            let reason = verdict.reason.unwrap_or_else(|| "Command not allowed".to_owned());
            return Some(Envelope::error(request_id, code, reason));
        }

        if verdict.requires_confirmation {
            let approval_id = self.security.request_permission(command, Path::new(cwd));
            return Some(Envelope::reply(
                OutboundKind::PermissionRequired,
                request_id,
                json!({
                    "requestId": approval_id,
                    "prompt": format!("Allow `{command}` in {cwd}?"),
                }),
            ));
        }

        self.start_prompt(client, request_id, None, Some(cwd), command, false).await
    }

    /// Shared prompt ingress for `ask`, `streamSend`, and allowed commands.
    ///
    /// `existing_only` rejects unknown session ids instead of creating one.
    async fn start_prompt(
        &self,
        client: &Arc<ClientEntry>,
        request_id: Option<String>,
        session_id: Option<&str>,
        working_directory: Option<&str>,
        prompt: &str,
        existing_only: bool,
    ) -> Option<Envelope> {
        if !self.check_availability() {
            return Some(Envelope::error(
                request_id,
                ErrorCode::AssistantUnavailable,
                format!("Claude Code execution failed: {} not found", self.runner.binary),
            ));
        }

        let (entry, reused) = if existing_only {
            let Some(id) = session_id else {
                return Some(Envelope::error(
                    request_id,
                    ErrorCode::InvalidMessage,
                    "sessionId required",
                ));
            };
            match self.sessions.get_session(id) {
                Some(entry) => (entry, true),
                None => {
                    return Some(Envelope::error(
                        request_id,
                        ErrorCode::SessionNotFound,
                        "Session not found",
                    ))
                }
            }
        } else {
            match self.open_session(client, session_id, working_directory, prompt, false).await {
                Ok(pair) => pair,
                Err(err) => return Some(Envelope::from_operation_error(request_id, &err)),
            }
        };

        self.connections.subscribe(&client.id, &entry.id);

        if let Err(err) = self.execute_prompt(&entry, prompt).await {
            return Some(Envelope::from_operation_error(request_id, &err));
        }

        Some(Envelope::reply(
            OutboundKind::SessionCreated,
            request_id,
            json!({ "sessionId": entry.id, "reused": reused }),
        ))
    }

    /// Find-or-create a session and make sure its subprocess is running.
    async fn open_session(
        &self,
        client: &Arc<ClientEntry>,
        session_id: Option<&str>,
        working_directory: Option<&str>,
        prompt: &str,
        skip_permissions: bool,
    ) -> Result<(Arc<SessionEntry>, bool), OperationError> {
        if let Some(id) = session_id {
            if let Some(entry) = self.sessions.get_session(id) {
                self.connections.subscribe(&client.id, &entry.id);
                self.ensure_process(&entry).await?;
                return Ok((entry, true));
            }
        }

        let Some(dir) = working_directory else {
            return Err(OperationError::new(
                ErrorCode::InvalidDirectory,
                "workingDirectory required",
            ));
        };

        let outcome = self.sessions.create_interactive_session(
            session_id,
            prompt,
            dir,
            CreateOptions { skip_permissions },
        )?;
        self.connections.subscribe(&client.id, &outcome.session_id);
        self.ensure_process(&outcome.entry).await?;
        Ok((outcome.entry, outcome.reused))
    }

    /// Bind a subprocess to the session if none is alive, spawning the
    /// pipeline task alongside it.
    pub async fn ensure_process(
        &self,
        entry: &Arc<SessionEntry>,
    ) -> Result<(), OperationError> {
        if entry.process().is_some_and(|h| h.is_alive()) {
            return Ok(());
        }

        let mut config = self.runner.clone();
        if entry.skip_permissions {
            config.skip_permissions = true;
        }
        let resume = entry.assistant_session_id();

        let spawned = process::spawn_assistant(&config, &entry.working_dir, resume.as_deref())
            .map_err(|e| {
                OperationError::new(
                    ErrorCode::ProcessFailed,
                    format!("Claude Code execution failed: {e}"),
                )
            })?;

        info!(session = %entry.id, pid = spawned.handle.pid, "assistant subprocess started");
        entry.attach_process(spawned.handle.clone());
        let _ = self.events.send(ServerEvent::Process(ProcessEvent::Started {
            session_id: entry.id.clone(),
            pid: spawned.handle.pid,
        }));

        tokio::spawn(pipeline::run_pipeline(
            Arc::clone(entry),
            spawned.stdout_rx,
            spawned.exit_rx,
            Arc::clone(&self.sessions),
            self.events.clone(),
        ));
        Ok(())
    }

    /// Write a prompt to the session's subprocess and watch the turn in the
    /// background. Rejects a second prompt while one is processing.
    pub async fn execute_prompt(
        &self,
        entry: &Arc<SessionEntry>,
        prompt: &str,
    ) -> Result<(), OperationError> {
        if self.sessions.processing_count() >= self.max_concurrent {
            return Err(OperationError::new(
                ErrorCode::SessionBusy,
                "Too many sessions are processing prompts",
            ));
        }
        if !entry.try_begin_processing() {
            return Err(OperationError::new(
                ErrorCode::SessionBusy,
                "Session is already processing a prompt",
            ));
        }

        self.ensure_process(entry).await.inspect_err(|_| entry.set_processing(false))?;

        let Some(handle) = entry.process() else {
            entry.set_processing(false);
            return Err(OperationError::new(
                ErrorCode::ProcessFailed,
                "Claude Code execution failed: no subprocess bound",
            ));
        };

        // New prompt resets the per-turn buffer.
        entry.buffer.write().await.clear();
        entry.touch();
        self.sessions.mark_conversation_started(&entry.id);

        let (waiter_tx, waiter_rx) = oneshot::channel();
        if !entry.install_turn_waiter(waiter_tx) {
            entry.set_processing(false);
            return Err(OperationError::new(
                ErrorCode::SessionBusy,
                "Session is already processing a prompt",
            ));
        }

        if let Err(e) = handle.write_line(prompt).await {
            entry.resolve_turn(TurnResult::Cancelled);
            entry.set_processing(false);
            return Err(OperationError::new(
                ErrorCode::ProcessFailed,
                format!("Claude Code execution failed: {e}"),
            ));
        }

        let timeout = command_timeout(prompt);
        let entry = Arc::clone(entry);
        let events = self.events.clone();
        tokio::spawn(watch_turn(entry, waiter_rx, timeout, events));
        Ok(())
    }

    /// Forward a permission response to the session's stdin. Returns whether
    /// the response reads as an approval.
    pub async fn handle_permission_prompt(
        &self,
        session_id: &str,
        response: &str,
    ) -> Result<bool, OperationError> {
        let Some(entry) = self.sessions.get_session(session_id) else {
            return Err(OperationError::new(ErrorCode::SessionNotFound, "Session not found"));
        };
        let Some(handle) = entry.process() else {
            return Err(OperationError::new(
                ErrorCode::ProcessFailed,
                "no subprocess bound to session",
            ));
        };

        let normalized = normalize_permission_response(response);
        let line = match normalized {
            Some(true) => "y",
            Some(false) => "n",
            None => response.trim(),
        };
        handle.write_line(line).await.map_err(|e| {
            OperationError::new(ErrorCode::ProcessFailed, format!("stdin write failed: {e}"))
        })?;

        entry.touch();
        {
            let mut buffer = entry.buffer.write().await;
            buffer.permission_request_sent = false;
        }
        Ok(normalized.unwrap_or(false))
    }
}

/// Await the turn outcome, converting a timeout into a cancellation. Runs
/// detached so the ingress path never blocks on a long turn.
async fn watch_turn(
    entry: Arc<SessionEntry>,
    waiter_rx: oneshot::Receiver<TurnResult>,
    timeout: std::time::Duration,
    events: broadcast::Sender<ServerEvent>,
) {
    match tokio::time::timeout(timeout, waiter_rx).await {
        Ok(Ok(TurnResult::Final(_))) => {
            debug!(session = %entry.id, "turn completed");
        }
        Ok(Ok(TurnResult::Exited(code))) => {
            warn!(session = %entry.id, ?code, "subprocess exited mid-turn");
        }
        Ok(Ok(TurnResult::Cancelled)) | Ok(Err(_)) => {
            debug!(session = %entry.id, "turn cancelled");
        }
        Err(_) => {
            warn!(session = %entry.id, ?timeout, "turn timed out");
            let _ = events.send(ServerEvent::Process(ProcessEvent::StreamError {
                session_id: entry.id.clone(),
                message: format!("prompt timed out after {}s", timeout.as_secs()),
            }));
            entry.resolve_turn(TurnResult::Cancelled);
            if let Some(handle) = entry.process() {
                handle.signal(nix::sys::signal::Signal::SIGTERM);
            }
            entry.set_processing(false);
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
