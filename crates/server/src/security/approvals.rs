// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-approval requests for commands that need confirmation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

/// How long resolved requests stay queryable before being pruned.
const RESOLVED_RETENTION: Duration = Duration::from_secs(60);

/// Resolution state of a permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied { reason: String },
}

/// One tracked permission request.
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    pub id: String,
    pub command: String,
    pub cwd: String,
    pub status: ApprovalStatus,
    pub created_at: Instant,
    pub resolved_at: Option<Instant>,
}

/// Pending-permission ledger. Callers hold the surrounding lock.
#[derive(Debug, Default)]
pub struct ApprovalLedger {
    requests: HashMap<String, PermissionRequest>,
}

impl ApprovalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a request and return its id.
    pub fn open(&mut self, command: &str, cwd: &str) -> String {
        self.prune();
        let id = Uuid::new_v4().to_string();
        self.requests.insert(
            id.clone(),
            PermissionRequest {
                id: id.clone(),
                command: command.to_owned(),
                cwd: cwd.to_owned(),
                status: ApprovalStatus::Pending,
                created_at: Instant::now(),
                resolved_at: None,
            },
        );
        id
    }

    /// Approve a pending request. False when unknown or already resolved.
    pub fn approve(&mut self, id: &str) -> bool {
        self.resolve(id, ApprovalStatus::Approved)
    }

    /// Deny a pending request with a reason. False when unknown or resolved.
    pub fn deny(&mut self, id: &str, reason: &str) -> bool {
        self.resolve(id, ApprovalStatus::Denied { reason: reason.to_owned() })
    }

    pub fn status(&self, id: &str) -> Option<ApprovalStatus> {
        self.requests.get(id).map(|r| r.status.clone())
    }

    pub fn get(&self, id: &str) -> Option<&PermissionRequest> {
        self.requests.get(id)
    }

    pub fn pending_count(&self) -> usize {
        self.requests.values().filter(|r| r.status == ApprovalStatus::Pending).count()
    }

    fn resolve(&mut self, id: &str, status: ApprovalStatus) -> bool {
        let Some(request) = self.requests.get_mut(id) else {
            return false;
        };
        if request.status != ApprovalStatus::Pending {
            return false;
        }
        request.status = status;
        request.resolved_at = Some(Instant::now());
        true
    }

    /// Drop resolved requests past the retention window.
    fn prune(&mut self) {
        self.requests.retain(|_, r| match r.resolved_at {
            Some(at) => at.elapsed() < RESOLVED_RETENTION,
            None => true,
        });
    }
}

#[cfg(test)]
#[path = "approvals_tests.rs"]
mod tests;
