// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal HTTP surface: the health endpoint used by harnesses and probes.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::Store;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
    pub connected_clients: usize,
    pub uptime_secs: u64,
}

pub async fn health(State(state): State<Arc<Store>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "running",
        active_sessions: state.sessions.session_count(),
        connected_clients: state.connections.client_count(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
