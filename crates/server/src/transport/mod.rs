// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/WebSocket surface: shared state, router construction, and the
//! per-connection WebSocket loop.

pub mod http;
pub mod ws;
pub mod ws_msg;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::connection::ConnectionManager;
use crate::orchestrator::Orchestrator;
use crate::session::SessionManager;

/// Shared application state passed to handlers via the axum `State`
/// extractor.
pub struct Store {
    pub orchestrator: Arc<Orchestrator>,
    pub connections: Arc<ConnectionManager>,
    pub sessions: Arc<SessionManager>,
    /// Stops ingress: no new connections, no new prompts.
    pub shutdown: CancellationToken,
    /// Closes live transports. Cancelled only after the session manager has
    /// shut down, so clients observe the final cleanup events.
    pub transport_close: CancellationToken,
    pub started_at: Instant,
}

/// Build the axum router with the WebSocket and health routes.
pub fn build_router(state: Arc<Store>) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
