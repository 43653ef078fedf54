// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The central timeout sweeper. One task scans all sessions; individual
//! per-session timers do not exist.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::SessionManager;

/// Run the sweep loop until shutdown.
pub async fn run_sweeper(manager: Arc<SessionManager>, shutdown: CancellationToken) {
    let interval = manager.check_interval();
    info!(interval_ms = interval.as_millis() as u64, "session sweeper started");
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("session sweeper shutting down");
                return;
            }
            _ = ticker.tick() => {}
        }

        let expired = manager.sweep_once();
        if expired > 0 {
            debug!(expired, "sweeper expired idle sessions");
        }
    }
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod tests;
