// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection manager: client records, reconnection matching by device
//! fingerprint, and liveness pings.

pub mod fingerprint;
pub mod history;

pub use fingerprint::{device_fingerprint, ClientInfo};
pub use history::{ConnectionHistory, ReconnectMatch};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::transport::ws_msg::{Envelope, OutboundKind};

/// One connected client.
pub struct ClientEntry {
    pub id: String,
    pub info: ClientInfo,
    pub connected_at: Instant,
    fingerprint: RwLock<String>,
    tx: mpsc::Sender<Envelope>,
    sessions: RwLock<HashSet<String>>,
    is_alive: AtomicBool,
    last_activity: Mutex<Instant>,
}

impl ClientEntry {
    pub fn fingerprint(&self) -> String {
        match self.fingerprint.read() {
            Ok(fp) => fp.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sessions(&self) -> HashSet<String> {
        match self.sessions.read() {
            Ok(set) => set.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_subscribed(&self, session_id: &str) -> bool {
        match self.sessions.read() {
            Ok(set) => set.contains(session_id),
            Err(poisoned) => poisoned.into_inner().contains(session_id),
        }
    }

    /// Whether the outbound channel can still reach the transport.
    pub fn is_ready(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn is_alive(&self) -> bool {
        self.is_alive.load(Ordering::Acquire)
    }

    pub fn mark_alive(&self, alive: bool) {
        self.is_alive.store(alive, Ordering::Release);
    }

    pub fn touch(&self) {
        if let Ok(mut at) = self.last_activity.lock() {
            *at = Instant::now();
        }
    }

    pub fn last_activity(&self) -> Instant {
        match self.last_activity.lock() {
            Ok(at) => *at,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Push a message toward the transport. False when the client is gone or
    /// its channel is saturated; true sends also update `last_activity`.
    pub fn try_send(&self, message: Envelope) -> bool {
        if self.tx.try_send(message).is_ok() {
            self.touch();
            true
        } else {
            false
        }
    }
}

/// What a new connection learns about itself.
pub struct RegisterOutcome {
    pub client: Arc<ClientEntry>,
    pub is_reconnection: bool,
    pub previous_client_id: Option<String>,
    pub restored_sessions: Vec<String>,
}

/// Owns all client records and their reconnection history.
pub struct ConnectionManager {
    clients: RwLock<HashMap<String, Arc<ClientEntry>>>,
    history: ConnectionHistory,
    health_interval: Duration,
}

impl ConnectionManager {
    pub fn new(
        reconnection_window: Duration,
        history_retention: Duration,
        health_interval: Duration,
    ) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            history: ConnectionHistory::new(reconnection_window, history_retention),
            health_interval,
        }
    }

    /// Create a client record for a fresh connection, restoring prior
    /// subscriptions when the fingerprint matches recent history.
    pub fn register(&self, info: ClientInfo, tx: mpsc::Sender<Envelope>) -> RegisterOutcome {
        let id = Uuid::new_v4().to_string();
        let fp = fingerprint::fingerprint(&info);
        let matched = self.history.lookup(&fp);

        let (is_reconnection, previous_client_id, restored) = match matched {
            Some(m) => (m.is_reconnection, Some(m.previous_client_id), m.session_ids),
            None => (false, None, HashSet::new()),
        };

        let client = Arc::new(ClientEntry {
            id: id.clone(),
            info,
            connected_at: Instant::now(),
            fingerprint: RwLock::new(fp),
            tx,
            sessions: RwLock::new(restored.clone()),
            is_alive: AtomicBool::new(true),
            last_activity: Mutex::new(Instant::now()),
        });

        self.write_clients().insert(id, Arc::clone(&client));

        let mut restored_sessions: Vec<String> = restored.into_iter().collect();
        restored_sessions.sort();

        debug!(
            client = %client.id,
            reconnection = is_reconnection,
            restored = restored_sessions.len(),
            "client registered"
        );

        RegisterOutcome { client, is_reconnection, previous_client_id, restored_sessions }
    }

    /// Remove a client, recording its state for reconnection matching.
    pub fn disconnect(&self, client_id: &str) {
        let Some(client) = self.write_clients().remove(client_id) else {
            return;
        };
        self.history.record_disconnect(&client.fingerprint(), &client.id, client.sessions());
        debug!(client = client_id, "client disconnected");
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<ClientEntry>> {
        self.read_clients().get(client_id).cloned()
    }

    /// Add a session to a client's subscription set.
    pub fn subscribe(&self, client_id: &str, session_id: &str) -> bool {
        let Some(client) = self.get(client_id) else {
            return false;
        };
        match client.sessions.write() {
            Ok(mut set) => set.insert(session_id.to_owned()),
            Err(poisoned) => poisoned.into_inner().insert(session_id.to_owned()),
        };
        client.touch();
        true
    }

    /// Every connected client subscribed to `session_id`.
    pub fn subscribers_of(&self, session_id: &str) -> Vec<Arc<ClientEntry>> {
        self.read_clients()
            .values()
            .filter(|c| c.is_subscribed(session_id))
            .cloned()
            .collect()
    }

    /// Re-key a client under an explicit device id fingerprint.
    pub fn register_device(&self, client_id: &str, device_id: &str) -> Option<String> {
        let client = self.get(client_id)?;
        let fp = device_fingerprint(device_id);
        match client.fingerprint.write() {
            Ok(mut slot) => *slot = fp.clone(),
            Err(poisoned) => *poisoned.into_inner() = fp.clone(),
        }
        client.touch();
        Some(fp)
    }

    pub fn mark_alive(&self, client_id: &str) {
        if let Some(client) = self.get(client_id) {
            client.mark_alive(true);
            client.touch();
        }
    }

    pub fn client_count(&self) -> usize {
        self.read_clients().len()
    }

    pub fn history(&self) -> &ConnectionHistory {
        &self.history
    }

    /// Liveness loop: each pass drops clients that never answered the prior
    /// ping, then marks the rest unproven and pings them.
    pub async fn run_health_checks(self: Arc<Self>, shutdown: CancellationToken) {
        info!("connection health checker started");
        let mut interval = tokio::time::interval(self.health_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("connection health checker shutting down");
                    return;
                }
                _ = interval.tick() => {}
            }

            let snapshot: Vec<Arc<ClientEntry>> =
                self.read_clients().values().cloned().collect();

            for client in snapshot {
                if !client.is_alive() || !client.is_ready() {
                    debug!(client = %client.id, "dropping unresponsive client");
                    self.disconnect(&client.id);
                    continue;
                }
                client.mark_alive(false);
                client.try_send(Envelope::event(OutboundKind::Ping, Value::Null));
            }

            self.history.cleanup();
        }
    }

    fn read_clients(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ClientEntry>>> {
        match self.clients.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_clients(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<ClientEntry>>> {
        match self.clients.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
