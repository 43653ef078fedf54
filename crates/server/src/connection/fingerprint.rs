// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable client fingerprints for reconnection matching.

use sha2::{Digest, Sha256};

/// Connection metadata extracted at upgrade time.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub host: Option<String>,
    pub origin: Option<String>,
    pub protocol: Option<String>,
    pub device_id: Option<String>,
}

/// Derive the fingerprint: `device:<id>` when a device id is present, else
/// `ua:<hash>` over the user agent (falling back to the remote address).
pub fn fingerprint(info: &ClientInfo) -> String {
    if let Some(device_id) = info.device_id.as_deref() {
        return device_fingerprint(device_id);
    }
    let basis = info
        .user_agent
        .as_deref()
        .or(info.remote_addr.as_deref())
        .unwrap_or("unknown");
    format!("ua:{}", short_hash(basis))
}

/// Fingerprint for an explicitly registered device id.
pub fn device_fingerprint(device_id: &str) -> String {
    format!("device:{device_id}")
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
#[path = "fingerprint_tests.rs"]
mod tests;
