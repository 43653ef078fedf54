// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket upgrade handler and per-connection event loop.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use crate::connection::ClientInfo;
use crate::error::ErrorCode;
use crate::transport::ws_msg::{parse_inbound, Envelope, OutboundKind};

use super::Store;

/// WebSocket upgrade handler: collect client metadata, then hand off to the
/// connection loop.
pub async fn ws_handler(
    State(state): State<Arc<Store>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let info = client_info(&headers, addr);
    ws.on_upgrade(move |socket| handle_connection(state, socket, info))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

fn client_info(headers: &HeaderMap, addr: SocketAddr) -> ClientInfo {
    ClientInfo {
        remote_addr: Some(addr.to_string()),
        user_agent: header(headers, "user-agent"),
        host: header(headers, "host"),
        origin: header(headers, "origin"),
        protocol: header(headers, "sec-websocket-protocol"),
        device_id: header(headers, "x-device-id"),
    }
}

/// Per-connection loop: pump queued outbound envelopes and handle inbound
/// frames until either side goes away.
async fn handle_connection(state: Arc<Store>, socket: WebSocket, info: ClientInfo) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Envelope>(256);

    let outcome = state.connections.register(info, out_tx);
    let client = outcome.client;
    debug!(client = %client.id, "websocket connected");

    // Greet the client with its identity and restored subscriptions.
    let welcome = Envelope::event(
        OutboundKind::Welcome,
        json!({
            "clientId": client.id,
            "isReconnection": outcome.is_reconnection,
            "previousClientId": outcome.previous_client_id,
            "restoredSessions": outcome.restored_sessions,
        }),
    );
    if send_json(&mut ws_tx, &welcome).await.is_err() {
        state.connections.disconnect(&client.id);
        return;
    }

    // Replay any backlog held for restored subscriptions, oldest first.
    for session_id in &outcome.restored_sessions {
        for message in state.orchestrator.queue.drain(session_id) {
            if send_json(&mut ws_tx, &message).await.is_err() {
                state.connections.disconnect(&client.id);
                return;
            }
        }
    }

    loop {
        tokio::select! {
            _ = state.transport_close.cancelled() => break,

            outbound = out_rx.recv() => {
                let Some(envelope) = outbound else { break };
                if send_json(&mut ws_tx, &envelope).await.is_err() {
                    break;
                }
            }

            inbound = ws_rx.next() => {
                let message = match inbound {
                    Some(Ok(m)) => m,
                    Some(Err(_)) | None => break,
                };
                match message {
                    Message::Text(text) => {
                        state.connections.mark_alive(&client.id);
                        // Ingress stops at shutdown; the connection stays up
                        // to deliver the remaining cleanup events.
                        if state.shutdown.is_cancelled() {
                            let reply = Envelope::error(
                                None,
                                ErrorCode::Internal,
                                "server is shutting down",
                            );
                            if send_json(&mut ws_tx, &reply).await.is_err() {
                                break;
                            }
                            continue;
                        }
                        let inbound = match parse_inbound(&text) {
                            Ok(inbound) => inbound,
                            Err(err) => {
                                let reply = Envelope::from_operation_error(None, &err);
                                if send_json(&mut ws_tx, &reply).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };
                        if let Some(reply) =
                            state.orchestrator.handle_message(&client, inbound).await
                        {
                            if send_json(&mut ws_tx, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Ping(payload) => {
                        state.connections.mark_alive(&client.id);
                        if ws_tx.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Pong(_) => {
                        state.connections.mark_alive(&client.id);
                    }
                    Message::Close(_) => break,
                    Message::Binary(_) => {}
                }
            }
        }
    }

    state.connections.disconnect(&client.id);
    debug!(client = %client.id, "websocket disconnected");
}

/// Send a JSON-serialized envelope over the WebSocket.
async fn send_json<S>(tx: &mut S, envelope: &Envelope) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = match serde_json::to_string(envelope) {
        Ok(t) => t,
        Err(_) => return Err(()),
    };
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}
