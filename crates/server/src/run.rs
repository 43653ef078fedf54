// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level wiring — shared by `main` and the end-to-end specs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::orchestrator::Orchestrator;
use crate::process::ProcessMonitor;
use crate::push::{LogNotifier, PushNotifier};
use crate::queue::MessageQueue;
use crate::security::CommandGate;
use crate::session::{sweep, MemoryPersistence, SessionManager, SessionPersistence};
use crate::transport::{build_router, Store};

/// Initialize the tracing subscriber from the configured format and level.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_format == "json" {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

/// Everything the server runs on, built but not yet serving.
pub struct Prepared {
    pub store: Arc<Store>,
    /// Stops ingress and starts the ordered shutdown sequence.
    pub shutdown: CancellationToken,
    /// Fires once transports may close (sessions already reaped).
    pub transport_close: CancellationToken,
}

/// How long transports stay open after the session manager shuts down, so
/// the final cleanup events reach connected clients.
const SHUTDOWN_FLUSH_GRACE: Duration = Duration::from_millis(250);

/// Assemble all components and start the background loops.
pub fn prepare(config: &Config) -> Prepared {
    let shutdown = CancellationToken::new();
    let transport_close = CancellationToken::new();
    let (events_tx, _) = broadcast::channel(1024);

    let queue = Arc::new(MessageQueue::new(config.queue_limits()));
    let persistence: Arc<dyn SessionPersistence> =
        Arc::new(MemoryPersistence::new(config.history_retention()));
    let sessions = Arc::new(SessionManager::new(
        config.session_limits(),
        persistence,
        Arc::clone(&queue),
        events_tx.clone(),
    ));
    let connections = Arc::new(ConnectionManager::new(
        config.reconnection_window(),
        config.history_retention(),
        config.health_check_interval(),
    ));
    let push: Arc<dyn PushNotifier> = Arc::new(LogNotifier);
    let broadcaster = Arc::new(Broadcaster::new(
        Arc::clone(&connections),
        Arc::clone(&queue),
        push,
    ));
    let security = Arc::new(CommandGate::new(config.security_config()));
    let orchestrator = Arc::new(
        Orchestrator::new(
            Arc::clone(&sessions),
            Arc::clone(&connections),
            Arc::clone(&broadcaster),
            security,
            Arc::clone(&queue),
            config.runner_config(),
            events_tx.clone(),
        )
        .with_max_concurrent(config.max_concurrent_sessions),
    );

    // Background loops: broadcaster fan-out, timeout sweeper, client
    // liveness, subprocess liveness. The broadcaster outlives ingress — it
    // runs until transports close so shutdown cleanup events still fan out.
    tokio::spawn(Arc::clone(&broadcaster).run(events_tx.subscribe(), transport_close.clone()));
    tokio::spawn(sweep::run_sweeper(Arc::clone(&sessions), shutdown.clone()));
    tokio::spawn(Arc::clone(&connections).run_health_checks(shutdown.clone()));

    let monitor_sessions = Arc::clone(&sessions);
    let monitor = ProcessMonitor::new(Arc::new(move || monitor_sessions.pid_snapshot()))
        .with_poll_interval(Duration::from_secs(5));
    let (dead_tx, mut dead_rx) = mpsc::channel::<String>(32);
    tokio::spawn(monitor.run(dead_tx, shutdown.clone()));
    let reaper_sessions = Arc::clone(&sessions);
    tokio::spawn(async move {
        while let Some(session_id) = dead_rx.recv().await {
            reaper_sessions.cleanup_dead_session(&session_id);
        }
    });

    let store = Arc::new(Store {
        orchestrator,
        connections,
        sessions: Arc::clone(&sessions),
        shutdown: shutdown.clone(),
        transport_close: transport_close.clone(),
        started_at: Instant::now(),
    });

    // Ordered shutdown: stop ingress, reap sessions while transports can
    // still observe the cleanup events, then close transports.
    let seq_shutdown = shutdown.clone();
    let seq_transport_close = transport_close.clone();
    tokio::spawn(async move {
        seq_shutdown.cancelled().await;
        sessions.shutdown();
        tokio::time::sleep(SHUTDOWN_FLUSH_GRACE).await;
        seq_transport_close.cancel();
    });

    Prepared { store, shutdown, transport_close }
}

/// Run the server until SIGINT/SIGTERM.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let prepared = prepare(&config);
    let store = Arc::clone(&prepared.store);
    let shutdown = prepared.shutdown.clone();

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "companion listening");

    // OS signals cancel the root token.
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let term = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => error!("failed to install SIGTERM handler: {e}"),
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term => {}
        }
        info!("shutdown signal received");
        signal_shutdown.cancel();
    });

    // Graceful shutdown stops accepting new connections at the signal; the
    // live WebSocket loops exit on `transport_close`, after the sequencer in
    // `prepare` has reaped sessions and flushed their cleanup events.
    let router = build_router(Arc::clone(&store));
    let serve_shutdown = shutdown.clone();
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
    .await?;

    // Safety net for exit paths that never fired the sequencer; a no-op
    // after an ordered shutdown. Errors here are logged, never propagated.
    store.sessions.shutdown();
    info!("companion stopped");
    Ok(())
}
