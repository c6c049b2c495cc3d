//! Connection registry and shutdown draining (C6's lifecycle half).
//!
//! A `CancellationToken` gates new connections before spawning, and an
//! active-connection counter lets graceful shutdown wait for in-flight
//! sessions to close on their own instead of dropping sockets out from
//! under players mid-match.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocket;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::Authority;
use crate::matchmaker::Matchmaker;
use crate::session;

pub const LOG_TARGET: &str = "hub";

pub struct Hub {
    matchmaker: Arc<Matchmaker>,
    authority: Arc<dyn Authority>,
    auth_required: bool,
    shutdown: CancellationToken,
    active_connections: Arc<AtomicUsize>,
}

impl Hub {
    pub fn new(matchmaker: Arc<Matchmaker>, authority: Arc<dyn Authority>, auth_required: bool) -> Arc<Self> {
        Arc::new(Self {
            matchmaker,
            authority,
            auth_required,
            shutdown: CancellationToken::new(),
            active_connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accepts one upgraded socket. A no-op once shutdown has begun, so
    /// the hub rejects new players without disturbing matches already
    /// in flight.
    pub fn accept(self: &Arc<Self>, socket: WebSocket) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let hub = self.clone();
        hub.active_connections.fetch_add(1, Ordering::SeqCst);
        crate::tokio_tools::spawn_named_task("session", async move {
            session::handle_connection(socket, hub.matchmaker.clone(), hub.authority.clone(), hub.auth_required).await;
            hub.active_connections.fetch_sub(1, Ordering::SeqCst);
        });
    }

    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Polls until every session task has exited or `timeout` elapses,
    /// whichever comes first.
    pub async fn wait_for_drain(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut ticker = tokio::time::interval(Duration::from_millis(200));
        loop {
            let remaining = self.active_connections.load(Ordering::SeqCst);
            if remaining == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                info!(target: LOG_TARGET, remaining, "drain timeout reached with sessions still open");
                break;
            }
            ticker.tick().await;
        }
    }
}
