use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::auth::{Authority, JwksAuthority, NullAuthority};
use crate::config::{RuleConfig, ServerArgs};
use crate::db;
use crate::hub::Hub;
use crate::matchmaker::Matchmaker;
use crate::persistence::{NoopPersistenceSink, PersistenceSink, SeaOrmPersistenceSink};
use crate::powerups::PowerUpRegistry;

use super::routes::ArcanumServer;

const LOG_TARGET: &str = "server::bootstrap";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run_server(args: ServerArgs) -> Result<()> {
    let bind: SocketAddr = args.bind.parse().with_context(|| format!("invalid bind address {}", args.bind))?;
    let rules = RuleConfig::from(&args);

    let persistence: Arc<dyn PersistenceSink> = match &args.database_url {
        Some(url) => {
            let conn = db::connect(url).await.context("failed to connect to database")?;
            Arc::new(SeaOrmPersistenceSink::new(conn))
        }
        None => {
            warn!(target: LOG_TARGET, "DATABASE_URL unset, using no-op persistence sink");
            Arc::new(NoopPersistenceSink)
        }
    };

    let auth_required = args.auth_jwks_url.is_some();
    let authority: Arc<dyn Authority> = match &args.auth_jwks_url {
        Some(url) => Arc::new(JwksAuthority::new(url.clone())),
        None => {
            warn!(target: LOG_TARGET, "AUTH_JWKS_URL unset, using NullAuthority (local development only)");
            Arc::new(NullAuthority)
        }
    };

    let registry = Arc::new(PowerUpRegistry::default());
    let matchmaker = Matchmaker::new(rules, registry, persistence);
    let hub = Hub::new(matchmaker, authority, auth_required);

    let router = ArcanumServer::new(hub.clone()).into_router();
    let listener = TcpListener::bind(bind).await.with_context(|| format!("failed to bind {bind}"))?;
    let local_addr = listener.local_addr()?;
    info!(target: LOG_TARGET, %local_addr, "arcanum server listening");

    let shutdown_hub = hub.clone();
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_hub.begin_shutdown();
            shutdown_hub.wait_for_drain(DRAIN_TIMEOUT).await;
        })
        .await
        .context("server exited with error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: LOG_TARGET, %err, "failed to install ctrl-c handler");
    }
    info!(target: LOG_TARGET, "shutdown signal received, draining sessions");
}
