use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::hub::Hub;

use super::logging::log_requests;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
}

pub struct ArcanumServer {
    router: Router,
}

impl ArcanumServer {
    pub fn new(hub: Arc<Hub>) -> Self {
        let state = AppState { hub };

        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

        let router = Router::new()
            .route("/ws", get(ws_upgrade))
            .route("/healthz", get(healthz))
            .layer(middleware::from_fn(log_requests))
            .layer(cors)
            .with_state(state);

        Self { router }
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(16 * 1024).on_upgrade(move |socket| async move {
        state.hub.accept(socket);
    })
}
