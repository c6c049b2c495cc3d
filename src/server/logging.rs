use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

const LOG_TARGET: &str = "server::http";

/// Logs incoming HTTP requests and their responses. The `/ws` upgrade
/// itself only shows up here as the initial 101; traffic after that is
/// logged by `session`, not this middleware.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    tracing::info!(target: LOG_TARGET, %method, %path, "incoming request");
    let start = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        target: LOG_TARGET,
        %method,
        %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "request completed"
    );
    response
}
