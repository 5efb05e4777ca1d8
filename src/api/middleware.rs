use axum::http::StatusCode;
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tokio::time::Instant;
use tracing::{Level, error, warn};

/// Log level for a finished request, `None` when it succeeded
pub fn failure_level(status: StatusCode) -> Option<Level> {
    if status.is_server_error() {
        Some(Level::ERROR)
    } else if status.is_client_error() {
        Some(Level::WARN)
    } else {
        None
    }
}

/// Logs rejected and failed requests along with how long they took
///
/// Generation requests can run for seconds, so the elapsed time tells a slow
/// backend failure apart from an immediate rejection.
pub async fn log_request_errors(req: Request<Body>, next: Next) -> Response {
    let uri = req.uri().clone();
    let method = req.method().clone();
    let started = Instant::now();

    let response = next.run(req).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if let Some(level) = failure_level(status) {
        if level == Level::ERROR {
            error!(%method, %uri, %status, elapsed_ms, "Request failed");
        } else {
            warn!(%method, %uri, %status, elapsed_ms, "Rejected request");
        }
    }

    response
}
