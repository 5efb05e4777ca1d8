use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Backend rejected the workflow: {0}")]
    Rejected(String),

    #[error("Generation failed: {0}")]
    ExecutionFailed(String),

    #[error("No video output for prompt {0}")]
    NoOutput(String),

    #[error("Invalid backend URL {0}")]
    InvalidUrl(String),

    #[error("Invalid workflow: {0}")]
    Workflow(String),
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        // Failures surface as a bare 500, the same as any unhandled handler error
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
