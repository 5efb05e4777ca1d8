use super::ApiError;
use crate::AppState;
use crate::models::{GenerationRequest, GenerationResult};
use axum::extract::Extension;
use axum::response::Json;
use serde_json::Value as JsonValue;
use tracing::{error, info};

/// `POST /generate`
///
/// The prompt is logged and handed to the backend as-is; no field is validated.
/// Bodies that are not JSON are rejected by the `Json` extractor, and JSON
/// that is not an object fails as a 500.
#[axum::debug_handler]
pub async fn generate(
    Extension(state): Extension<AppState>,
    Json(body): Json<JsonValue>,
) -> Result<Json<GenerationResult>, ApiError> {
    let request = GenerationRequest::from_body(body).ok_or(ApiError::NotAnObject)?;
    let prompt = request.prompt_text();
    info!(prompt = ?prompt, "Received generation request");

    let video = state
        .backend
        .submit(prompt.as_deref())
        .await
        .inspect_err(|error| error!(backend = state.backend.name(), %error, "Generation failed"))?;

    Ok(Json(video.into()))
}

pub async fn health() -> &'static str {
    "ok"
}
