pub mod comfyui;
pub mod error;
pub mod mock;

pub use comfyui::ComfyUiBackend;
pub use error::BackendError;
pub use mock::MockBackend;

use crate::config::{BACKEND_COMFYUI, BACKEND_MOCK, Config};
use crate::models::VideoResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// A tool that turns a prompt into a video
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn submit(&self, prompt: Option<&str>) -> Result<VideoResult, BackendError>;
}

/// Build the backend selected by `config.backend`
pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn GenerationBackend>> {
    let backend: Arc<dyn GenerationBackend> = match config.backend.as_str() {
        BACKEND_MOCK => {
            info!(
                delay_ms = config.simulated_delay_ms,
                "Using mock generation backend"
            );
            Arc::new(MockBackend::new(
                config.simulated_delay(),
                config.mock_video_url.clone(),
                config.message.clone(),
            ))
        }
        BACKEND_COMFYUI => {
            info!(backend_url = %config.backend_url, "Using ComfyUI generation backend");
            Arc::new(ComfyUiBackend::from_config(config)?)
        }
        backend => {
            return Err(anyhow::anyhow!(
                "Unsupported generation backend: {backend}. Use '{BACKEND_MOCK}' or '{BACKEND_COMFYUI}'"
            ));
        }
    };
    Ok(backend)
}
