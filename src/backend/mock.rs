use super::{BackendError, GenerationBackend};
use crate::models::VideoResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Stand-in for the GPU tool: waits a fixed time and returns the same video every call
#[derive(Debug, Clone)]
pub struct MockBackend {
    delay: Duration,
    video_url: String,
    message: String,
}

impl MockBackend {
    pub fn new(delay: Duration, video_url: String, message: String) -> Self {
        Self {
            delay,
            video_url,
            message,
        }
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn submit(&self, _prompt: Option<&str>) -> Result<VideoResult, BackendError> {
        debug!(delay = ?self.delay, "Simulating generation");
        sleep(self.delay).await;

        Ok(VideoResult {
            video_url: self.video_url.clone(),
            message: self.message.clone(),
        })
    }
}
