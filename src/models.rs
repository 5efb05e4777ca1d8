use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Cow;

/// Body of `POST /generate`
///
/// `prompt` is not validated: any JSON value is accepted, and a missing or
/// `null` value is passed through as `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(default)]
    pub prompt: Option<JsonValue>,
}

impl GenerationRequest {
    /// Read the request out of a JSON body, `None` unless the body is an object
    pub fn from_body(body: JsonValue) -> Option<Self> {
        let JsonValue::Object(mut fields) = body else {
            return None;
        };
        let prompt = fields.remove("prompt").filter(|value| !value.is_null());
        Some(Self { prompt })
    }

    /// Prompt as text; non-string values are rendered as their JSON form
    pub fn prompt_text(&self) -> Option<Cow<'_, str>> {
        match self.prompt.as_ref()? {
            JsonValue::String(text) => Some(Cow::Borrowed(text)),
            other => Some(Cow::Owned(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Success,
}

/// Response of `POST /generate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub status: GenerationStatus,
    pub video_url: String,
    pub message: String,
}

/// What a generation backend hands back for a single prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoResult {
    pub video_url: String,
    pub message: String,
}

impl From<VideoResult> for GenerationResult {
    fn from(VideoResult { video_url, message }: VideoResult) -> Self {
        Self {
            status: GenerationStatus::Success,
            video_url,
            message,
        }
    }
}
