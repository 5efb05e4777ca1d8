use super::{BackendError, GenerationBackend};
use crate::config::Config;
use crate::models::VideoResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

/// Placeholder replaced with the request prompt inside workflow string values
pub const PROMPT_PLACEHOLDER: &str = "{{prompt}}";

/// Output kinds checked in order when looking for the produced file
const OUTPUT_KINDS: [&str; 3] = ["gifs", "videos", "images"];

/// Minimal AnimateDiff text-to-video graph in ComfyUI API format
const DEFAULT_WORKFLOW: &str = r#"{
  "1": {
    "class_type": "CheckpointLoaderSimple",
    "inputs": { "ckpt_name": "sd15.safetensors" }
  },
  "2": {
    "class_type": "ADE_AnimateDiffLoaderGen1",
    "inputs": { "model": ["1", 0], "model_name": "mm_sd_v15_v2.ckpt", "beta_schedule": "autoselect" }
  },
  "3": {
    "class_type": "CLIPTextEncode",
    "inputs": { "clip": ["1", 1], "text": "{{prompt}}" }
  },
  "4": {
    "class_type": "CLIPTextEncode",
    "inputs": { "clip": ["1", 1], "text": "blurry, low quality, watermark" }
  },
  "5": {
    "class_type": "EmptyLatentImage",
    "inputs": { "width": 512, "height": 512, "batch_size": 16 }
  },
  "6": {
    "class_type": "KSampler",
    "inputs": {
      "model": ["2", 0], "positive": ["3", 0], "negative": ["4", 0], "latent_image": ["5", 0],
      "seed": 0, "steps": 20, "cfg": 7.5, "sampler_name": "euler", "scheduler": "normal", "denoise": 1.0
    }
  },
  "7": {
    "class_type": "VAEDecode",
    "inputs": { "samples": ["6", 0], "vae": ["1", 2] }
  },
  "8": {
    "class_type": "VHS_VideoCombine",
    "inputs": {
      "images": ["7", 0], "frame_rate": 8, "loop_count": 0, "filename_prefix": "bridge",
      "format": "video/h264-mp4", "pingpong": false, "save_output": true
    }
  }
}"#;

/// Queues workflows on a ComfyUI server and waits for the rendered file
pub struct ComfyUiBackend {
    client: reqwest::Client,
    base_url: Url,
    public_base_url: Url,
    workflow: JsonValue,
    poll_interval: Duration,
    message: String,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    prompt_id: Option<String>,
    #[serde(default)]
    node_errors: JsonValue,
}

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    #[serde(default)]
    outputs: HashMap<String, HashMap<String, JsonValue>>,
    status: Option<HistoryStatus>,
}

#[derive(Debug, Deserialize)]
struct HistoryStatus {
    status_str: Option<String>,
    #[serde(default)]
    messages: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputFile {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_output_type")]
    pub kind: String,
}

fn default_output_type() -> String {
    "output".to_string()
}

impl ComfyUiBackend {
    pub fn new(
        base_url: &str,
        public_base_url: Option<&str>,
        workflow: JsonValue,
        poll_interval: Duration,
        message: String,
    ) -> Result<Self, BackendError> {
        let base_url = parse_base(base_url)?;
        let public_base_url = match public_base_url {
            Some(url) => parse_base(url)?,
            None => base_url.clone(),
        };

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            public_base_url,
            workflow,
            poll_interval,
            message,
            client_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        let workflow = match &config.workflow {
            Some(path) => load_workflow(Path::new(path))?,
            None => default_workflow()?,
        };

        Self::new(
            &config.backend_url,
            config.public_base_url.as_deref(),
            workflow,
            config.poll_interval(),
            config.message.clone(),
        )
    }

    async fn queue_prompt(&self, workflow: JsonValue) -> Result<String, BackendError> {
        let url = endpoint(&self.base_url, "prompt")?;
        let response = self
            .client
            .post(url)
            .json(&json!({
                "prompt": workflow,
                "client_id": self.client_id,
            }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Rejected(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let queued: QueueResponse = response.json().await?;
        if has_node_errors(&queued.node_errors) {
            return Err(BackendError::Rejected(queued.node_errors.to_string()));
        }

        queued
            .prompt_id
            .ok_or_else(|| BackendError::Rejected("response carried no prompt_id".into()))
    }

    /// Poll history until the prompt shows up. There is no deadline.
    async fn wait_for_history(&self, prompt_id: &str) -> Result<HistoryEntry, BackendError> {
        let url = endpoint(&self.base_url, &format!("history/{prompt_id}"))?;

        loop {
            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(BackendError::Status { status, body });
            }

            let mut history: HashMap<String, HistoryEntry> = response.json().await?;
            if let Some(entry) = history.remove(prompt_id) {
                return Ok(entry);
            }

            debug!(prompt_id, "Prompt still running");
            sleep(self.poll_interval).await;
        }
    }

    /// Public URL of a produced file, served by ComfyUI's `/view`
    pub fn view_url(&self, file: &OutputFile) -> Result<String, BackendError> {
        let mut url = endpoint(&self.public_base_url, "view")?;
        url.query_pairs_mut()
            .append_pair("filename", &file.filename)
            .append_pair("subfolder", &file.subfolder)
            .append_pair("type", &file.kind);
        Ok(url.into())
    }
}

#[async_trait]
impl GenerationBackend for ComfyUiBackend {
    fn name(&self) -> &'static str {
        "comfyui"
    }

    async fn submit(&self, prompt: Option<&str>) -> Result<VideoResult, BackendError> {
        let workflow = substitute_prompt(&self.workflow, prompt.unwrap_or_default());
        let prompt_id = self.queue_prompt(workflow).await?;
        info!(prompt_id, "Workflow queued");

        let entry = self.wait_for_history(&prompt_id).await?;
        if let Some(status) = &entry.status
            && status.status_str.as_deref() == Some("error")
        {
            warn!(prompt_id, messages = %status.messages, "Workflow execution failed");
            return Err(BackendError::ExecutionFailed(status.messages.to_string()));
        }

        let Some(file) = first_output(&entry) else {
            return Err(BackendError::NoOutput(prompt_id));
        };
        info!(prompt_id, filename = %file.filename, "Workflow finished");

        Ok(VideoResult {
            video_url: self.view_url(&file)?,
            message: self.message.clone(),
        })
    }
}

pub fn default_workflow() -> Result<JsonValue, BackendError> {
    serde_json::from_str(DEFAULT_WORKFLOW)
        .map_err(|error| BackendError::Workflow(format!("built-in template: {error}")))
}

pub fn load_workflow(path: &Path) -> Result<JsonValue, BackendError> {
    let content = std::fs::read_to_string(path)
        .map_err(|error| BackendError::Workflow(format!("{}: {error}", path.display())))?;
    let workflow: JsonValue = serde_json::from_str(&content)
        .map_err(|error| BackendError::Workflow(format!("{}: {error}", path.display())))?;
    if !workflow.is_object() {
        return Err(BackendError::Workflow(format!(
            "{}: expected a JSON object of nodes",
            path.display()
        )));
    }
    Ok(workflow)
}

/// Replace every `{{prompt}}` inside string values of the workflow
pub fn substitute_prompt(workflow: &JsonValue, prompt: &str) -> JsonValue {
    match workflow {
        JsonValue::String(s) => JsonValue::String(s.replace(PROMPT_PLACEHOLDER, prompt)),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| substitute_prompt(item, prompt))
                .collect(),
        ),
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_prompt(v, prompt)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn first_output(entry: &HistoryEntry) -> Option<OutputFile> {
    // Node ids are numeric strings, order them numerically
    let mut node_ids: Vec<&String> = entry.outputs.keys().collect();
    let numeric = |id: &str| id.parse::<u64>().unwrap_or(u64::MAX);
    node_ids.sort_by(|a, b| (numeric(a), a).cmp(&(numeric(b), b)));

    OUTPUT_KINDS.iter().find_map(|kind| {
        node_ids.iter().find_map(|id| {
            let files = entry.outputs.get(*id)?.get(*kind)?;
            serde_json::from_value::<Vec<OutputFile>>(files.clone())
                .ok()?
                .into_iter()
                .next()
        })
    })
}

fn has_node_errors(node_errors: &JsonValue) -> bool {
    match node_errors {
        JsonValue::Object(map) => !map.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        _ => false,
    }
}

fn parse_base(url: &str) -> Result<Url, BackendError> {
    let mut url = Url::parse(url)
        .map_err(|error| BackendError::InvalidUrl(format!("{url}: {error}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn endpoint(base: &Url, path: &str) -> Result<Url, BackendError> {
    base.join(path)
        .map_err(|error| BackendError::InvalidUrl(format!("{base}{path}: {error}")))
}
