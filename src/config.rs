use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const BACKEND_MOCK: &str = "mock";
pub const BACKEND_COMFYUI: &str = "comfyui";

pub const TUNNEL_NGROK: &str = "ngrok";
pub const TUNNEL_NONE: &str = "none";

/// Bridge configuration, loaded from CLI and optionally merged with a TOML file
///
/// Example configuration file content
/// # Video Bridge Configuration
///
/// # Server configuration
/// host = "127.0.0.1"
/// listen_on_port = 5000
///
/// # Generation backend: "mock" or "comfyui"
/// backend = "comfyui"
/// backend_url = "http://127.0.0.1:8188"
/// public_base_url = "https://files.example.com"  # Optional: base for returned video URLs
/// workflow = "./workflow_api.json"               # Optional: `{{prompt}}` is substituted
/// poll_interval_ms = 1000
///
/// # Mock backend
/// simulated_delay_ms = 5000
/// mock_video_url = "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4"
/// message = "Generated on College Server"
///
/// # Tunnel: "ngrok" or "none"
/// tunnel = "ngrok"
/// ngrok_bin = "ngrok"
/// ngrok_api_url = "http://127.0.0.1:4040"
/// tunnel_timeout_secs = 15
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Address to bind the HTTP server on
    #[arg(long, default_value = "127.0.0.1")]
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Configuration file path (merged under CLI arguments)
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Generation backend: mock or comfyui
    #[arg(short, long, default_value = "mock")]
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Base URL of the local generation tool
    #[arg(long, default_value = "http://127.0.0.1:8188")]
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Base URL used when building returned video URLs (defaults to backend-url)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,

    /// Workflow template JSON, `{{prompt}}` placeholders are replaced per request
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,

    /// Interval between history polls against the generation tool
    #[arg(long, default_value_t = 1000)]
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Simulated generation time of the mock backend
    #[arg(short = 'd', long, default_value_t = 5000)]
    #[serde(default = "default_simulated_delay_ms")]
    pub simulated_delay_ms: u64,

    /// Video URL returned by the mock backend
    #[arg(long, default_value = DEFAULT_MOCK_VIDEO_URL)]
    #[serde(default = "default_mock_video_url")]
    pub mock_video_url: String,

    /// Message attached to every successful result
    #[arg(short, long, default_value = DEFAULT_MESSAGE)]
    #[serde(default = "default_message")]
    pub message: String,

    /// Tunnel provisioner: ngrok or none
    #[arg(short, long, default_value = "ngrok")]
    #[serde(default = "default_tunnel")]
    pub tunnel: String,

    /// ngrok executable
    #[arg(long, default_value = "ngrok")]
    #[serde(default = "default_ngrok_bin")]
    pub ngrok_bin: String,

    /// ngrok local agent API
    #[arg(long, default_value = "http://127.0.0.1:4040")]
    #[serde(default = "default_ngrok_api_url")]
    pub ngrok_api_url: String,

    /// Seconds to wait for the tunnel to come up
    #[arg(long, default_value_t = 15)]
    #[serde(default = "default_tunnel_timeout_secs")]
    pub tunnel_timeout_secs: u64,
}

const DEFAULT_MOCK_VIDEO_URL: &str =
    "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4";
const DEFAULT_MESSAGE: &str = "Generated on College Server";

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            listen_on_port: default_port(),
            config: None,
            backend: default_backend(),
            backend_url: default_backend_url(),
            public_base_url: None,
            workflow: None,
            poll_interval_ms: default_poll_interval_ms(),
            simulated_delay_ms: default_simulated_delay_ms(),
            mock_video_url: default_mock_video_url(),
            message: default_message(),
            tunnel: default_tunnel(),
            ngrok_bin: default_ngrok_bin(),
            ngrok_api_url: default_ngrok_api_url(),
            tunnel_timeout_secs: default_tunnel_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Config::parse();

        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        // If CLI value is default, use file value
        if self.host == default_host() {
            self.host = file_config.host;
        }
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.backend == default_backend() {
            self.backend = file_config.backend;
        }
        if self.backend_url == default_backend_url() {
            self.backend_url = file_config.backend_url;
        }
        if self.poll_interval_ms == default_poll_interval_ms() {
            self.poll_interval_ms = file_config.poll_interval_ms;
        }
        if self.simulated_delay_ms == default_simulated_delay_ms() {
            self.simulated_delay_ms = file_config.simulated_delay_ms;
        }
        if self.mock_video_url == default_mock_video_url() {
            self.mock_video_url = file_config.mock_video_url;
        }
        if self.message == default_message() {
            self.message = file_config.message;
        }
        if self.tunnel == default_tunnel() {
            self.tunnel = file_config.tunnel;
        }
        if self.ngrok_bin == default_ngrok_bin() {
            self.ngrok_bin = file_config.ngrok_bin;
        }
        if self.ngrok_api_url == default_ngrok_api_url() {
            self.ngrok_api_url = file_config.ngrok_api_url;
        }
        if self.tunnel_timeout_secs == default_tunnel_timeout_secs() {
            self.tunnel_timeout_secs = file_config.tunnel_timeout_secs;
        }

        // For Option fields, CLI takes precedence if Some
        if self.public_base_url.is_none() {
            self.public_base_url = file_config.public_base_url;
        }
        if self.workflow.is_none() {
            self.workflow = file_config.workflow;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.backend.as_str() {
            BACKEND_MOCK => {}
            BACKEND_COMFYUI => {
                if self.poll_interval_ms == 0 {
                    return Err(anyhow::anyhow!("Poll interval must be greater than zero"));
                }
            }
            backend => {
                return Err(anyhow::anyhow!(
                    "Unsupported generation backend: {backend}. Use '{BACKEND_MOCK}' or '{BACKEND_COMFYUI}'"
                ));
            }
        }

        match self.tunnel.as_str() {
            TUNNEL_NGROK | TUNNEL_NONE => {}
            tunnel => {
                return Err(anyhow::anyhow!(
                    "Unsupported tunnel: {tunnel}. Use '{TUNNEL_NGROK}' or '{TUNNEL_NONE}'"
                ));
            }
        }

        check_http_url("Backend URL", &self.backend_url)?;
        check_http_url("Mock video URL", &self.mock_video_url)?;
        check_http_url("ngrok API URL", &self.ngrok_api_url)?;
        if let Some(public_base_url) = &self.public_base_url {
            check_http_url("Public base URL", public_base_url)?;
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.listen_on_port)
    }

    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn tunnel_timeout(&self) -> Duration {
        Duration::from_secs(self.tunnel_timeout_secs)
    }
}

fn check_http_url(name: &str, value: &str) -> anyhow::Result<()> {
    if value.is_empty() {
        return Err(anyhow::anyhow!("{name} cannot be empty"));
    }
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(anyhow::anyhow!(
            "{name} must start with http:// or https://"
        ));
    }
    Ok(())
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_backend() -> String {
    BACKEND_MOCK.to_string()
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8188".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_simulated_delay_ms() -> u64 {
    5000
}

fn default_mock_video_url() -> String {
    DEFAULT_MOCK_VIDEO_URL.to_string()
}

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

fn default_tunnel() -> String {
    TUNNEL_NGROK.to_string()
}

fn default_ngrok_bin() -> String {
    "ngrok".to_string()
}

fn default_ngrok_api_url() -> String {
    "http://127.0.0.1:4040".to_string()
}

fn default_tunnel_timeout_secs() -> u64 {
    15
}
