pub mod ngrok;

pub use ngrok::NgrokProvisioner;

use crate::config::{Config, TUNNEL_NGROK, TUNNEL_NONE};
use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Child;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Failed to spawn {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Tunnel agent exited before publishing a URL ({0})")]
    AgentExited(std::process::ExitStatus),

    #[error("Tunnel agent API request failed: {0}")]
    Api(#[from] reqwest::Error),

    #[error("No public URL for port {port} after {secs}s")]
    Timeout { port: u16, secs: u64 },
}

/// A live public mapping to the local port. Dropping it tears the tunnel down.
#[derive(Debug)]
pub struct Tunnel {
    pub public_url: String,
    _agent: Option<Child>,
}

impl Tunnel {
    pub fn new(public_url: String, agent: Option<Child>) -> Self {
        Self {
            public_url,
            _agent: agent,
        }
    }
}

/// Exposes a locally bound port under a public URL
#[async_trait]
pub trait TunnelProvisioner: Send + Sync {
    async fn provision(&self, port: u16) -> Result<Option<Tunnel>, TunnelError>;
}

/// Keeps the endpoint local-only
pub struct NoTunnel;

#[async_trait]
impl TunnelProvisioner for NoTunnel {
    async fn provision(&self, _port: u16) -> Result<Option<Tunnel>, TunnelError> {
        Ok(None)
    }
}

pub fn from_config(config: &Config) -> anyhow::Result<Box<dyn TunnelProvisioner>> {
    match config.tunnel.as_str() {
        TUNNEL_NGROK => Ok(Box::new(NgrokProvisioner::new(
            config.ngrok_bin.clone(),
            config.ngrok_api_url.clone(),
            config.tunnel_timeout(),
        ))),
        TUNNEL_NONE => Ok(Box::new(NoTunnel)),
        tunnel => Err(anyhow::anyhow!(
            "Unsupported tunnel: {tunnel}. Use '{TUNNEL_NGROK}' or '{TUNNEL_NONE}'"
        )),
    }
}
