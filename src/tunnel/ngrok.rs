use super::{Tunnel, TunnelError, TunnelProvisioner};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Starts a local ngrok agent and reads the public URL back from its inspection API
pub struct NgrokProvisioner {
    bin: String,
    api_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
pub struct TunnelList {
    #[serde(default)]
    pub tunnels: Vec<TunnelInfo>,
}

#[derive(Debug, Deserialize)]
pub struct TunnelInfo {
    pub public_url: String,
    #[serde(default)]
    pub proto: String,
    #[serde(default)]
    pub config: TunnelConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct TunnelConfig {
    #[serde(default)]
    pub addr: String,
}

impl NgrokProvisioner {
    pub fn new(bin: String, api_url: String, timeout: Duration) -> Self {
        Self {
            bin,
            api_url: api_url.trim_end_matches('/').to_string(),
            timeout,
            client: reqwest::Client::builder()
                .no_proxy()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn list_tunnels(&self) -> Result<TunnelList, TunnelError> {
        let list = self
            .client
            .get(format!("{}/api/tunnels", self.api_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list)
    }

    /// Poll the agent API until a tunnel for `port` is listed
    ///
    /// When `agent` is given, an early exit of that process aborts the wait.
    pub async fn wait_for_public_url(
        &self,
        port: u16,
        mut agent: Option<&mut Child>,
    ) -> Result<String, TunnelError> {
        let deadline = Instant::now() + self.timeout;

        loop {
            if let Some(child) = agent.as_deref_mut()
                && let Ok(Some(status)) = child.try_wait()
            {
                return Err(TunnelError::AgentExited(status));
            }

            match self.list_tunnels().await {
                Ok(list) => {
                    if let Some(url) = pick_public_url(&list, port) {
                        return Ok(url);
                    }
                    debug!(port, "Tunnel not listed yet");
                }
                // The API is not up until the agent finishes starting
                Err(error) => debug!(%error, "Tunnel agent API not ready"),
            }

            if Instant::now() >= deadline {
                return Err(TunnelError::Timeout {
                    port,
                    secs: self.timeout.as_secs(),
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl TunnelProvisioner for NgrokProvisioner {
    async fn provision(&self, port: u16) -> Result<Option<Tunnel>, TunnelError> {
        info!(bin = %self.bin, port, "Starting ngrok agent");
        let mut child = Command::new(&self.bin)
            .args(["http", &port.to_string(), "--log", "stdout"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TunnelError::Spawn {
                bin: self.bin.clone(),
                source,
            })?;

        let public_url = self.wait_for_public_url(port, Some(&mut child)).await?;
        info!(%public_url, "Tunnel established");
        Ok(Some(Tunnel::new(public_url, Some(child))))
    }
}

/// Public URL of the tunnel forwarding to `port`, https preferred
pub fn pick_public_url(list: &TunnelList, port: u16) -> Option<String> {
    let suffix = format!(":{port}");
    let mut matching = list
        .tunnels
        .iter()
        .filter(|t| t.config.addr.ends_with(&suffix));

    let first = matching.next()?;
    if first.proto == "https" {
        return Some(first.public_url.clone());
    }
    let chosen = matching.find(|t| t.proto == "https").unwrap_or(first);
    Some(chosen.public_url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::get};
    use serde_json::{Value as JsonValue, json};
    use tokio::net::TcpListener;

    fn tunnels(value: JsonValue) -> TunnelList {
        serde_json::from_value(value).unwrap()
    }

    async fn spawn_agent_api(body: JsonValue) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/api/tunnels",
            get(move || {
                let body = body.clone();
                async move { Json(body) }
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_pick_prefers_https_for_port() {
        let list = tunnels(json!({
            "tunnels": [
                { "public_url": "http://other.ngrok.app", "proto": "http", "config": { "addr": "http://localhost:8080" } },
                { "public_url": "http://abc.ngrok.app", "proto": "http", "config": { "addr": "http://localhost:5000" } },
                { "public_url": "https://abc.ngrok.app", "proto": "https", "config": { "addr": "http://localhost:5000" } },
            ]
        }));
        assert_eq!(
            pick_public_url(&list, 5000).as_deref(),
            Some("https://abc.ngrok.app")
        );
        assert_eq!(
            pick_public_url(&list, 8080).as_deref(),
            Some("http://other.ngrok.app")
        );
        assert!(pick_public_url(&list, 9000).is_none());
    }

    #[test]
    fn test_pick_on_empty_list() {
        assert!(pick_public_url(&tunnels(json!({})), 5000).is_none());
    }

    #[tokio::test]
    async fn test_wait_reads_url_from_agent_api() {
        let api_url = spawn_agent_api(json!({
            "tunnels": [
                { "public_url": "https://abc.ngrok-free.app", "proto": "https", "config": { "addr": "http://localhost:5000" } }
            ],
            "uri": "/api/tunnels"
        }))
        .await;

        let provisioner = NgrokProvisioner::new("ngrok".into(), api_url, Duration::from_secs(2));
        let url = provisioner.wait_for_public_url(5000, None).await.unwrap();
        assert_eq!(url, "https://abc.ngrok-free.app");
    }

    #[tokio::test]
    async fn test_wait_times_out_without_matching_tunnel() {
        let api_url = spawn_agent_api(json!({ "tunnels": [] })).await;

        let provisioner =
            NgrokProvisioner::new("ngrok".into(), api_url, Duration::from_millis(300));
        let err = provisioner
            .wait_for_public_url(5000, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Timeout { port: 5000, .. }));
    }

    #[tokio::test]
    async fn test_provision_fails_when_binary_missing() {
        let provisioner = NgrokProvisioner::new(
            "/nonexistent/ngrok-binary".into(),
            "http://127.0.0.1:1".into(),
            Duration::from_millis(100),
        );
        let err = provisioner.provision(5000).await.unwrap_err();
        assert!(matches!(err, TunnelError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_provision_fails_when_agent_exits_early() {
        // `false` exits straight away with status 1 and never serves the API
        let provisioner = NgrokProvisioner::new(
            "false".into(),
            "http://127.0.0.1:1".into(),
            Duration::from_secs(5),
        );
        let err = provisioner.provision(5000).await.unwrap_err();
        match err {
            TunnelError::AgentExited(status) => assert!(!status.success()),
            other => panic!("expected AgentExited, got {other:?}"),
        }
    }
}
