pub mod api;
pub mod app_state;
pub mod backend;
pub mod config;
pub mod models;
pub mod tunnel;

use anyhow::Context;
use axum::Router;
use axum::extract::Extension;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

//
// Re-export
//
pub use api::{ApiError, generate, health, log_request_errors};
pub use app_state::AppState;
pub use backend::{BackendError, ComfyUiBackend, GenerationBackend, MockBackend};
pub use config::Config;
pub use models::{GenerationRequest, GenerationResult, GenerationStatus, VideoResult};
pub use tunnel::{NgrokProvisioner, NoTunnel, Tunnel, TunnelError, TunnelProvisioner};

/// Routes of the bridge, independent of how the listener and tunnel are set up
pub fn router(state: AppState) -> Router {
    // The dashboard calls straight from the browser
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/generate", post(generate))
        .route("/health", get(health))
        .layer(axum::middleware::from_fn(log_request_errors))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let backend = backend::from_config(&config)?;
    let app = router(AppState::new(backend));

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let port = listener.local_addr()?.port();
    info!("Listening on http://{addr}");

    // Held until the server stops, dropping it kills the agent
    let tunnel = tunnel::from_config(&config)?
        .provision(port)
        .await
        .context("Failed to provision tunnel")?;
    print_banner(tunnel.as_ref(), &addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    drop(tunnel);
    info!("Server stopped");
    Ok(())
}

fn print_banner(tunnel: Option<&Tunnel>, addr: &str) {
    let Some(tunnel) = tunnel else {
        info!("Tunnel disabled, endpoint only reachable at http://{addr}");
        return;
    };

    println!("\nSERVER IS LIVE!");
    println!("Copy this URL: {}", tunnel.public_url);
    println!("Paste it into your dashboard's .env.local as CUSTOM_VIDEO_SERVER\n");
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Failed to listen for shutdown signal");
        // No signal handler, serve until killed
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
