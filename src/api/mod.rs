//! Read-only HTTP surface over the monitor's live state and recorded clips.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::services::orchestrator::MonitorHandles;

pub mod error;
pub mod handlers;
pub mod video;

pub struct ApiState {
    pub monitor: MonitorHandles,
    pub videos_dir: PathBuf,
}

impl ApiState {
    pub fn new(monitor: MonitorHandles) -> Self {
        let videos_dir = monitor.recorder.videos_dir().to_path_buf();
        Self { monitor, videos_dir }
    }
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/stats", get(handlers::get_stats))
        .route("/websites", get(handlers::get_websites))
        .route("/activities", get(handlers::get_activities))
        .route("/videos", get(video::list_videos))
        .route("/daily", get(handlers::get_daily))
        .route("/usage", get(handlers::get_usage));

    Router::new()
        .nest("/api", api)
        .route("/videos/{filename}", get(video::serve_video))
        .layer(cors)
        .with_state(state)
}

/// Serves until `shutdown` resolves.
pub async fn serve<F>(state: Arc<ApiState>, host: &str, port: u16, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", host, port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    log::info!("[Api] Dashboard API listening on http://{}", addr);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;
    log::info!("[Api] HTTP server stopped");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[Api] Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("[Api] Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => log::info!("[Api] Received Ctrl+C, shutting down"),
        () = terminate => log::info!("[Api] Received terminate signal, shutting down"),
    }
}
