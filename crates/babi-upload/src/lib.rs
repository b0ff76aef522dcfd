//! Image upload proxy for Babi Time.
//!
//! Accepts a single multipart `file` field on any path, stores it through an
//! [`store::ObjectStore`] and replies with the object key and, when
//! `PUBLIC_BASE_URL` is set, a public URL.
//!
//! # Environment
//! - `BABI_UPLOAD_PORT` listen port (default 8787)
//! - `ALLOWED_ORIGINS` comma-separated CORS allow-list; empty allows any
//! - `PUBLIC_BASE_URL` prefix for returned URLs
//! - `UPLOAD_TOKEN` bearer token required on uploads
//! - `UPLOAD_DIR` where objects are written (default `./uploads`)
//!
//! `PUBLIC_BASE_URL` and `UPLOAD_TOKEN` may also come from
//! `/run/secrets/<NAME>`.

use std::sync::Arc;

use anyhow::Context;
use axum::{Router, extract::DefaultBodyLimit, middleware::from_fn_with_state};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;

use config::Config;
use routes::{MAX_UPLOAD_BYTES, cors_middleware, upload_handler};
use state::AppState;
use store::LocalFsObjectStore;

/// Hard cap on request bodies. The handler stops reading a file part at
/// [`MAX_UPLOAD_BYTES`]; hitting this cap reports the same size error.
pub const BODY_LIMIT_BYTES: usize = MAX_UPLOAD_BYTES * 2;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(upload_handler)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(from_fn_with_state(state.clone(), cors_middleware))
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,babi_upload=debug"));
    fmt().with_env_filter(filter).init();

    info!("Loading config...");
    let config = Config::load()?;
    let store = LocalFsObjectStore::open(&config.upload_dir)
        .await
        .with_context(|| format!("failed to open {}", config.upload_dir.display()))?;
    if config.upload_token.is_none() {
        warn!("UPLOAD_TOKEN not set; uploads are unauthenticated");
    }

    let address = format!("0.0.0.0:{}", config.port);
    let app = build_router(AppState::new(config, Arc::new(store)));

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(err) => {
                warn!(error = %err, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                warn!(error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
