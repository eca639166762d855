//! Axum HTTP(S) server, routing, and middleware.
//!
//! # Responsibilities
//! - Bind the listener, plain TCP or TLS (rustls) when a certificate is configured.
//! - Define the Axum router with all routes and shared middleware.
//! - Inject shared application state (`AppState`) into handlers.
//! - Map core errors onto JSON error responses.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
pub mod tls;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use rustls::ServerConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serve `router` on `port` until `shutdown` is cancelled.
pub async fn serve(
    router: Router,
    port: u16,
    tls: Option<Arc<ServerConfig>>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, tls = tls.is_some(), "listening");

    match tls {
        Some(config) => tls::serve_tls(listener, config, router, shutdown).await,
        None => axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("HTTP server failed"),
    }
}
