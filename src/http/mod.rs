//! HTTP front-end: `POST /detect` and `GET /health`.
//!
//! Same request body and response shape as the socket protocol (without the
//! trailing newline). Failures are still answered with `{"object":"none"}`,
//! but the status code tells the caller what went wrong:
//!
//! | Outcome | Status |
//! |---|---|
//! | detection / no detection | 200 |
//! | missing or wrong field, undecodable image | 400 |
//! | unparseable body, bad base64, detector failure | 500 |

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::HTTP_BODY_LIMIT;
use crate::service::DetectionService;

/// Build the router with the detection service as shared state.
pub fn build_router(service: Arc<DetectionService>) -> Router {
    Router::new()
        .route("/detect", post(handlers::detect))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(HTTP_BODY_LIMIT))
        .with_state(service)
}

/// Running HTTP server.
#[derive(Debug)]
pub struct HttpServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

impl HttpServer {
    /// Bind the listener and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(addr: SocketAddr, service: Arc<DetectionService>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {addr}"))?;
        let local_addr = listener.local_addr()?;

        log::info!("[Http] Listening on {}", local_addr);

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let app = build_router(service);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        Ok(Self {
            local_addr,
            shutdown,
            handle,
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        match self.handle.await {
            Ok(Ok(())) => log::info!("[Http] Server stopped"),
            Ok(Err(e)) => log::error!("[Http] Server error: {e}"),
            Err(e) => log::error!("[Http] Server task ended abnormally: {e}"),
        }
    }
}
