//! API server setup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::error::{Error, Result};
use crate::pipeline::JobManager;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub manager: Arc<JobManager>,
    /// How often log streams poll for new lines
    pub log_poll_interval: Duration,
}

impl AppState {
    pub fn new(manager: Arc<JobManager>) -> Self {
        let log_poll_interval = manager.config().log_poll_interval;
        Self {
            start_time: Instant::now(),
            manager,
            log_poll_interval,
        }
    }
}

/// Build the application router with middleware.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.manager.config().upload_limit;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::create_router(state)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    // Health probes are noise.
                    if request.uri().path() == "/health" {
                        return Span::none();
                    }
                    tracing::info_span!(
                        "http",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                }),
        )
        .layer(cors)
}

/// HTTP server bound to the configured address.
pub struct ApiServer {
    addr: String,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self {
            addr: state.manager.config().socket_addr(),
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Token that stops the server when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Serve until the cancel token fires.
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = self
            .addr
            .parse()
            .map_err(|e| Error::config(format!("Invalid bind address {}: {}", self.addr, e)))?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("API server listening on http://{}", addr);

        let router = build_router(self.state);
        let token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;

        tracing::info!("API server stopped");
        Ok(())
    }
}
