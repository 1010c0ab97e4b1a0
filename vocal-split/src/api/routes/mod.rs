//! API route modules.
//!
//! Organizes routes by resource type.

pub mod cache;
pub mod downloads;
pub mod health;
pub mod history;
pub mod jobs;
pub mod logs;

use axum::Router;
use axum::routing::{delete, get, post};

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/process", post(jobs::submit_url))
        .route("/api/upload", post(jobs::submit_upload))
        .route("/api/status/{id}", get(jobs::get_status))
        .route("/api/stop/{id}", post(jobs::stop_job))
        .route("/api/logs/{id}", get(logs::stream_logs))
        .route("/api/history", get(history::list_history))
        .route("/api/history/{id}", delete(history::delete_history))
        .route("/download/{id}/{track}", get(downloads::download_track))
        .nest("/api/cache", cache::router())
        .nest("/health", health::router())
        .with_state(state)
}
