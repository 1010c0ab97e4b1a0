//! Health check routes.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::api::server::AppState;
use crate::pipeline::HealthReport;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub version: &'static str,
    pub uptime_secs: u64,
    pub demucs_available: bool,
    pub ffmpeg_available: bool,
    #[serde(flatten)]
    pub report: HealthReport,
}

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

/// Tool availability, device and queue status.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.manager.health();
    let available = |tool: &str| report.tools.get(tool).copied().unwrap_or(false);
    Json(HealthResponse {
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        demucs_available: available("demucs"),
        ffmpeg_available: available("ffmpeg"),
        report,
    })
}
