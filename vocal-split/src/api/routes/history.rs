//! Job history routes.

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::error::ApiResult;
use crate::api::models::{DeletedResponse, HistoryResponse, JobResponse};
use crate::api::server::AppState;

/// GET /api/history - completed jobs, newest first.
pub async fn list_history(State(state): State<AppState>) -> ApiResult<Json<HistoryResponse>> {
    let jobs: Vec<JobResponse> = state
        .manager
        .history()
        .into_iter()
        .map(JobResponse::from)
        .collect();
    Ok(Json(HistoryResponse {
        total: jobs.len(),
        jobs,
    }))
}

/// DELETE /api/history/{id} - remove a finished job, its log and files.
pub async fn delete_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeletedResponse>> {
    state.manager.delete_history(&id).await?;
    Ok(Json(DeletedResponse { deleted: id }))
}
