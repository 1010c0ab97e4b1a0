//! Job submission, status and stop routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/api/process` | Submit a remote URL |
//! | POST | `/api/upload` | Submit an audio file (multipart field `file`) |
//! | GET | `/api/status/{id}` | Job snapshot |
//! | POST | `/api/stop/{id}` | Stop a job |

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{JobResponse, ProcessRequest, StopResponse};
use crate::api::server::AppState;

/// Name of the multipart field carrying the uploaded file.
const UPLOAD_FIELD: &str = "file";

/// Submit a remote URL for processing.
pub async fn submit_url(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    let record = state.manager.submit_remote(&request.url)?;
    Ok((StatusCode::ACCEPTED, Json(record.into())))
}

/// Submit an uploaded audio file for processing.
pub async fn submit_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("Uploaded file has no file name"))?;
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;

        let record = state
            .manager
            .submit_upload(&filename, content_type.as_deref(), &data)
            .await?;
        return Ok((StatusCode::ACCEPTED, Json(record.into())));
    }

    Err(ApiError::bad_request(format!(
        "Missing multipart field '{UPLOAD_FIELD}'"
    )))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    let status = err.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(err.body_text())
    } else {
        ApiError::bad_request(err.body_text())
    }
}

/// Get a job snapshot.
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let record = state.manager.status(&id)?;
    Ok(Json(record.into()))
}

/// Stop a job. Stopping a finished job is a no-op.
pub async fn stop_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StopResponse>> {
    let (record, stopped) = state.manager.stop(&id)?;
    Ok(Json(StopResponse {
        id: record.id,
        stopped,
        status: record.status,
    }))
}
