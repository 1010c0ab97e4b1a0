//! Track download route.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, Request, header},
    response::{IntoResponse, Response},
};
use tower_http::services::ServeFile;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::jobs::Track;
use crate::utils::fs::extension_lower;

/// GET /download/{id}/{track} - serve a completed job's track.
///
/// `track` is `vocals` or `instrumental` (`foreground` / `background` are
/// accepted as aliases).
pub async fn download_track(
    State(state): State<AppState>,
    Path((id, track)): Path<(String, String)>,
) -> ApiResult<Response> {
    let track: Track = track.parse().map_err(ApiError::bad_request)?;
    let path = state.manager.artifact(&id, track).await?;

    let extension = extension_lower(&path).unwrap_or_else(|| "mp3".to_string());
    let filename = format!("{}.{}", track.as_str(), extension);

    let req = Request::builder()
        .body(Body::empty())
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let mut response = match ServeFile::new(&path).try_call(req).await {
        Ok(response) => response.into_response(),
        Err(e) => return Err(ApiError::internal(format!("Failed to serve file: {}", e))),
    };

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|e| ApiError::internal(format!("Invalid header value: {e}")))?;
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}
