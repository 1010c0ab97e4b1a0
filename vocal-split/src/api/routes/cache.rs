//! Cache administration routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/api/cache` | Cache statistics |
//! | DELETE | `/api/cache` | Remove every entry |
//! | DELETE | `/api/cache/{fingerprint}` | Remove one entry |

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get},
};

use crate::api::error::ApiResult;
use crate::api::models::{CacheClearResponse, DeletedResponse};
use crate::api::server::AppState;
use crate::cache::CacheStats;

/// Create the cache router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(cache_stats).delete(clear_cache))
        .route("/{fingerprint}", delete(delete_entry))
}

async fn cache_stats(State(state): State<AppState>) -> ApiResult<Json<CacheStats>> {
    Ok(Json(state.manager.cache_stats().await?))
}

async fn clear_cache(State(state): State<AppState>) -> ApiResult<Json<CacheClearResponse>> {
    let removed = state.manager.cache_clear().await?;
    Ok(Json(CacheClearResponse { removed }))
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<DeletedResponse>> {
    state.manager.cache_delete(&fingerprint).await?;
    Ok(Json(DeletedResponse {
        deleted: fingerprint,
    }))
}
