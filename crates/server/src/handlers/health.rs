//! Liveness endpoint.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Largest chunk size accepted in a declaration.
    pub max_chunk_size: u64,
    /// Suggested number of concurrent chunk uploads per client.
    pub max_parallel_chunks: u32,
}

/// GET /v1/health - Health check.
///
/// Fails when a storage root has gone missing.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let storage = &state.config.storage;
    for root in [&storage.staging_root, &storage.publish_root] {
        let metadata = tokio::fs::metadata(root).await.map_err(|e| {
            ApiError::Internal(format!("storage root {} not accessible: {e}", root.display()))
        })?;
        if !metadata.is_dir() {
            return Err(ApiError::Internal(format!(
                "storage root {} is not a directory",
                root.display()
            )));
        }
    }

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        max_chunk_size: state.config.server.max_chunk_size,
        max_parallel_chunks: state.config.server.max_parallel_chunks,
    }))
}
