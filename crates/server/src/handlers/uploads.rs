//! Upload protocol handlers: existence check, chunk upload, merge and cancel.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    BYTES_STORED, CHUNK_UPLOAD_DURATION, CHUNKS_DEDUPLICATED, CHUNKS_STORED, INSTANT_UPLOADS,
    MERGE_DURATION, MERGES_COMPLETED, SESSIONS_CANCELLED, record_merge_failure,
};
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use splice_core::upload::{
    CancelResponse, ChunkUploadQuery, ChunkUploadResponse, ExistsQuery, ExistsResponse,
    MergeRequest, MergeResponse,
};
use splice_core::{ArtifactName, FileFingerprint, SessionDeclaration};
use splice_storage::{Lookup, PutOutcome};
use std::time::Instant;
use tracing::{debug, info};

fn parse_fingerprint(raw: &str) -> ApiResult<FileFingerprint> {
    Ok(FileFingerprint::from_hex(raw)?)
}

fn parse_index(raw: &str) -> ApiResult<u32> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid chunk index: {raw:?}")))
}

/// Validate a client declaration against server limits.
fn declaration(state: &AppState, file_size: u64, chunk_size: u64) -> ApiResult<SessionDeclaration> {
    let max = state.config.server.max_chunk_size;
    if chunk_size > max {
        return Err(ApiError::ChunkTooLarge {
            size: chunk_size,
            max,
        });
    }
    let declaration = SessionDeclaration::new(file_size, chunk_size);
    declaration.plan()?;
    Ok(declaration)
}

/// GET /v1/uploads/exists - Is the name published, and if not, what is staged?
pub async fn check_exists(
    State(state): State<AppState>,
    query: Result<Query<ExistsQuery>, QueryRejection>,
) -> ApiResult<Json<ExistsResponse>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let name = ArtifactName::parse(&query.file_name)?;
    let fingerprint = parse_fingerprint(&query.fingerprint)?;
    let declared = match (query.file_size, query.chunk_size) {
        (Some(file_size), Some(chunk_size)) => Some(declaration(&state, file_size, chunk_size)?),
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "file_size and chunk_size must be given together".to_string(),
            ));
        }
    };

    match state
        .service
        .check_exists(&name, &fingerprint, declared)
        .await?
    {
        Lookup::Published(artifact) => {
            INSTANT_UPLOADS.inc();
            let locator = artifact.locator(&state.config.server.public_base_url);
            info!(name = %name, "instant upload");
            Ok(Json(ExistsResponse::published(artifact, locator)))
        }
        Lookup::Staged { persisted, .. } => {
            debug!(fingerprint = %fingerprint, staged = persisted.len(), "existence check");
            Ok(Json(ExistsResponse::staged(&persisted)))
        }
    }
}

/// PUT /v1/uploads/{fingerprint}/chunks/{index} - Stage one chunk.
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((fingerprint, index)): Path<(String, String)>,
    query: Result<Query<ChunkUploadQuery>, QueryRejection>,
    body: Bytes,
) -> ApiResult<Json<ChunkUploadResponse>> {
    let start_time = Instant::now();
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let fingerprint = parse_fingerprint(&fingerprint)?;
    let index = parse_index(&index)?;
    let declared = declaration(&state, query.file_size, query.chunk_size)?;
    let size = body.len() as u64;

    let outcome = state
        .service
        .put_chunk(&fingerprint, index, Some(declared), body)
        .await?;

    match outcome {
        PutOutcome::Stored => {
            CHUNKS_STORED.inc();
            BYTES_STORED.inc_by(size);
        }
        PutOutcome::AlreadyPresent => CHUNKS_DEDUPLICATED.inc(),
    }
    CHUNK_UPLOAD_DURATION.observe(start_time.elapsed().as_secs_f64());

    Ok(Json(ChunkUploadResponse {
        index,
        stored: outcome.is_stored(),
    }))
}

/// POST /v1/uploads/{fingerprint}/merge - Assemble and publish.
pub async fn merge_upload(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
    body: Result<Json<MergeRequest>, JsonRejection>,
) -> ApiResult<Json<MergeResponse>> {
    let start_time = Instant::now();
    let fingerprint = parse_fingerprint(&fingerprint)?;
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let artifact = match state.service.merge(&fingerprint, &request.file_name).await {
        Ok(artifact) => artifact,
        Err(e) => {
            let e = ApiError::from(e);
            record_merge_failure(e.code());
            return Err(e);
        }
    };

    MERGES_COMPLETED.inc();
    MERGE_DURATION.observe(start_time.elapsed().as_secs_f64());

    let locator = artifact.locator(&state.config.server.public_base_url);
    Ok(Json(MergeResponse { locator, artifact }))
}

/// DELETE /v1/uploads/{fingerprint} - Drop everything staged for a fingerprint.
pub async fn cancel_upload(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let fingerprint = parse_fingerprint(&fingerprint)?;
    let removed = state.service.cancel(&fingerprint).await?;
    if removed {
        SESSIONS_CANCELLED.inc();
        info!(fingerprint = %fingerprint, "upload cancelled");
    }
    Ok(Json(CancelResponse { removed }))
}
