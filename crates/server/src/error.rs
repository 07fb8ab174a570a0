//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use splice_core::upload::ErrorResponse;
use splice_storage::StorageError;

/// API error type.
///
/// 4xx statuses mark permanent rejections a client must not retry; 5xx
/// statuses mark failures that may succeed on retry.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("chunk size {size} exceeds server maximum {max}")]
    ChunkTooLarge { size: u64, max: u64 },

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] splice_core::Error),
}

fn core_code(e: &splice_core::Error) -> &'static str {
    use splice_core::Error;
    match e {
        Error::InvalidFingerprint(_) => "invalid_fingerprint",
        Error::InvalidName(_) => "invalid_name",
        Error::InvalidChunkSize { .. } => "invalid_chunk_size",
        Error::IndexOutOfRange { .. } => "index_out_of_range",
        Error::TooManyChunks { .. } => "too_many_chunks",
        Error::Serialization(_) => "serialization_error",
    }
}

fn core_status(e: &splice_core::Error) -> StatusCode {
    match e {
        splice_core::Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::ChunkTooLarge { .. } => "chunk_too_large",
            Self::Internal(_) => "internal_error",
            Self::Core(e) => core_code(e),
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => "not_found",
                StorageError::InvalidKey(_) => "invalid_key",
                StorageError::Core(inner) => core_code(inner),
                StorageError::UndeclaredSession(_) => "undeclared_session",
                StorageError::ConflictingSession { .. } => "conflicting_session",
                StorageError::ConflictingChunkSize { .. } => "conflicting_chunk_size",
                StorageError::IncompleteUpload { .. } => "incomplete_upload",
                StorageError::FingerprintMismatch { .. } => "fingerprint_mismatch",
                StorageError::MergeIo { .. } => "merge_io",
                StorageError::AlreadyPublished(_) => "already_published",
                StorageError::Io(_) => "storage_error",
                StorageError::Config(_) => "config_error",
            },
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ChunkTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Core(e) => core_status(e),
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                StorageError::Core(inner) => core_status(inner),
                StorageError::UndeclaredSession(_) => StatusCode::BAD_REQUEST,
                StorageError::ConflictingSession { .. } => StatusCode::CONFLICT,
                StorageError::ConflictingChunkSize { .. } => StatusCode::BAD_REQUEST,
                StorageError::IncompleteUpload { .. } => StatusCode::CONFLICT,
                StorageError::FingerprintMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                StorageError::AlreadyPublished(_) => StatusCode::CONFLICT,
                StorageError::MergeIo { .. }
                | StorageError::Io(_)
                | StorageError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn missing(&self) -> Option<Vec<u32>> {
        match self {
            Self::Storage(StorageError::IncompleteUpload { missing, .. }) => Some(missing.clone()),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            missing: self.missing(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
