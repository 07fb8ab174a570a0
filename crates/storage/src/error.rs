//! Storage error types.

use splice_core::{ArtifactName, FileFingerprint, SessionDeclaration};
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Core(#[from] splice_core::Error),

    #[error("no session declared for {0}")]
    UndeclaredSession(FileFingerprint),

    #[error(
        "conflicting session for {fingerprint}: staged as {existing:?}, requested {requested:?}"
    )]
    ConflictingSession {
        fingerprint: FileFingerprint,
        existing: SessionDeclaration,
        requested: SessionDeclaration,
    },

    #[error("conflicting chunk size for index {index}: expected {expected} bytes, got {actual}")]
    ConflictingChunkSize {
        index: u32,
        expected: u64,
        actual: u64,
    },

    #[error("incomplete upload for {fingerprint}: {} chunk(s) missing", missing.len())]
    IncompleteUpload {
        fingerprint: FileFingerprint,
        /// Declared chunk count, `None` when no session was declared.
        expected: Option<u32>,
        missing: Vec<u32>,
    },

    #[error("fingerprint mismatch after merge: expected {expected}, got {actual}")]
    FingerprintMismatch {
        expected: FileFingerprint,
        actual: FileFingerprint,
    },

    #[error("merge of {fingerprint} failed: {source}")]
    MergeIo {
        fingerprint: FileFingerprint,
        #[source]
        source: std::io::Error,
    },

    /// Another publish won the race for the name.
    #[error("already published: {0}")]
    AlreadyPublished(ArtifactName),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Map plain I/O failures raised while assembling an artifact to
    /// [`StorageError::MergeIo`]; other variants pass through.
    pub(crate) fn during_merge(self, fingerprint: FileFingerprint) -> Self {
        match self {
            Self::Io(source) => Self::MergeIo {
                fingerprint,
                source,
            },
            other => other,
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
