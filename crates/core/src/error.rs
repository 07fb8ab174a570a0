//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("invalid artifact name: {0}")]
    InvalidName(String),

    #[error("invalid chunk size: {size} (must be between {min} and {max})")]
    InvalidChunkSize { size: u64, min: u64, max: u64 },

    #[error("chunk index {index} out of range for {count} chunks")]
    IndexOutOfRange { index: u32, count: u32 },

    #[error("file of {file_size} bytes needs more than {max} chunks of {chunk_size} bytes")]
    TooManyChunks {
        file_size: u64,
        chunk_size: u64,
        max: u64,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
