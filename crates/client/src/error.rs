//! Client error types.

use std::path::PathBuf;

/// Error surfaced by the upload client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Local read failure while chunking or fingerprinting. Never retried.
    #[error("failed to read {}: {source}", path.display())]
    ChunkRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network failure or 5xx response.
    #[error("transient transfer error: {message}")]
    Transient {
        status: Option<u16>,
        message: String,
    },

    /// 4xx response; retrying the same request cannot succeed.
    #[error("request rejected ({status}, {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    /// The server refused to merge because chunks are missing.
    #[error("upload incomplete: {} chunk(s) missing", missing.len())]
    IncompleteUpload { missing: Vec<u32> },

    /// Chunk transfer gave up; `missing` lists indices not confirmed by the server.
    #[error("upload failed with {} chunk(s) missing: {source}", missing.len())]
    TransferFailed {
        missing: Vec<u32>,
        #[source]
        source: Box<ClientError>,
    },

    /// The upload was cancelled before the merge was requested.
    #[error("upload cancelled with {} chunk(s) missing", missing.len())]
    Cancelled { missing: Vec<u32> },

    #[error("invalid server response: {0}")]
    InvalidResponse(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] splice_core::Error),
}

impl ClientError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Indices still missing on the server, when the error knows them.
    pub fn missing(&self) -> Option<&[u32]> {
        match self {
            Self::IncompleteUpload { missing }
            | Self::TransferFailed { missing, .. }
            | Self::Cancelled { missing } => Some(missing),
            _ => None,
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ChunkRead {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transient {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
