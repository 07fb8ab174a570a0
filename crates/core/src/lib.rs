//! Core domain types and shared logic for Splice.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Deterministic chunk plans
//! - File fingerprints and incremental hashing
//! - Upload sessions and the request/response shapes of the protocol
//! - Published artifacts and their names
//! - Configuration

pub mod artifact;
pub mod chunk;
pub mod config;
pub mod error;
pub mod hash;
pub mod upload;

pub use artifact::{Artifact, ArtifactName};
pub use chunk::{Chunk, ChunkPlan};
pub use error::{Error, Result};
pub use hash::{FileFingerprint, FingerprintHasher};
pub use upload::{ExistsOutcome, SessionDeclaration, UploadSession};

/// Default chunk size: 4 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Maximum chunk size accepted by the server by default: 32 MiB
pub const MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// Default number of concurrent chunk transfers.
pub const DEFAULT_PARALLEL_CHUNKS: u32 = 4;
