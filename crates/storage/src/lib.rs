//! Staging and publish storage for Splice.
//!
//! This crate provides:
//! - A durable chunk staging area keyed by `(fingerprint, index)`
//! - A public namespace of merged artifacts with metadata records
//! - Per-fingerprint locking, the merge engine and stale-session collection
//! - [`UploadService`], the facade the server drives

pub mod backends;
pub mod dedup;
pub mod error;
pub mod gc;
pub mod locks;
pub mod merge;
pub mod service;
pub mod traits;

pub use backends::publish::FilesystemArtifactStore;
pub use backends::staging::{FilesystemChunkStore, StagingLayout};
pub use dedup::DedupIndex;
pub use error::{StorageError, StorageResult};
pub use gc::SweepStats;
pub use locks::KeyedLocks;
pub use merge::MergeEngine;
pub use service::{Lookup, UploadService};
pub use traits::{ArtifactStore, ByteStream, ChunkStore, PutOutcome, SessionInfo, StreamingPublish};

use splice_core::config::StorageConfig;
use std::sync::Arc;

/// Create the upload service from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<UploadService> {
    config.validate().map_err(StorageError::Config)?;

    let layout = StagingLayout::new(config.ignore.iter().cloned(), config.index_padding);
    let chunks = FilesystemChunkStore::new(&config.staging_root, layout).await?;
    let artifacts = FilesystemArtifactStore::new(&config.publish_root, &config.index_root).await?;
    Ok(UploadService::new(Arc::new(chunks), Arc::new(artifacts)))
}
