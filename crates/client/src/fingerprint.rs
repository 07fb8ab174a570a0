//! Whole-file fingerprinting on a dedicated blocking worker.
//!
//! The worker owns the digest state and reports back only through
//! [`FingerprintEvent`] messages. It reads the file one chunk at a time in
//! index order, so memory use is bounded by the chunk size. Dropping the
//! receiver stops the worker at the next chunk boundary.

use crate::error::{ClientError, ClientResult};
use splice_core::{ChunkPlan, FileFingerprint, FingerprintHasher};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

const EVENT_BUFFER: usize = 16;

/// Progress and result messages from the fingerprint worker.
#[derive(Debug)]
pub enum FingerprintEvent {
    /// The file was opened and partitioned.
    Started { plan: ChunkPlan },
    /// Chunk `index` (of `of`) was read and hashed.
    ChunkLoaded { index: u32, of: u32 },
    /// Terminal: every chunk was hashed.
    Finished(FileFingerprint),
    /// Terminal: reading failed; nothing further is sent.
    Failed(ClientError),
}

/// Start fingerprinting `path` on a blocking worker thread.
pub fn spawn_fingerprint(path: impl Into<PathBuf>, chunk_size: u64) -> mpsc::Receiver<FingerprintEvent> {
    let path = path.into();
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::task::spawn_blocking(move || {
        let terminal = match hash_file(&path, chunk_size, &tx) {
            Ok(Some(fingerprint)) => FingerprintEvent::Finished(fingerprint),
            Ok(None) => {
                debug!(path = %path.display(), "fingerprint receiver dropped, stopping");
                return;
            }
            Err(e) => FingerprintEvent::Failed(e),
        };
        let _ = tx.blocking_send(terminal);
    });
    rx
}

/// Returns `Ok(None)` when the receiver went away mid-file.
fn hash_file(
    path: &Path,
    chunk_size: u64,
    tx: &mpsc::Sender<FingerprintEvent>,
) -> ClientResult<Option<FileFingerprint>> {
    let mut file = File::open(path).map_err(|e| ClientError::read(path, e))?;
    let file_size = file
        .metadata()
        .map_err(|e| ClientError::read(path, e))?
        .len();
    let plan = ChunkPlan::new(file_size, chunk_size)?;
    if tx.blocking_send(FingerprintEvent::Started { plan }).is_err() {
        return Ok(None);
    }

    let of = plan.chunk_count();
    let mut hasher = FingerprintHasher::new();
    let mut buf = Vec::new();
    for index in plan.indices() {
        let len = plan.expected_len(index)? as usize;
        buf.resize(len, 0);
        file.read_exact(&mut buf)
            .map_err(|e| ClientError::read(path, e))?;
        hasher.update(&buf);
        if tx
            .blocking_send(FingerprintEvent::ChunkLoaded { index, of })
            .is_err()
        {
            return Ok(None);
        }
    }
    Ok(Some(hasher.finalize()))
}

/// Fingerprint `path`, calling `on_chunk(index, of)` as chunks are hashed.
pub async fn fingerprint_file(
    path: &Path,
    chunk_size: u64,
    mut on_chunk: impl FnMut(u32, u32),
) -> ClientResult<(ChunkPlan, FileFingerprint)> {
    let mut rx = spawn_fingerprint(path, chunk_size);
    let mut plan = None;
    while let Some(event) = rx.recv().await {
        match event {
            FingerprintEvent::Started { plan: p } => plan = Some(p),
            FingerprintEvent::ChunkLoaded { index, of } => on_chunk(index, of),
            FingerprintEvent::Finished(fingerprint) => {
                let plan = plan.ok_or_else(|| {
                    ClientError::InvalidResponse("fingerprint worker skipped start".to_string())
                })?;
                return Ok((plan, fingerprint));
            }
            FingerprintEvent::Failed(e) => return Err(e),
        }
    }
    Err(ClientError::read(
        path,
        std::io::Error::other("fingerprint worker exited without a result"),
    ))
}
