//! Removal of abandoned staging namespaces.

use crate::error::StorageResult;
use crate::locks::KeyedLocks;
use crate::traits::ChunkStore;
use splice_core::FileFingerprint;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Outcome of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Namespaces inspected.
    pub scanned: usize,
    /// Namespaces deleted.
    pub removed: usize,
    /// Stale namespaces skipped because an upload or merge held them.
    pub skipped_busy: usize,
}

/// Delete every staging namespace untouched for longer than `stale_after`.
///
/// Sessions with a chunk write, merge or cancel in flight are skipped rather
/// than waited on.
pub async fn sweep_stale_sessions(
    chunks: &dyn ChunkStore,
    locks: &KeyedLocks<FileFingerprint>,
    stale_after: Duration,
) -> StorageResult<SweepStats> {
    let now = SystemTime::now();
    let mut stats = SweepStats::default();

    for session in chunks.list_sessions().await? {
        stats.scanned += 1;
        // A timestamp in the future counts as fresh.
        let age = now
            .duration_since(session.last_modified)
            .unwrap_or(Duration::ZERO);
        if age < stale_after {
            continue;
        }

        let Some(_guard) = locks.try_write(&session.fingerprint) else {
            debug!(fingerprint = %session.fingerprint, "stale session busy, skipping");
            stats.skipped_busy += 1;
            continue;
        };
        match chunks.remove(&session.fingerprint).await {
            Ok(true) => {
                info!(fingerprint = %session.fingerprint, age_secs = age.as_secs(), "removed stale session");
                stats.removed += 1;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(fingerprint = %session.fingerprint, error = %e, "failed to remove stale session")
            }
        }
    }

    Ok(stats)
}
