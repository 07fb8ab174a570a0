//! Background sweeper for abandoned staging namespaces.

use crate::metrics::{GC_SESSIONS_REMOVED, GC_SWEEPS};
use splice_core::config::GcConfig;
use splice_storage::{SweepStats, UploadService};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Run one sweep and record its outcome.
pub async fn run_sweep(
    service: &UploadService,
    stale_after: Duration,
) -> splice_storage::StorageResult<SweepStats> {
    let stats = service.sweep(stale_after).await?;
    GC_SWEEPS.inc();
    GC_SESSIONS_REMOVED.inc_by(stats.removed as u64);
    if stats.removed > 0 || stats.skipped_busy > 0 {
        tracing::info!(
            scanned = stats.scanned,
            removed = stats.removed,
            skipped_busy = stats.skipped_busy,
            "stale session sweep finished"
        );
    }
    Ok(stats)
}

/// Spawn the periodic sweeper. The first sweep runs one interval after start.
pub fn spawn_gc_task(service: UploadService, config: GcConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = run_sweep(&service, config.stale_after()).await {
                tracing::warn!(error = %e, "stale session sweep failed");
            }
        }
    })
}
