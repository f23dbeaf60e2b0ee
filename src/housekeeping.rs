use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task that keeps room statuses in step with the calendar.
/// The first tick fires immediately, so statuses replayed from the WAL are
/// brought up to date at startup.
pub async fn run_rollover(engine: Arc<Engine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let today = engine.today();
        match engine.reconcile_all(today).await {
            Ok(0) => tracing::debug!(%today, "rollover: all rooms current"),
            Ok(updated) => info!(%today, updated, "rollover reconciled rooms"),
            Err(e) => tracing::error!("rollover failed: {e}"),
        }
        metrics::counter!(crate::observability::RECONCILE_SWEEPS_TOTAL).increment(1);
    }
}

/// Background task that compacts the WAL once `threshold` appends have
/// accumulated since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => {
                metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
                info!(appends, "compactor rewrote WAL");
            }
            Err(e) => tracing::warn!("compaction skipped: {e}"),
        }
    }
}
