use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use walletproof_db::Database;

/// Background task that evicts stale verification records.
///
/// Records received more than `retention` ago are removed from the live
/// table. Audit log entries are never touched.
pub async fn run_cleanup_loop(db: Arc<Database>, retention: Duration, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match cleanup_expired(&db, retention).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: evicted {} stale verification records", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}

async fn cleanup_expired(db: &Arc<Database>, retention: Duration) -> anyhow::Result<usize> {
    let cutoff = cutoff_before(chrono::Utc::now().timestamp_millis(), retention);
    let db = db.clone();
    tokio::task::spawn_blocking(move || db.prune_before(cutoff)).await?
}

/// Oldest `received_at` still kept.
fn cutoff_before(now_ms: i64, retention: Duration) -> i64 {
    let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(retention_ms)
}
