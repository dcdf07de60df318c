use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::engine::Engine;

pub const COMPACT_INTERVAL: Duration = Duration::from_secs(30);

/// One compactor pass: rewrite the WAL once it has grown past `threshold`
/// appends, drop watch channels nobody listens to anymore, and forget
/// idle per-id locks.
/// Returns whether the WAL was compacted.
pub async fn compact_once(engine: &Engine, threshold: u64) -> bool {
    let pruned = engine.notify.prune();
    if pruned > 0 {
        debug!("pruned {pruned} idle watch channels");
    }
    let released = engine.prune_locks();
    if released > 0 {
        debug!("released {released} idle locks");
    }
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => true,
        Err(e) => {
            error!("WAL compaction failed after {appends} appends: {e}");
            false
        }
    }
}

/// Background task that keeps the WAL bounded.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_INTERVAL);
    loop {
        interval.tick().await;
        compact_once(&engine, threshold).await;
    }
}
