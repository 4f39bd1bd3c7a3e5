use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::ScheduleError;
use crate::ledger::SlotLedger;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact the journal once `threshold` appends have piled up since the last
/// rewrite. Returns whether a compaction ran.
pub async fn compact_if_needed(ledger: &SlotLedger, threshold: u64) -> Result<bool, ScheduleError> {
    let appends = ledger.journal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    ledger.compact().await?;
    info!("compacted slot journal after {appends} appends");
    Ok(true)
}

/// Background task that keeps the journal from growing without bound.
pub async fn run_compactor(ledger: Arc<SlotLedger>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&ledger, threshold).await {
            warn!("journal compaction failed: {e}");
        }
    }
}
