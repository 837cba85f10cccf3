use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::error::RefreshError;
use crate::market_data::fetcher::{MarketIntelligence, RefreshSummary};
use crate::state::market_cache::TrendCacheHandle;

/// Refresh the market cache only when it is empty or older than `staleness`.
/// Returns `None` when the cache was fresh enough to skip.
pub async fn refresh_if_stale(
    intel: &MarketIntelligence,
    store: &TrendCacheHandle,
    staleness: chrono::Duration,
) -> Option<Result<RefreshSummary, RefreshError>> {
    if !store.is_stale(staleness).await {
        debug!("market cache fresh, skipping scheduled refresh");
        return None;
    }
    Some(intel.refresh().await)
}

/// Periodic background refresh. Runs until the task is dropped; a failed
/// refresh is logged and retried on the next tick.
pub async fn run_refresh_scheduler(
    intel: Arc<MarketIntelligence>,
    store: TrendCacheHandle,
    every: Duration,
    staleness: chrono::Duration,
) -> anyhow::Result<()> {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = every.as_secs(), "market refresh scheduler started");

    loop {
        ticker.tick().await;

        match refresh_if_stale(&intel, &store, staleness).await {
            None => {}
            Some(Ok(summary)) => info!(
                updated = summary.updated_categories.len(),
                stale_partial = ?summary.stale_partial_categories,
                "scheduled refresh committed"
            ),
            Some(Err(RefreshError::Conflict)) => {
                debug!("manual refresh in progress, scheduler skipping tick")
            }
            Some(Err(err)) => warn!(error = %err, "scheduled refresh failed"),
        }
    }
}
