//! The surface callers price against.

use std::sync::Arc;

use tracing::instrument;

use crate::error::{PricingError, RefreshError};
use crate::market_data::fetcher::{MarketIntelligence, RefreshSummary};
use crate::pricing::engine::PricingEngine;
use crate::pricing::types::{PricingRequest, PricingResult};
use crate::state::market::MarketCache;
use crate::state::market_cache::TrendCacheHandle;

/// Pricing engine and market intelligence sharing one cache handle.
#[derive(Clone)]
pub struct PricingCore {
    engine: Arc<PricingEngine>,
    intel: Arc<MarketIntelligence>,
    store: TrendCacheHandle,
}

impl PricingCore {
    pub fn new(engine: PricingEngine, intel: Arc<MarketIntelligence>, store: TrendCacheHandle) -> Self {
        Self {
            engine: Arc::new(engine),
            intel,
            store,
        }
    }

    pub async fn compute_price(&self, request: &PricingRequest) -> Result<PricingResult, PricingError> {
        self.engine.compute_price(request).await
    }

    /// Fails with `RefreshError::Conflict` while another refresh runs.
    #[instrument(skip(self))]
    pub async fn refresh_market_cache(&self) -> Result<RefreshSummary, RefreshError> {
        self.intel.refresh().await
    }

    /// The committed snapshot, or an empty one before the first commit.
    pub async fn get_market_snapshot(&self) -> MarketCache {
        self.store
            .current()
            .await
            .map(|cache| cache.as_ref().clone())
            .unwrap_or_default()
    }

    pub fn engine(&self) -> &PricingEngine {
        &self.engine
    }

    pub fn market_intelligence(&self) -> &Arc<MarketIntelligence> {
        &self.intel
    }
}
