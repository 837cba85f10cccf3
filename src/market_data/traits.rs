use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::market_data::types::{InterestSeries, TrendQuery};

/// External source of search-interest time series.
///
/// An empty series means the source had no data for the query; that is not
/// an error.
#[async_trait]
pub trait TrendSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn interest_over_time(&self, query: &TrendQuery) -> Result<InterestSeries, UpstreamError>;
}
