use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::UpstreamError;
use crate::market_data::traits::TrendSource;
use crate::market_data::types::{InterestSeries, TrendQuery};

/// Trend source backed by an HTTP bridge in front of the search-trends provider.
///
/// `GET {endpoint}?keywords=a,b&geo=IN&timeframe=today 3-m` returning
/// `{"values": [..]}` or `{"timeline": [{"value": ..}, ..]}`.
pub struct HttpTrendSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTrendSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TrendsResponse {
    Values { values: Vec<f64> },
    Timeline { timeline: Vec<TimelinePoint> },
}

#[derive(Debug, Deserialize)]
struct TimelinePoint {
    value: f64,
}

impl From<TrendsResponse> for InterestSeries {
    fn from(resp: TrendsResponse) -> Self {
        match resp {
            TrendsResponse::Values { values } => InterestSeries::new(values),
            TrendsResponse::Timeline { timeline } => {
                InterestSeries::new(timeline.into_iter().map(|p| p.value).collect())
            }
        }
    }
}

#[async_trait]
impl TrendSource for HttpTrendSource {
    fn name(&self) -> &'static str {
        "http-trends"
    }

    async fn interest_over_time(&self, query: &TrendQuery) -> Result<InterestSeries, UpstreamError> {
        let keywords = query.keywords.join(",");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("keywords", keywords.as_str()),
                ("geo", query.geo.as_str()),
                ("timeframe", query.window.as_param()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: TrendsResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::malformed(e.to_string()))?;
        let series = InterestSeries::from(body);

        if series.values.iter().any(|v| !v.is_finite()) {
            return Err(UpstreamError::malformed("non-finite interest value"));
        }

        debug!(keywords = %keywords, points = series.values.len(), "trend series received");
        Ok(series)
    }
}
