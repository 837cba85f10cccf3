use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{CategoryDefinition, FetcherConfig};
use crate::error::{RefreshError, UpstreamError};
use crate::market_data::pacing::Paced;
use crate::market_data::traits::TrendSource;
use crate::market_data::types::{InterestSeries, TrendQuery};
use crate::metrics::prometheus as metrics;
use crate::state::market::{
    MarketCache, PriceRange, SeasonalEntry, TrendDirection, TrendSnapshot, TrendingCraft,
    category_multiplier,
};
use crate::state::market_cache::TrendCacheHandle;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshSummary {
    pub updated_categories: Vec<String>,
    /// Categories whose fetch failed; their previous entry was carried over.
    pub stale_partial_categories: Vec<String>,
    pub seasonal_updated: usize,
    pub regions_updated: usize,
    pub last_updated: DateTime<Utc>,
}

/// Builds new market snapshots from the trend source and commits them to the store.
pub struct MarketIntelligence {
    source: Arc<dyn TrendSource>,
    store: TrendCacheHandle,
    config: FetcherConfig,
    refreshing: AtomicBool,
}

/// Clears the in-progress flag however the refresh ends.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Category(usize),
    Seasonal(usize),
    Region(usize),
}

impl MarketIntelligence {
    pub fn new(source: Arc<dyn TrendSource>, store: TrendCacheHandle, config: FetcherConfig) -> Self {
        Self {
            source,
            store,
            config,
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Result<RefreshGuard<'_>, RefreshError> {
        self.refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| RefreshGuard(&self.refreshing))
            .map_err(|_| RefreshError::Conflict)
    }

    /// Fetch every category, seasonal keyword and region once, sequentially,
    /// and commit the merged snapshot.
    ///
    /// A concurrent call fails fast with `RefreshError::Conflict`. When every
    /// category fails the store is left untouched.
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn refresh(&self) -> Result<RefreshSummary, RefreshError> {
        let _guard = self.try_begin().inspect_err(|_| {
            warn!("refresh already in progress, rejecting trigger");
            metrics::record_refresh("conflict");
        })?;

        let started = Instant::now();
        let previous = self.store.current().await.unwrap_or_default();

        let mut categories = BTreeMap::new();
        let mut updated = Vec::new();
        let mut stale_partial = Vec::new();
        let mut seasonal = BTreeMap::new();
        let mut regional = BTreeMap::new();

        let category_count = self.config.categories.len();
        let mut plan = Paced::new(self.query_plan(), self.config.inter_call_delay);
        while let Some((target, query)) = plan.next().await {
            let result = self.fetch(&query).await;
            let categories_done = matches!(target, Target::Category(i) if i + 1 == category_count);

            match target {
                Target::Category(i) => {
                    let def = &self.config.categories[i];
                    match result {
                        Ok(series) => {
                            let snapshot = category_snapshot(def, &series);
                            info!(
                                category = %def.name,
                                trend_score = snapshot.trend_score,
                                direction = ?snapshot.trend_direction,
                                multiplier = snapshot.multiplier,
                                "category trend updated"
                            );
                            categories.insert(def.name.clone(), snapshot);
                            updated.push(def.name.clone());
                        }
                        Err(err) => {
                            warn!(category = %def.name, error = %err, "category fetch failed, keeping previous entry");
                            if let Some(prev) = previous.categories.get(&def.name) {
                                categories.insert(def.name.clone(), prev.clone());
                            }
                            stale_partial.push(def.name.clone());
                        }
                    }
                }
                Target::Seasonal(i) => {
                    let keyword = &self.config.seasonal_keywords[i];
                    match result {
                        Ok(series) => {
                            let entry = SeasonalEntry::from_score(series.mean().clamp(0.0, 100.0));
                            debug!(keyword = %keyword, score = entry.score, active = entry.active, "seasonal trend updated");
                            seasonal.insert(keyword.clone(), entry);
                        }
                        Err(err) => {
                            warn!(keyword = %keyword, error = %err, "seasonal fetch failed, keeping previous entry");
                            if let Some(prev) = previous.seasonal_entries.get(keyword) {
                                seasonal.insert(keyword.clone(), *prev);
                            }
                        }
                    }
                }
                Target::Region(i) => {
                    let region = &self.config.regions[i].name;
                    match result {
                        Ok(series) => {
                            regional.insert(region.clone(), series.mean().clamp(0.0, 100.0));
                        }
                        Err(err) => {
                            warn!(region = %region, error = %err, "regional fetch failed, keeping previous entry");
                            if let Some(prev) = previous.regional_trends.get(region) {
                                regional.insert(region.clone(), *prev);
                            }
                        }
                    }
                }
            }

            // seasonal and regional data are useless without a category to commit
            if categories_done && updated.is_empty() {
                debug!(skipped = plan.remaining(), "no category succeeded, skipping remaining queries");
                break;
            }
        }

        if updated.is_empty() {
            warn!(failed = stale_partial.len(), "every category fetch failed, market cache untouched");
            metrics::record_refresh("failed");
            return Err(RefreshError::AllCategoriesFailed);
        }

        let seasonal_updated = seasonal.len();
        let regions_updated = regional.len();
        let trending_list = trending(&categories, self.config.trending_threshold, self.config.trending_limit);
        let last_updated = Utc::now();

        let snapshot = MarketCache {
            last_updated: Some(last_updated),
            categories,
            trending_list,
            seasonal_entries: seasonal,
            regional_trends: regional,
        };

        self.store.save(snapshot).await.inspect_err(|err| {
            warn!(error = %err, "market cache commit failed");
            metrics::record_refresh("failed");
        })?;

        let outcome = if stale_partial.is_empty() { "ok" } else { "partial" };
        metrics::record_refresh(outcome);
        info!(
            updated = updated.len(),
            stale_partial = stale_partial.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "market cache refresh complete"
        );

        Ok(RefreshSummary {
            updated_categories: updated,
            stale_partial_categories: stale_partial,
            seasonal_updated,
            regions_updated,
            last_updated,
        })
    }

    fn query_plan(&self) -> Vec<(Target, TrendQuery)> {
        let cfg = &self.config;
        let query = |keywords: Vec<String>, window| TrendQuery {
            keywords,
            geo: cfg.geo.clone(),
            window,
        };

        let categories = cfg
            .categories
            .iter()
            .enumerate()
            .map(|(i, c)| (Target::Category(i), query(c.keywords.clone(), cfg.category_window)));
        let seasonal = cfg
            .seasonal_keywords
            .iter()
            .enumerate()
            .map(|(i, k)| (Target::Seasonal(i), query(vec![k.clone()], cfg.seasonal_window)));
        let regions = cfg
            .regions
            .iter()
            .enumerate()
            .map(|(i, r)| (Target::Region(i), query(r.keywords.clone(), cfg.category_window)));

        categories.chain(seasonal).chain(regions).collect()
    }

    async fn fetch(&self, query: &TrendQuery) -> Result<InterestSeries, UpstreamError> {
        let started = Instant::now();
        let timeout = self.config.call_timeout;

        let result = match tokio::time::timeout(timeout, self.source.interest_over_time(query)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(timeout)),
        };

        metrics::record_upstream_call(
            self.source.name(),
            result.is_ok(),
            started.elapsed().as_secs_f64() * 1_000.0,
        );
        result
    }
}

/// Derive a category's snapshot from its interest series.
///
/// An empty series is "no data": neutral multiplier and `data_available = false`
/// so missing data never pushes prices down.
pub fn category_snapshot(def: &CategoryDefinition, series: &InterestSeries) -> TrendSnapshot {
    if series.is_empty() {
        return TrendSnapshot {
            price_range: def.base_range,
            demand_level: def.demand.clone(),
            trend_score: 0.0,
            trend_direction: TrendDirection::Stable,
            multiplier: 1.0,
            data_available: false,
        };
    }

    let trend_score = series.mean().clamp(0.0, 100.0);
    let multiplier = category_multiplier(trend_score);
    let price_range = def.base_range.map(|base| PriceRange {
        max: (base.max * multiplier).max(base.min),
        ..base
    });

    TrendSnapshot {
        price_range,
        demand_level: def.demand.clone(),
        trend_score,
        trend_direction: series.direction(),
        multiplier,
        data_available: true,
    }
}

fn trending(
    categories: &BTreeMap<String, TrendSnapshot>,
    threshold: f64,
    limit: usize,
) -> Vec<TrendingCraft> {
    let mut list: Vec<TrendingCraft> = categories
        .iter()
        .filter(|(_, s)| s.data_available && s.trend_score > threshold)
        .map(|(name, s)| TrendingCraft {
            category: name.clone(),
            score: s.trend_score,
        })
        .collect();
    list.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.category.cmp(&b.category)));
    list.truncate(limit);
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionDefinition;
    use crate::state::backend::InMemoryBackend;
    use crate::state::market_cache::TrendCacheStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers by first keyword; unknown keywords fail with a transport error.
    struct ScriptedSource {
        answers: HashMap<String, Result<Vec<f64>, UpstreamError>>,
        latency: Duration,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(answers: &[(&str, Result<Vec<f64>, UpstreamError>)]) -> Self {
            Self {
                answers: answers.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                latency: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TrendSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn interest_over_time(&self, query: &TrendQuery) -> Result<InterestSeries, UpstreamError> {
            let key = query.keywords[0].clone();
            self.calls.lock().unwrap().push(key.clone());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.answers
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Err(UpstreamError::transport("no script")))
                .map(InterestSeries::new)
        }
    }

    fn test_config() -> FetcherConfig {
        let range = |min: f64, max: f64| Some(PriceRange::new(min, max, (min + max) / 2.0));
        FetcherConfig {
            categories: vec![
                CategoryDefinition::new("pottery", &["pottery"], range(100.0, 400.0), "medium"),
                CategoryDefinition::new("jewelry", &["jewelry"], range(300.0, 1000.0), "very_high"),
                CategoryDefinition::new("leather", &["leather"], None, "medium"),
            ],
            seasonal_keywords: vec!["diwali gifts".into(), "holi colors".into()],
            regions: vec![RegionDefinition {
                name: "gujarat".into(),
                keywords: vec!["gujarat handicraft".into()],
            }],
            inter_call_delay: Duration::ZERO,
            call_timeout: Duration::from_millis(200),
            ..FetcherConfig::default()
        }
    }

    fn store() -> TrendCacheHandle {
        Arc::new(TrendCacheStore::new(Arc::new(InMemoryBackend::new())))
    }

    fn healthy_source() -> ScriptedSource {
        ScriptedSource::new(&[
            ("pottery", Ok(vec![60.0, 60.0, 70.0, 70.0])),
            ("jewelry", Ok(vec![90.0, 80.0, 70.0, 60.0])),
            ("leather", Ok(vec![])),
            ("diwali gifts", Ok(vec![75.0, 75.0])),
            ("holi colors", Ok(vec![40.0])),
            ("gujarat handicraft", Ok(vec![61.0])),
        ])
    }

    #[tokio::test]
    async fn full_refresh_builds_and_commits_snapshot() {
        let store = store();
        let source = Arc::new(healthy_source());
        let fetcher = MarketIntelligence::new(source.clone(), store.clone(), test_config());

        let summary = fetcher.refresh().await.unwrap();
        assert_eq!(summary.updated_categories, vec!["pottery", "jewelry", "leather"]);
        assert!(summary.stale_partial_categories.is_empty());
        assert_eq!(summary.seasonal_updated, 2);
        assert_eq!(summary.regions_updated, 1);

        let cache = store.current().await.unwrap();
        assert_eq!(cache.last_updated, Some(summary.last_updated));

        let pottery = cache.category("pottery").unwrap();
        assert_eq!(pottery.trend_score, 65.0);
        assert_eq!(pottery.multiplier, 1.15);
        assert_eq!(pottery.trend_direction, TrendDirection::Rising);
        let range = pottery.price_range.unwrap();
        assert_eq!((range.min, range.avg), (100.0, 250.0));
        assert!((range.max - 460.0).abs() < 1e-9);

        let jewelry = cache.category("jewelry").unwrap();
        assert_eq!(jewelry.trend_direction, TrendDirection::Falling);
        assert_eq!(jewelry.multiplier, 1.15);

        let leather = cache.category("leather").unwrap();
        assert!(!leather.data_available);
        assert!(leather.price_range.is_none());
        assert_eq!(leather.multiplier, 1.0);

        assert_eq!(cache.active_seasonal_multiplier(), 1.30);
        assert_eq!(cache.regional_trends.get("gujarat"), Some(&61.0));

        let trending: Vec<_> = cache.trending_list.iter().map(|t| t.category.as_str()).collect();
        assert_eq!(trending, vec!["jewelry", "pottery"]);

        // strictly sequential: categories, then seasonal, then regions
        assert_eq!(
            source.calls(),
            vec!["pottery", "jewelry", "leather", "diwali gifts", "holi colors", "gujarat handicraft"]
        );
    }

    #[tokio::test]
    async fn failed_category_keeps_previous_entry() {
        let store = store();
        MarketIntelligence::new(Arc::new(healthy_source()), store.clone(), test_config())
            .refresh()
            .await
            .unwrap();
        let before = store.current().await.unwrap();

        let flaky = ScriptedSource::new(&[
            ("pottery", Ok(vec![10.0, 10.0])),
            ("jewelry", Err(UpstreamError::malformed("html error page"))),
            ("leather", Ok(vec![30.0])),
            ("diwali gifts", Err(UpstreamError::transport("reset"))),
        ]);
        let summary = MarketIntelligence::new(Arc::new(flaky), store.clone(), test_config())
            .refresh()
            .await
            .unwrap();

        assert_eq!(summary.updated_categories, vec!["pottery", "leather"]);
        assert_eq!(summary.stale_partial_categories, vec!["jewelry"]);

        let after = store.current().await.unwrap();
        assert!(after.last_updated >= before.last_updated);
        assert_eq!(after.category("jewelry"), before.category("jewelry"));
        assert_eq!(after.category("pottery").unwrap().multiplier, 0.90);
        // seasonal failure carried over, missing script for holi also carried over
        assert_eq!(after.seasonal_entries, before.seasonal_entries);
    }

    #[tokio::test]
    async fn all_categories_failing_leaves_store_untouched() {
        let store = store();
        MarketIntelligence::new(Arc::new(healthy_source()), store.clone(), test_config())
            .refresh()
            .await
            .unwrap();
        let before = store.current().await.unwrap();

        let down = ScriptedSource::new(&[("diwali gifts", Ok(vec![99.0]))]);
        let err = MarketIntelligence::new(Arc::new(down), store.clone(), test_config())
            .refresh()
            .await
            .unwrap_err();

        assert!(matches!(err, RefreshError::AllCategoriesFailed));
        assert!(Arc::ptr_eq(&before, &store.current().await.unwrap()));
    }

    #[tokio::test]
    async fn all_categories_failing_skips_seasonal_and_regional_queries() {
        let down = Arc::new(ScriptedSource::new(&[("diwali gifts", Ok(vec![99.0]))]));
        let err = MarketIntelligence::new(down.clone(), store(), test_config())
            .refresh()
            .await
            .unwrap_err();

        assert!(matches!(err, RefreshError::AllCategoriesFailed));
        assert_eq!(down.calls(), vec!["pottery", "jewelry", "leather"]);
    }

    #[tokio::test]
    async fn failed_region_keeps_previous_regional_trend() {
        let store = store();
        MarketIntelligence::new(Arc::new(healthy_source()), store.clone(), test_config())
            .refresh()
            .await
            .unwrap();

        let no_region = ScriptedSource::new(&[
            ("pottery", Ok(vec![50.0])),
            ("jewelry", Ok(vec![50.0])),
            ("leather", Ok(vec![50.0])),
            ("gujarat handicraft", Err(UpstreamError::transport("reset"))),
        ]);
        let summary = MarketIntelligence::new(Arc::new(no_region), store.clone(), test_config())
            .refresh()
            .await
            .unwrap();

        assert_eq!(summary.regions_updated, 1);
        let after = store.current().await.unwrap();
        assert_eq!(after.regional_trends.get("gujarat"), Some(&61.0));
    }

    #[tokio::test]
    async fn refresh_spaces_calls_by_inter_call_delay() {
        let delay = Duration::from_millis(30);
        let source = Arc::new(healthy_source());
        let config = FetcherConfig {
            inter_call_delay: delay,
            ..test_config()
        };

        let started = std::time::Instant::now();
        MarketIntelligence::new(source.clone(), store(), config)
            .refresh()
            .await
            .unwrap();
        let elapsed = started.elapsed();

        let calls = source.calls().len() as u32;
        assert_eq!(calls, 6);
        assert!(elapsed >= delay * (calls - 1), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn first_refresh_failure_keeps_store_empty() {
        let store = store();
        let down = ScriptedSource::new(&[]);
        let err = MarketIntelligence::new(Arc::new(down), store.clone(), test_config())
            .refresh()
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::AllCategoriesFailed));
        assert!(store.current().await.is_none());
    }

    #[tokio::test]
    async fn slow_source_times_out_per_call() {
        let store = store();
        let slow = healthy_source().with_latency(Duration::from_millis(500));
        let config = FetcherConfig {
            call_timeout: Duration::from_millis(10),
            ..test_config()
        };

        let err = MarketIntelligence::new(Arc::new(slow), store.clone(), config)
            .refresh()
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::AllCategoriesFailed));
    }

    #[tokio::test]
    async fn concurrent_refresh_is_rejected() {
        let source = healthy_source().with_latency(Duration::from_millis(20));
        let fetcher = MarketIntelligence::new(Arc::new(source), store(), test_config());

        let (a, b) = tokio::join!(fetcher.refresh(), fetcher.refresh());
        let results = [a, b];

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(RefreshError::Conflict)))
            .count();
        assert_eq!((ok, conflicts), (1, 1));
        assert!(!fetcher.is_refreshing());

        // the flag is released, so a later refresh runs
        assert!(fetcher.refresh().await.is_ok());
    }

    #[test]
    fn falling_multiplier_never_drops_max_below_min() {
        let def = CategoryDefinition::new("odd", &["odd"], Some(PriceRange::new(100.0, 105.0, 102.0)), "low");
        let snapshot = category_snapshot(&def, &InterestSeries::new(vec![5.0]));
        assert_eq!(snapshot.multiplier, 0.90);
        assert_eq!(snapshot.price_range.unwrap().max, 100.0);
    }
}
