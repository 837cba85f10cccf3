use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use craft_pricing::config::Config;
use craft_pricing::market_data::adapters::HttpTrendSource;
use craft_pricing::market_data::fetcher::MarketIntelligence;
use craft_pricing::market_data::scheduler;
use craft_pricing::metrics;
use craft_pricing::pricing::PricingEngine;
use craft_pricing::scoring::http_model::ChatCompletionsModel;
use craft_pricing::scoring::{ComplexityAssessor, HeritageScorer, InMemoryHeritageStore};
use craft_pricing::service::PricingCore;
use craft_pricing::state::backend::JsonFileBackend;
use craft_pricing::state::market_cache::{TrendCacheHandle, TrendCacheStore};

fn init_tracing(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // config first so a RUST_LOG from .env reaches the filter
    let config = Config::from_env()?;
    init_tracing(&config);
    metrics::init_metrics_server(config.metrics_port)?;

    info!(cache_path = %config.cache_path, "craft-pricing-engine starting");

    let store: TrendCacheHandle =
        Arc::new(TrendCacheStore::new(Arc::new(JsonFileBackend::new(&config.cache_path))));
    store.load().await;

    let trends = HttpTrendSource::new(&config.trends_endpoint, config.upstream_timeout)
        .context("building trend source client")?;
    let intel = Arc::new(MarketIntelligence::new(
        Arc::new(trends),
        store.clone(),
        config.fetcher_config(),
    ));

    let pricing = config.pricing_config();
    let model = ChatCompletionsModel::new(
        &config.scoring_endpoint,
        config.scoring_api_key.clone(),
        &config.scoring_model,
        pricing.upstream_timeout,
    )
    .context("building scoring model client")?;
    if config.scoring_api_key.is_none() {
        warn!("SCORING_API_KEY not set, complexity will mostly use the keyword heuristic");
    }

    let heritage = HeritageScorer::new(Arc::new(InMemoryHeritageStore::new()), pricing.upstream_timeout);
    let complexity = ComplexityAssessor::new(Arc::new(model), pricing.upstream_timeout, pricing.technique_points);
    let staleness = pricing.staleness_threshold;
    let engine = PricingEngine::new(pricing, heritage, complexity, store.clone())?;
    let core = PricingCore::new(engine, intel.clone(), store.clone());

    let snapshot = core.get_market_snapshot().await;
    info!(
        last_updated = ?snapshot.last_updated,
        categories = snapshot.categories.len(),
        trending = snapshot.trending_list.len(),
        "pricing core ready"
    );

    let scheduler_handle = tokio::spawn(scheduler::run_refresh_scheduler(
        intel,
        store,
        config.refresh_interval,
        staleness,
    ));

    tokio::select! {
        res = scheduler_handle => {
            match res {
                Ok(Ok(())) => warn!("refresh scheduler exited"),
                Ok(Err(err)) => warn!(error = %err, "refresh scheduler returned error"),
                Err(err) => warn!(error = %err, "refresh scheduler task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
    }

    Ok(())
}
