use std::collections::BTreeSet;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::config::PricingConfig;
use crate::error::{ConfigError, PricingError};
use crate::metrics::prometheus as metrics;
use crate::pricing::category::{detect_category, justification, success_probability};
use crate::pricing::types::{
    ComponentScore, ComponentScores, DegradedSource, PricingRequest, PricingResult, PricingStage,
    ScoreSource, SuggestedRange,
};
use crate::scoring::{ComplexityAssessor, ComplexitySource, HeritageScorer, HeritageSource};
use crate::state::market::{MarketCache, PriceRange};
use crate::state::market_cache::TrendCacheHandle;

/// Neutral market score when no snapshot has ever been committed.
pub const NEUTRAL_MARKET: f64 = 5.0;

/// Market component plus the band used later for clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketAssessment {
    pub score: ComponentScore,
    pub degraded: bool,
    pub band: Option<PriceRange>,
}

/// Output of the composing stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Composition {
    pub weighted_score: f64,
    pub total_markup: f64,
}

/// Weighted score and total markup from three component scores in [0, 10].
pub fn compose(config: &PricingConfig, heritage: f64, complexity: f64, market: f64) -> Composition {
    let weighted_score = (config.heritage_weight * heritage
        + config.complexity_weight * complexity
        + config.market_weight * market)
        .clamp(0.0, 10.0);

    let subtotal = config.base_markup
        + complexity * config.complexity_coefficient
        + heritage * config.heritage_coefficient
        + market * config.market_coefficient;

    Composition {
        weighted_score,
        total_markup: subtotal * (1.0 + weighted_score / 20.0),
    }
}

fn usable_band(range: PriceRange) -> Option<PriceRange> {
    let usable = range.min.is_finite() && range.max.is_finite() && 0.0 <= range.min && range.min <= range.max;
    if !usable {
        warn!(?range, "ignoring unusable price band");
    }
    usable.then_some(range)
}

/// Market score from the snapshot, or the neutral score when there is none.
///
/// The band comes from the snapshot's entry for the category. Without a
/// snapshot, or when the snapshot does not track the category, the configured
/// catalogue band applies instead.
pub fn assess_market(
    config: &PricingConfig,
    snapshot: Option<&MarketCache>,
    region: &str,
    category: Option<&str>,
) -> MarketAssessment {
    let catalogue_band = || category.and_then(|c| config.base_range(c)).and_then(usable_band);

    let Some(cache) = snapshot else {
        return MarketAssessment {
            score: ComponentScore {
                value: NEUTRAL_MARKET,
                source: ScoreSource::Neutral,
            },
            degraded: true,
            band: catalogue_band(),
        };
    };

    let regional = config.regional_base(region);
    let category_multiplier = category.map(|c| cache.category_multiplier(c)).unwrap_or(1.0);
    let seasonal = cache.active_seasonal_multiplier();
    let value = (regional * category_multiplier * seasonal).clamp(0.0, 10.0);

    // a tracked category with no range is never clamped
    let band = match category.and_then(|c| cache.category(c)) {
        Some(tracked) => tracked.price_range.and_then(usable_band),
        None => catalogue_band(),
    };

    MarketAssessment {
        score: ComponentScore {
            value,
            source: ScoreSource::Snapshot,
        },
        degraded: cache.is_stale(config.staleness_threshold),
        band,
    }
}

/// Turns a pricing request into a bounded price recommendation.
pub struct PricingEngine {
    config: PricingConfig,
    heritage: HeritageScorer,
    complexity: ComplexityAssessor,
    store: TrendCacheHandle,
}

impl PricingEngine {
    pub fn new(
        config: PricingConfig,
        heritage: HeritageScorer,
        complexity: ComplexityAssessor,
        store: TrendCacheHandle,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            heritage,
            complexity,
            store,
        })
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Only invalid input fails; every upstream problem resolves through a
    /// fallback and shows up in `degraded_sources`.
    #[instrument(skip(self, request), fields(region = %request.region, category = ?request.category))]
    pub async fn compute_price(&self, request: &PricingRequest) -> Result<PricingResult, PricingError> {
        let started = Instant::now();
        let mut stage = PricingStage::Idle;

        if let Err(err) = validate(request) {
            advance(&mut stage, PricingStage::Failed);
            warn!(error = %err, "pricing request rejected");
            metrics::record_pricing("rejected");
            return Err(err);
        }

        advance(&mut stage, PricingStage::Scoring);
        let category = request
            .category
            .as_deref()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .or_else(|| detect_category(&request.description).map(String::from));

        // independent lookups, joined before composing
        let (heritage, complexity, snapshot) = tokio::join!(
            self.heritage.score(request.artisan_id.as_deref()),
            self.complexity.score(&request.description),
            self.store.current(),
        );
        let market = assess_market(&self.config, snapshot.as_deref(), &request.region, category.as_deref());

        let mut degraded = BTreeSet::new();
        if heritage.source == HeritageSource::Default {
            degraded.insert(DegradedSource::Heritage);
        }
        if complexity.source == ComplexitySource::Heuristic {
            degraded.insert(DegradedSource::Complexity);
        }
        if market.degraded {
            degraded.insert(DegradedSource::Market);
        }

        advance(&mut stage, PricingStage::Composing);
        let composition = compose(&self.config, heritage.value, complexity.value, market.score.value);

        advance(&mut stage, PricingStage::Validating);
        let (applied_markup, clamp_applied) = match market.band {
            Some(band) => {
                let clamped = band.clamp(composition.total_markup);
                (clamped, clamped != composition.total_markup)
            }
            None => (composition.total_markup, false),
        };
        if clamp_applied {
            info!(
                category = ?category,
                markup = composition.total_markup,
                applied_markup,
                "markup clamped into market band"
            );
            metrics::record_clamp(category.as_deref().unwrap_or("unknown"));
        }

        let final_price = request.material_cost + applied_markup;
        let result = PricingResult {
            component_scores: ComponentScores {
                heritage: ComponentScore {
                    value: heritage.value,
                    source: heritage.source.into(),
                },
                complexity: ComponentScore {
                    value: complexity.value,
                    source: complexity.source.into(),
                },
                market: market.score,
            },
            weighted_score: composition.weighted_score,
            markup: composition.total_markup,
            applied_markup,
            final_price,
            clamp_applied,
            category,
            price_range: SuggestedRange {
                min: final_price * 0.9,
                max: final_price * 1.1,
            },
            success_probability: success_probability(composition.weighted_score),
            justification: justification(heritage.value, complexity.value, market.score.value),
            degraded_sources: degraded,
        };

        advance(&mut stage, PricingStage::Done);
        for source in &result.degraded_sources {
            metrics::record_degraded_source(source.as_str());
        }
        metrics::record_pricing("ok");
        metrics::record_pricing_latency_ms(started.elapsed().as_secs_f64() * 1_000.0);

        info!(
            heritage = result.component_scores.heritage.value,
            complexity = result.component_scores.complexity.value,
            market = result.component_scores.market.value,
            weighted = result.weighted_score,
            final_price = result.final_price,
            clamp_applied = result.clamp_applied,
            degraded = ?result.degraded_sources,
            "price computed"
        );

        Ok(result)
    }
}

fn validate(request: &PricingRequest) -> Result<(), PricingError> {
    if !request.material_cost.is_finite() || request.material_cost <= 0.0 {
        return Err(PricingError::Validation(format!(
            "material_cost must be a positive number, got {}",
            request.material_cost
        )));
    }
    Ok(())
}

fn advance(stage: &mut PricingStage, next: PricingStage) {
    debug!(from = ?*stage, to = ?next, "pricing stage");
    *stage = next;
}
