use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scoring::{ComplexitySource, HeritageSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRequest {
    pub material_cost: f64,
    pub description: String,
    #[serde(default)]
    pub region: String,
    /// Detected from the description when absent.
    #[serde(default)]
    pub category: Option<String>,
    /// Key into the heritage store.
    #[serde(default)]
    pub artisan_id: Option<String>,
}

impl PricingRequest {
    pub fn new(material_cost: f64, description: impl Into<String>) -> Self {
        Self {
            material_cost,
            description: description.into(),
            region: String::new(),
            category: None,
            artisan_id: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_artisan(mut self, artisan_id: impl Into<String>) -> Self {
        self.artisan_id = Some(artisan_id.into());
        self
    }
}

/// Where a component score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    Record,
    Default,
    Model,
    Heuristic,
    Snapshot,
    Neutral,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::Record => "record",
            ScoreSource::Default => "default",
            ScoreSource::Model => "model",
            ScoreSource::Heuristic => "heuristic",
            ScoreSource::Snapshot => "snapshot",
            ScoreSource::Neutral => "neutral",
        }
    }
}

impl fmt::Display for ScoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HeritageSource> for ScoreSource {
    fn from(source: HeritageSource) -> Self {
        match source {
            HeritageSource::Record => ScoreSource::Record,
            HeritageSource::Default => ScoreSource::Default,
        }
    }
}

impl From<ComplexitySource> for ScoreSource {
    fn from(source: ComplexitySource) -> Self {
        match source {
            ComplexitySource::Model => ScoreSource::Model,
            ComplexitySource::Heuristic => ScoreSource::Heuristic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentScore {
    pub value: f64,
    pub source: ScoreSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentScores {
    pub heritage: ComponentScore,
    pub complexity: ComponentScore,
    pub market: ComponentScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradedSource {
    Heritage,
    Complexity,
    Market,
}

impl DegradedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradedSource::Heritage => "heritage",
            DegradedSource::Complexity => "complexity",
            DegradedSource::Market => "market",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SuggestedRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingResult {
    pub component_scores: ComponentScores,
    pub weighted_score: f64,
    /// Total markup before clamping.
    pub markup: f64,
    /// Markup actually added to the material cost.
    pub applied_markup: f64,
    pub final_price: f64,
    pub clamp_applied: bool,
    pub degraded_sources: BTreeSet<DegradedSource>,
    pub category: Option<String>,
    pub price_range: SuggestedRange,
    pub success_probability: f64,
    pub justification: String,
}

/// Lifecycle of one `compute_price` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingStage {
    Idle,
    Scoring,
    Composing,
    Validating,
    Done,
    Failed,
}
