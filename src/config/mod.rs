use std::collections::BTreeMap;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;
use crate::market_data::types::TimeWindow;
use crate::state::market::PriceRange;

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// `RUST_LOG` after `.env` is loaded; falls back to `info`.
    pub log_level: String,
    pub cache_path: String,
    pub trends_endpoint: String,
    pub trends_geo: String,
    pub scoring_endpoint: String,
    pub scoring_api_key: Option<String>,
    pub scoring_model: String,
    pub upstream_timeout: Duration,
    pub inter_call_delay: Duration,
    pub refresh_interval: Duration,
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // dotenvy loads .env, but doesn't override already-set env vars
        dotenvy::dotenv().ok();

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let cache_path =
            std::env::var("MARKET_CACHE_PATH").unwrap_or_else(|_| "market_cache.json".to_string());
        let trends_endpoint = std::env::var("TRENDS_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:8085/trends".to_string());
        let trends_geo = std::env::var("TRENDS_GEO").unwrap_or_else(|_| "IN".to_string());
        let scoring_endpoint = std::env::var("SCORING_ENDPOINT")
            .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
        let scoring_api_key = std::env::var("SCORING_API_KEY").ok();
        let scoring_model =
            std::env::var("SCORING_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let upstream_timeout = Duration::from_secs(parse_env("UPSTREAM_TIMEOUT_SECS", 10)?);
        let inter_call_delay = Duration::from_millis(parse_env("INTER_CALL_DELAY_MS", 2_000)?);
        let refresh_interval = Duration::from_secs(parse_env("REFRESH_INTERVAL_SECS", 3_600)?);
        let metrics_port = parse_env("METRICS_PORT", 9000)?;

        Ok(Self {
            log_level,
            cache_path,
            trends_endpoint,
            trends_geo,
            scoring_endpoint,
            scoring_api_key,
            scoring_model,
            upstream_timeout,
            inter_call_delay,
            refresh_interval,
            metrics_port,
        })
    }

    /// Log filter from `log_level`, or `info` when the directive does not parse.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Fetcher settings with the production catalogue and this process's pacing.
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            geo: self.trends_geo.clone(),
            inter_call_delay: self.inter_call_delay,
            call_timeout: self.upstream_timeout,
            ..FetcherConfig::default()
        }
    }

    pub fn pricing_config(&self) -> PricingConfig {
        PricingConfig {
            upstream_timeout: self.upstream_timeout,
            ..PricingConfig::default()
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is not valid: {e}")),
        Err(_) => Ok(default),
    }
}

/// Catalogue markup bands: (category, min, max).
pub const CATALOGUE_RANGES: &[(&str, f64, f64)] = &[
    ("pottery", 100.0, 400.0),
    ("embroidery", 200.0, 600.0),
    ("jewelry", 300.0, 1000.0),
    ("textile", 150.0, 500.0),
    ("woodwork", 150.0, 450.0),
    ("metalwork", 250.0, 700.0),
    ("painting", 250.0, 800.0),
    ("leather", 150.0, 450.0),
];

/// Catalogue band for `category`, with `avg` at the midpoint.
pub fn catalogue_range(category: &str) -> Option<PriceRange> {
    CATALOGUE_RANGES
        .iter()
        .find(|(name, _, _)| *name == category)
        .map(|(_, min, max)| PriceRange::new(*min, *max, (min + max) / 2.0))
}

/// Weights, markup coefficients and thresholds used by the pricing engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingConfig {
    pub heritage_weight: f64,
    pub complexity_weight: f64,
    pub market_weight: f64,
    pub base_markup: f64,
    pub complexity_coefficient: f64,
    pub heritage_coefficient: f64,
    pub market_coefficient: f64,
    /// A snapshot older than this still prices, but marks market as degraded.
    pub staleness_threshold: chrono::Duration,
    /// Per-call timeout for the heritage lookup and the complexity model.
    pub upstream_timeout: Duration,
    /// Heuristic complexity points per matched technique group.
    pub technique_points: f64,
    /// Region name (lowercase) to baseline market score in [0,10].
    pub regional_bases: BTreeMap<String, f64>,
    pub default_regional_base: f64,
    /// Bands used when the snapshot is missing or does not know the category.
    pub base_ranges: BTreeMap<String, PriceRange>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let regional_bases = [
            ("rajasthan", 9.0),
            ("gujarat", 8.5),
            ("madhya pradesh", 8.0),
            ("kerala", 7.5),
            ("karnataka", 7.5),
            ("west bengal", 8.0),
            ("odisha", 7.0),
            ("tamil nadu", 7.5),
            ("uttar pradesh", 8.0),
        ]
        .into_iter()
        .map(|(name, base)| (name.to_string(), base))
        .collect();

        let base_ranges = CATALOGUE_RANGES
            .iter()
            .map(|(name, min, max)| (name.to_string(), PriceRange::new(*min, *max, (min + max) / 2.0)))
            .collect();

        Self {
            heritage_weight: 0.3,
            complexity_weight: 0.4,
            market_weight: 0.3,
            base_markup: 250.0,
            complexity_coefficient: 25.0,
            heritage_coefficient: 20.0,
            market_coefficient: 15.0,
            staleness_threshold: chrono::Duration::days(7),
            upstream_timeout: Duration::from_secs(10),
            technique_points: 1.25,
            regional_bases,
            default_regional_base: 5.0,
            base_ranges,
        }
    }
}

impl PricingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [self.heritage_weight, self.complexity_weight, self.market_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Invalid("weights must be finite and non-negative".into()));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(ConfigError::Invalid(format!("weights must sum to 1.0, got {sum}")));
        }

        let money = [
            self.base_markup,
            self.complexity_coefficient,
            self.heritage_coefficient,
            self.market_coefficient,
            self.technique_points,
        ];
        if money.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ConfigError::Invalid(
                "markup and coefficients must be finite and non-negative".into(),
            ));
        }

        if self.staleness_threshold <= chrono::Duration::zero() {
            return Err(ConfigError::Invalid("staleness_threshold must be positive".into()));
        }

        let bases = self
            .regional_bases
            .values()
            .chain(std::iter::once(&self.default_regional_base));
        for base in bases {
            if !(0.0..=10.0).contains(base) {
                return Err(ConfigError::Invalid(format!(
                    "regional base {base} outside [0, 10]"
                )));
            }
        }

        for (name, range) in &self.base_ranges {
            let usable = range.min.is_finite() && range.max.is_finite() && 0.0 <= range.min && range.min <= range.max;
            if !usable {
                return Err(ConfigError::Invalid(format!("base range for {name} is not a valid band")));
            }
        }

        Ok(())
    }

    pub fn base_range(&self, category: &str) -> Option<PriceRange> {
        self.base_ranges.get(category).copied()
    }

    /// Baseline for a free-form region string; matches the first known region it mentions.
    pub fn regional_base(&self, region: &str) -> f64 {
        let region = region.to_lowercase();
        self.regional_bases
            .iter()
            .find(|(name, _)| region.contains(name.as_str()))
            .map(|(_, base)| *base)
            .unwrap_or(self.default_regional_base)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDefinition {
    pub name: String,
    pub keywords: Vec<String>,
    /// `None` marks a category that is never clamped.
    pub base_range: Option<PriceRange>,
    pub demand: String,
}

impl CategoryDefinition {
    pub fn new(name: &str, keywords: &[&str], base_range: Option<PriceRange>, demand: &str) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            base_range,
            demand: demand.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionDefinition {
    pub name: String,
    pub keywords: Vec<String>,
}

/// What the market intelligence fetcher tracks and how fast it may query.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub categories: Vec<CategoryDefinition>,
    pub seasonal_keywords: Vec<String>,
    pub regions: Vec<RegionDefinition>,
    pub geo: String,
    pub category_window: TimeWindow,
    pub seasonal_window: TimeWindow,
    /// Minimum spacing between consecutive trend-source calls. Zero in tests.
    pub inter_call_delay: Duration,
    pub call_timeout: Duration,
    pub trending_threshold: f64,
    pub trending_limit: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        let categories = vec![
            CategoryDefinition::new(
                "pottery",
                &["indian pottery", "handmade pottery", "ceramic pottery india"],
                catalogue_range("pottery"),
                "medium",
            ),
            CategoryDefinition::new(
                "embroidery",
                &["indian embroidery", "hand embroidery", "chikankari"],
                catalogue_range("embroidery"),
                "high",
            ),
            CategoryDefinition::new(
                "jewelry",
                &["handmade jewelry india", "silver jewelry", "oxidized jewelry"],
                catalogue_range("jewelry"),
                "very_high",
            ),
            CategoryDefinition::new(
                "textile",
                &["handloom textile", "indian saree", "handwoven fabric"],
                catalogue_range("textile"),
                "high",
            ),
            CategoryDefinition::new(
                "woodwork",
                &["wooden handicraft", "wood carving india", "handmade furniture"],
                catalogue_range("woodwork"),
                "medium",
            ),
            CategoryDefinition::new(
                "metalwork",
                &["brass handicraft", "copper utensils", "metal craft india"],
                catalogue_range("metalwork"),
                "medium",
            ),
            CategoryDefinition::new(
                "painting",
                &["madhubani painting", "warli art", "indian folk art"],
                catalogue_range("painting"),
                "high",
            ),
            CategoryDefinition::new(
                "leather",
                &["leather handicraft", "handmade leather bag", "leather goods india"],
                catalogue_range("leather"),
                "medium",
            ),
        ];

        let seasonal_keywords = [
            "diwali gifts",
            "wedding gifts india",
            "holi colors",
            "raksha bandhan gifts",
            "christmas decorations india",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let regions = [
            ("rajasthan", ["rajasthan handicraft", "jaipur craft", "blue pottery"]),
            ("gujarat", ["gujarat handicraft", "kutch embroidery", "bandhani"]),
            ("kerala", ["kerala handicraft", "kathakali mask", "coir products"]),
        ]
        .into_iter()
        .map(|(name, keywords)| RegionDefinition {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        })
        .collect();

        Self {
            categories,
            seasonal_keywords,
            regions,
            geo: "IN".to_string(),
            category_window: TimeWindow::LastThreeMonths,
            seasonal_window: TimeWindow::LastMonth,
            inter_call_delay: Duration::from_secs(2),
            call_timeout: Duration::from_secs(10),
            trending_threshold: 60.0,
            trending_limit: 5,
        }
    }
}
