use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl PriceRange {
    pub fn new(min: f64, max: f64, avg: f64) -> Self {
        Self { min, max, avg }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

/// Cached demand signal for one craft category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSnapshot {
    /// `None` is a "no range" category: pricing never clamps it.
    pub price_range: Option<PriceRange>,
    #[serde(rename = "demand")]
    pub demand_level: String,
    pub trend_score: f64,
    pub trend_direction: TrendDirection,
    pub multiplier: f64,
    /// False when the source returned no interest data at all.
    #[serde(default = "default_true")]
    pub data_available: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeasonalEntry {
    pub score: f64,
    pub multiplier: f64,
    pub active: bool,
}

impl SeasonalEntry {
    pub fn from_score(score: f64) -> Self {
        Self {
            score,
            multiplier: seasonal_multiplier(score),
            active: score >= SEASONAL_ACTIVE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingCraft {
    pub category: String,
    pub score: f64,
}

/// The full demand snapshot. Only ever replaced whole, never edited in place
/// once committed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketCache {
    #[serde(default, with = "crate::state::timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub categories: BTreeMap<String, TrendSnapshot>,
    #[serde(rename = "trending_crafts", default)]
    pub trending_list: Vec<TrendingCraft>,
    #[serde(rename = "seasonal_trends", default)]
    pub seasonal_entries: BTreeMap<String, SeasonalEntry>,
    #[serde(default)]
    pub regional_trends: BTreeMap<String, f64>,
}

impl MarketCache {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.last_updated.is_none() && self.categories.is_empty()
    }

    pub fn category(&self, name: &str) -> Option<&TrendSnapshot> {
        self.categories.get(name)
    }

    /// Trend multiplier for a category, neutral when the category is unknown.
    pub fn category_multiplier(&self, name: &str) -> f64 {
        self.category(name).map(|c| c.multiplier).unwrap_or(1.0)
    }

    /// The highest-scoring active seasonal entry, if any.
    pub fn active_seasonal(&self) -> Option<(&str, &SeasonalEntry)> {
        self.seasonal_entries
            .iter()
            .filter(|(_, entry)| entry.active)
            .max_by(|(_, a), (_, b)| a.score.total_cmp(&b.score))
            .map(|(keyword, entry)| (keyword.as_str(), entry))
    }

    pub fn active_seasonal_multiplier(&self) -> f64 {
        self.active_seasonal().map(|(_, e)| e.multiplier).unwrap_or(1.0)
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.is_stale_at(max_age, Utc::now())
    }

    /// True iff `now - last_updated > max_age`. A cache that was never committed is stale.
    pub fn is_stale_at(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match self.last_updated {
            Some(ts) => now.signed_duration_since(ts) > max_age,
            None => true,
        }
    }
}

pub const SEASONAL_ACTIVE_THRESHOLD: f64 = 30.0;

/// Category trend score (0-100) to price multiplier. Lower bounds are inclusive.
pub fn category_multiplier(trend_score: f64) -> f64 {
    match trend_score {
        s if s >= 80.0 => 1.20,
        s if s >= 65.0 => 1.15,
        s if s >= 50.0 => 1.05,
        s if s >= 35.0 => 1.00,
        s if s >= 20.0 => 0.95,
        _ => 0.90,
    }
}

pub fn seasonal_multiplier(score: f64) -> f64 {
    match score {
        s if s >= 70.0 => 1.30,
        s if s >= 50.0 => 1.20,
        s if s >= 30.0 => 1.10,
        _ => 1.00,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_multiplier_bands() {
        assert_eq!(category_multiplier(100.0), 1.20);
        assert_eq!(category_multiplier(80.0), 1.20);
        assert_eq!(category_multiplier(79.999), 1.15);
        assert_eq!(category_multiplier(65.0), 1.15);
        assert_eq!(category_multiplier(64.999), 1.05);
        assert_eq!(category_multiplier(50.0), 1.05);
        assert_eq!(category_multiplier(35.0), 1.00);
        assert_eq!(category_multiplier(20.0), 0.95);
        assert_eq!(category_multiplier(19.999), 0.90);
        assert_eq!(category_multiplier(0.0), 0.90);
    }

    #[test]
    fn seasonal_bands_and_activity() {
        assert_eq!(seasonal_multiplier(70.0), 1.30);
        assert_eq!(seasonal_multiplier(69.9), 1.20);
        assert_eq!(seasonal_multiplier(50.0), 1.20);
        assert_eq!(seasonal_multiplier(30.0), 1.10);
        assert_eq!(seasonal_multiplier(29.9), 1.00);

        assert!(SeasonalEntry::from_score(30.0).active);
        assert!(!SeasonalEntry::from_score(29.9).active);
    }

    #[test]
    fn dominant_seasonal_entry_is_highest_active_score() {
        let mut cache = MarketCache::empty();
        assert_eq!(cache.active_seasonal_multiplier(), 1.0);

        cache.seasonal_entries.insert("holi colors".into(), SeasonalEntry::from_score(45.0));
        cache.seasonal_entries.insert("diwali gifts".into(), SeasonalEntry::from_score(55.0));
        cache.seasonal_entries.insert("christmas".into(), SeasonalEntry::from_score(10.0));

        let (keyword, entry) = cache.active_seasonal().unwrap();
        assert_eq!(keyword, "diwali gifts");
        assert_eq!(entry.multiplier, 1.20);
        assert_eq!(cache.active_seasonal_multiplier(), 1.20);
    }

    #[test]
    fn staleness_boundary() {
        let now = Utc::now();
        let week = Duration::days(7);
        let mut cache = MarketCache::empty();

        cache.last_updated = Some(now - week + Duration::seconds(1));
        assert!(!cache.is_stale_at(week, now));

        cache.last_updated = Some(now - week - Duration::seconds(1));
        assert!(cache.is_stale_at(week, now));
    }

    #[test]
    fn never_committed_cache_is_stale() {
        assert!(MarketCache::empty().is_stale(Duration::days(7)));
    }

    #[test]
    fn persisted_document_uses_external_key_names() {
        let mut cache = MarketCache::empty();
        cache.categories.insert(
            "pottery".into(),
            TrendSnapshot {
                price_range: Some(PriceRange::new(100.0, 420.0, 250.0)),
                demand_level: "medium".into(),
                trend_score: 55.0,
                trend_direction: TrendDirection::Rising,
                multiplier: 1.05,
                data_available: true,
            },
        );
        cache.trending_list.push(TrendingCraft { category: "pottery".into(), score: 55.0 });
        cache.seasonal_entries.insert("diwali gifts".into(), SeasonalEntry::from_score(72.0));

        let doc = serde_json::to_value(&cache).unwrap();
        assert!(doc.get("last_updated").is_some());
        assert_eq!(doc["categories"]["pottery"]["demand"], "medium");
        assert_eq!(doc["categories"]["pottery"]["trend_direction"], "rising");
        assert_eq!(doc["categories"]["pottery"]["price_range"]["max"], 420.0);
        assert_eq!(doc["trending_crafts"][0]["category"], "pottery");
        assert_eq!(doc["seasonal_trends"]["diwali gifts"]["multiplier"], 1.3);
        assert_eq!(doc["seasonal_trends"]["diwali gifts"]["active"], true);
    }

    #[test]
    fn reads_document_without_optional_keys() {
        let raw = r#"{
            "last_updated": "2025-10-01T09:30:00.123456",
            "categories": {
                "leather": {
                    "price_range": null,
                    "demand": "medium",
                    "trend_score": 0,
                    "trend_direction": "stable",
                    "multiplier": 0.9
                }
            },
            "trending_crafts": [],
            "seasonal_trends": {}
        }"#;

        let cache: MarketCache = serde_json::from_str(raw).unwrap();
        let leather = cache.category("leather").unwrap();
        assert!(leather.price_range.is_none());
        assert!(leather.data_available);
        assert!(cache.regional_trends.is_empty());
        assert_eq!(
            cache.last_updated.unwrap().to_rfc3339(),
            "2025-10-01T09:30:00.123456+00:00"
        );
    }
}
