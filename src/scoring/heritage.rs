use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::UpstreamError;
use crate::scoring::traits::{HeritageRecord, HeritageStore};

pub const NEUTRAL_HERITAGE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeritageSource {
    Record,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeritageScore {
    pub value: f64,
    pub source: HeritageSource,
}

impl HeritageScore {
    fn neutral() -> Self {
        Self {
            value: NEUTRAL_HERITAGE,
            source: HeritageSource::Default,
        }
    }
}

/// `5 + min(years/10, 3) + generations * 0.5`, clamped to [0, 10].
pub fn score_record(record: &HeritageRecord) -> f64 {
    let experience = (record.years_experience.max(0.0) / 10.0).min(3.0);
    let lineage = f64::from(record.lineage_generations) * 0.5;
    (NEUTRAL_HERITAGE + experience + lineage).clamp(0.0, 10.0)
}

pub struct HeritageScorer {
    store: Arc<dyn HeritageStore>,
    timeout: Duration,
}

impl HeritageScorer {
    pub fn new(store: Arc<dyn HeritageStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Missing id, missing record, lookup error and timeout all give the
    /// neutral midpoint so absent data never pulls the price down.
    pub async fn score(&self, id: Option<&str>) -> HeritageScore {
        let Some(id) = id else {
            return HeritageScore::neutral();
        };

        let lookup = match tokio::time::timeout(self.timeout, self.store.get(id)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
        };

        match lookup {
            Ok(Some(record)) => {
                let value = score_record(&record);
                debug!(id, value, "heritage scored from record");
                HeritageScore {
                    value,
                    source: HeritageSource::Record,
                }
            }
            Ok(None) => {
                debug!(id, "no heritage record, using neutral score");
                HeritageScore::neutral()
            }
            Err(err) => {
                warn!(id, error = %err, "heritage lookup failed, using neutral score");
                HeritageScore::neutral()
            }
        }
    }
}

/// Concurrent in-process heritage store.
#[derive(Debug, Default)]
pub struct InMemoryHeritageStore {
    records: DashMap<String, HeritageRecord>,
}

impl InMemoryHeritageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, record: HeritageRecord) {
        self.records.insert(id.into(), record);
    }
}

#[async_trait]
impl HeritageStore for InMemoryHeritageStore {
    async fn get(&self, id: &str) -> Result<Option<HeritageRecord>, UpstreamError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }
}
