use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;

/// External generative model: prompt in, free-form text out.
#[async_trait]
pub trait ScoringModel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, UpstreamError>;
}

/// Persisted heritage facts about an artisan or product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeritageRecord {
    pub years_experience: f64,
    pub lineage_generations: u32,
}

/// Key-value lookup for heritage records.
#[async_trait]
pub trait HeritageStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<HeritageRecord>, UpstreamError>;
}
