pub mod complexity;
pub mod heritage;
pub mod http_model;
pub mod traits;

pub use complexity::{ComplexityAssessor, ComplexityScore, ComplexitySource, ModelReply};
pub use heritage::{HeritageScore, HeritageScorer, HeritageSource, InMemoryHeritageStore};
pub use traits::{HeritageRecord, HeritageStore, ScoringModel};
