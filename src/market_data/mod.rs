pub mod adapters;
pub mod fetcher;
pub mod pacing;
pub mod scheduler;
pub mod traits;
pub mod types;

pub use fetcher::{MarketIntelligence, RefreshSummary};
pub use traits::TrendSource;
