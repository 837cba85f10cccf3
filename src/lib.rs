pub mod config;
pub mod error;
pub mod market_data;
pub mod metrics;
pub mod pricing;
pub mod scoring;
pub mod service;
pub mod state;

pub use config::{Config, FetcherConfig, PricingConfig};
pub use error::{ConfigError, PricingError, RefreshError, StoreError, UpstreamError};
pub use pricing::{PricingEngine, PricingRequest, PricingResult};
pub use service::PricingCore;
pub use state::market::MarketCache;
pub use state::market_cache::{TrendCacheHandle, TrendCacheStore};
