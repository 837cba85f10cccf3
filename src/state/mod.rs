pub mod backend;
pub mod market;
pub mod market_cache;
pub mod timestamp;
