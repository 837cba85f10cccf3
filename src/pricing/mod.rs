pub mod category;
pub mod engine;
pub mod types;

pub use engine::{PricingEngine, assess_market, compose};
pub use types::{
    ComponentScore, ComponentScores, DegradedSource, PricingRequest, PricingResult, ScoreSource,
};
