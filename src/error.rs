use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by `compute_price`. Everything else is absorbed by a fallback.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PricingError {
    #[error("invalid pricing request: {0}")]
    Validation(String),
}

/// Failures talking to an external collaborator (trend source, scoring model,
/// heritage store). Never surfaced to pricing callers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed upstream response: {0}")]
    Malformed(String),

    #[error("upstream transport error: {0}")]
    Transport(String),
}

impl UpstreamError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        UpstreamError::Malformed(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        UpstreamError::Transport(msg.into())
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::Malformed(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot rejected: {0}")]
    Rejected(String),

    #[error("snapshot persistence failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("a market cache refresh is already in progress")]
    Conflict,

    #[error("every category fetch failed; market cache left untouched")]
    AllCategoriesFailed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
