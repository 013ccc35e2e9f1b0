//! Error types

use thiserror::Error;

/// Feed aggregation errors
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("source {name} unavailable: {reason}")]
    SourceUnavailable { name: String, reason: String },

    #[error("source {0} timed out")]
    SourceTimeout(String),

    #[error("all feed sources failed")]
    AllSourcesFailed,
}

/// Price enrichment errors
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("price oracle rate limited")]
    RateLimited,

    #[error("oracle returned status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("price fetch timed out")]
    Timeout,

    #[error("no pair data for {0}")]
    NoData(String),
}

impl EnrichmentError {
    /// Transient failures are worth a retry; a 429 or an empty payload
    /// is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EnrichmentError::Transport(_) | EnrichmentError::Timeout | EnrichmentError::Status(_)
        ) && !matches!(self, EnrichmentError::Status(429))
    }
}

/// Search query errors
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query below minimum length of {min}")]
    TooShort { min: usize },
}

/// Result type aliases
pub type FeedResult<T> = Result<T, FeedError>;
pub type EnrichmentResult<T> = Result<T, EnrichmentError>;
