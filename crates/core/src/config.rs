//! Configuration types
//!
//! Every tunable is a named constant with an independent override; the
//! defaults are the empirically tuned values, not derived truths.

use serde::{Deserialize, Serialize};

/// Composite score weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub cap_delta: f64,
    pub volume: f64,
    pub holders: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            cap_delta: 1.5,
            volume: 0.001,
            holders: 2.0,
        }
    }
}

/// Feed aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub count_per_source: usize,
    pub fetch_timeout_ms: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            count_per_source: 20,
            fetch_timeout_ms: 8_000,
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub min_query_len: usize,
    /// Fuzzy matches below this similarity contribute nothing.
    pub similarity_threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 15,
            min_query_len: 2,
            similarity_threshold: 0.7,
        }
    }
}

/// Price enrichment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    pub cache_ttl_ms: u64,
    /// Entries whose refresh keeps failing are dropped past this age.
    pub retention_ms: u64,
    pub batch_size: usize,
    pub fetch_timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 30_000,
            retention_ms: 300_000,
            batch_size: 3,
            fetch_timeout_ms: 8_000,
            max_retries: 1,
        }
    }
}

/// Outbound rate limit toward the price oracle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_ms: 60_000,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weights: ScoreWeights,
    pub aggregator: AggregatorConfig,
    pub search: SearchConfig,
    pub enrichment: EnrichmentConfig,
    pub rate_limit: RateLimitConfig,
    pub poll_interval_ms: u64,
    /// How many top-ranked entities are kept price-enriched per cycle.
    pub enrich_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            aggregator: AggregatorConfig::default(),
            search: SearchConfig::default(),
            enrichment: EnrichmentConfig::default(),
            rate_limit: RateLimitConfig::default(),
            poll_interval_ms: 10_000,
            enrich_limit: 20,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}
