//! Price enrichment against a rate-limited external oracle
//!
//! Features:
//! - Sliding-window rate limiting of outbound calls
//! - Per-entity TTL cache with stale-while-revalidate
//! - Sequential batches with bounded in-batch fan-out
//! - Cancellation of superseded in-flight fetches
//! - Change notifications only when data actually differs

pub mod cache;
pub mod oracle;
pub mod rate_limit;

pub use cache::{CacheEntry, CacheStats, EnrichmentCache, PriceChanged};
pub use oracle::{HttpPriceOracle, PriceOracle};
pub use rate_limit::RateLimiter;
