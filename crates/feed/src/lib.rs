//! Upstream feed aggregation
//!
//! Features:
//! - Concurrent fetch across N paginated feed sources
//! - Partial-failure tolerance (a dead source contributes nothing)
//! - Case-insensitive last-write-wins deduplication by address
//! - Snapshot diffing to suppress presentation churn

pub mod aggregator;
pub mod source;
pub mod stabilizer;

pub use aggregator::{AggregateOutcome, FeedAggregator, SourceFailure};
pub use source::{FeedPage, FeedSource, HttpFeedSource};
pub use stabilizer::{diff, FeedStabilizer, SnapshotDelta};
