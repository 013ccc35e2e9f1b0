//! Token discovery and ranking engine
//!
//! Wires the feed aggregator, scorer, search index, and enrichment
//! cache into a single periodically-polled pipeline and exposes the
//! read API consumed by the presentation layer.

pub mod logging;
pub mod pipeline;
pub mod settings;

pub use logging::init_logging;
pub use pipeline::{CycleReport, DiscoveryEngine, EngineStatus};
pub use settings::{FeedSettings, OracleSettings, Settings};
