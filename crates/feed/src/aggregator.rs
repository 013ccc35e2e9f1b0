//! Feed aggregator - merges paginated upstream feeds into one entity set

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use screener_core::{AggregatorConfig, Entity};

use crate::source::FeedSource;

/// Result of one aggregation pass. A failing source never fails the
/// whole call; it is recorded here instead.
#[derive(Debug, Default)]
pub struct AggregateOutcome {
    /// Deduplicated entities, in no guaranteed order.
    pub entities: Vec<Entity>,
    /// One record per source that contributed nothing.
    pub failures: Vec<SourceFailure>,
    source_count: usize,
}

/// A source that failed to contribute to an aggregation pass.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

impl AggregateOutcome {
    /// True when every requested source failed.
    pub fn all_failed(&self) -> bool {
        self.source_count > 0 && self.failures.len() == self.source_count
    }
}

/// Merges N upstream feeds into a single deduplicated entity set.
pub struct FeedAggregator {
    config: AggregatorConfig,
}

impl FeedAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Fetch all sources concurrently and merge the results.
    ///
    /// Records are folded in fetch-completion order and deduplicated by
    /// lower-cased address with last-write-wins: the later record
    /// replaces the earlier one wholesale, no field-level merge.
    pub async fn aggregate(&self, sources: &[Arc<dyn FeedSource>]) -> AggregateOutcome {
        let timeout = Duration::from_millis(self.config.fetch_timeout_ms);
        let count = self.config.count_per_source;

        let mut fetches: FuturesUnordered<_> = sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                async move {
                    let name = source.name().to_string();
                    let result = tokio::time::timeout(timeout, source.fetch(count, None)).await;
                    (name, result)
                }
            })
            .collect();

        let mut merged: HashMap<String, Entity> = HashMap::new();
        let mut failures = Vec::new();

        while let Some((name, result)) = fetches.next().await {
            match result {
                Ok(Ok(page)) => {
                    let mut kept = 0usize;
                    for raw in page.entities {
                        if let Some(entity) = raw.normalize() {
                            merged.insert(entity.address_key(), entity);
                            kept += 1;
                        }
                    }
                    debug!("Source {} contributed {} records", name, kept);
                }
                Ok(Err(e)) => {
                    warn!("Source {} unavailable: {}", name, e);
                    failures.push(SourceFailure {
                        source: name,
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!("Source {} timed out after {:?}", name, timeout);
                    failures.push(SourceFailure {
                        source: name,
                        reason: format!("timed out after {}ms", timeout.as_millis()),
                    });
                }
            }
        }

        AggregateOutcome {
            entities: merged.into_values().collect(),
            failures,
            source_count: sources.len(),
        }
    }
}
