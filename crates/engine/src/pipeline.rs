//! Discovery pipeline driver
//!
//! One logical pipeline per polling tick: Fetch -> Aggregate -> Score ->
//! Enrich -> Diff. Network failures at the edges degrade to the last
//! known good state; the pure middle stages cannot fail on validated
//! input.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use screener_core::{CycleStage, EngineConfig, PriceData, ScoredEntity};
use screener_enrichment::{EnrichmentCache, PriceChanged, PriceOracle, RateLimiter};
use screener_feed::{FeedAggregator, FeedSource, FeedStabilizer, SnapshotDelta};
use screener_ranking::{SearchIndex, TrendingScorer};

/// Engine-wide status, readable at any time.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub stage: CycleStage,
    pub degraded: bool,
    pub rate_limited: bool,
    pub last_cycle: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub cycle_count: u64,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            stage: CycleStage::Idle,
            degraded: false,
            rate_limited: false,
            last_cycle: None,
            last_error: None,
            cycle_count: 0,
        }
    }
}

/// Summary of one pipeline cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub entity_count: usize,
    pub changed_count: usize,
    pub failed_sources: usize,
    pub degraded: bool,
    pub duration_ms: u64,
}

/// Token discovery and ranking engine.
///
/// Owns the only cross-call shared mutable state (ranked snapshot,
/// search index, enrichment cache); every update is a whole-value swap,
/// so readers never observe a torn write.
pub struct DiscoveryEngine {
    config: EngineConfig,
    sources: Vec<Arc<dyn FeedSource>>,
    aggregator: FeedAggregator,
    scorer: TrendingScorer,
    index: RwLock<SearchIndex>,
    cache: Arc<EnrichmentCache>,
    stabilizer: Mutex<FeedStabilizer>,
    ranked: RwLock<Arc<Vec<ScoredEntity>>>,
    status: RwLock<EngineStatus>,
    delta_tx: broadcast::Sender<SnapshotDelta>,
}

impl DiscoveryEngine {
    pub fn new(
        config: EngineConfig,
        sources: Vec<Arc<dyn FeedSource>>,
        oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        let limiter = RateLimiter::new(config.rate_limit);
        let cache = Arc::new(EnrichmentCache::new(
            oracle,
            limiter,
            config.enrichment.clone(),
        ));
        let (delta_tx, _) = broadcast::channel(64);

        Self {
            aggregator: FeedAggregator::new(config.aggregator.clone()),
            scorer: TrendingScorer::new(config.weights),
            index: RwLock::new(SearchIndex::build(&[], config.search.clone())),
            cache,
            stabilizer: Mutex::new(FeedStabilizer::new()),
            ranked: RwLock::new(Arc::new(Vec::new())),
            status: RwLock::new(EngineStatus::default()),
            delta_tx,
            config,
            sources,
        }
    }

    /// Run the periodic pipeline until shutdown is signalled.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) {
        info!(
            "Starting discovery engine: {} sources, poll every {:?}",
            self.sources.len(),
            self.config.poll_interval()
        );

        let refresh_handle = Arc::clone(&self.cache).spawn_refresh_loop(self.config.poll_interval());
        let mut interval = tokio::time::interval(self.config.poll_interval());

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.run_cycle().await;
                    if report.degraded {
                        warn!(
                            "Cycle degraded: {}/{} sources failed, serving last known good",
                            report.failed_sources,
                            self.sources.len()
                        );
                    } else {
                        info!(
                            "Cycle complete: {} entities, {} changed in {}ms",
                            report.entity_count, report.changed_count, report.duration_ms
                        );
                    }
                }
                _ = &mut shutdown => {
                    info!("Engine shutdown requested");
                    break;
                }
            }
        }

        refresh_handle.abort();
    }

    /// Run a single pipeline cycle (also the manual-refresh entry point).
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();

        self.set_stage(CycleStage::Fetching);
        let outcome = self.aggregator.aggregate(&self.sources).await;
        let failed_sources = outcome.failures.len();

        self.set_stage(CycleStage::Aggregating);
        if outcome.all_failed() {
            // Serve the last known good state rather than an empty set
            let mut status = self.status.write();
            status.stage = CycleStage::Idle;
            status.degraded = true;
            status.last_error = Some(screener_core::FeedError::AllSourcesFailed.to_string());

            return CycleReport {
                entity_count: self.ranked.read().len(),
                changed_count: 0,
                failed_sources,
                degraded: true,
                duration_ms: start.elapsed().as_millis() as u64,
            };
        }

        self.set_stage(CycleStage::Scoring);
        let ranked = Arc::new(self.scorer.score(&outcome.entities));
        *self.ranked.write() = Arc::clone(&ranked);
        self.index.write().update(&outcome.entities);

        self.set_stage(CycleStage::Enriching);
        let visible: Vec<String> = ranked
            .iter()
            .take(self.config.enrich_limit)
            .map(|s| s.entity.address_key())
            .collect();
        self.cache.set_watched(visible.clone());
        self.cache.get_prices(&visible).await;

        self.set_stage(CycleStage::Diffing);
        let entities: Vec<screener_core::Entity> =
            ranked.iter().map(|s| s.entity.clone()).collect();
        let delta = self.stabilizer.lock().observe(&entities);
        let changed_count = delta.changed.len();
        if !delta.is_empty() {
            // No receivers is fine; the delta is simply dropped
            let _ = self.delta_tx.send(delta);
        } else {
            debug!("Snapshot unchanged, nothing republished");
        }

        {
            let mut status = self.status.write();
            status.stage = CycleStage::Idle;
            status.degraded = false;
            status.rate_limited = self.cache.is_rate_limited();
            status.last_cycle = Some(Utc::now());
            status.last_error = None;
            status.cycle_count += 1;
        }

        CycleReport {
            entity_count: ranked.len(),
            changed_count,
            failed_sources,
            degraded: false,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Top-ranked entities, best first.
    pub fn get_ranked(&self, limit: usize) -> Vec<ScoredEntity> {
        let ranked = self.ranked.read();
        ranked.iter().take(limit).cloned().collect()
    }

    /// Free-text search over the current entity set. A zero `limit`
    /// means the configured default.
    ///
    /// Queries below the minimum length yield an empty result, not an
    /// error: there is nothing sensible to match them against.
    pub fn search(&self, query: &str, limit: usize) -> Vec<ScoredEntity> {
        if query.trim().chars().count() < self.config.search.min_query_len {
            debug!("Query {:?} below minimum length, returning empty", query);
            return Vec::new();
        }

        let limit = if limit == 0 {
            self.config.search.default_limit
        } else {
            limit
        };
        self.index.read().search(query, limit)
    }

    /// Price data for the given addresses, fetched through the cache.
    pub async fn get_enriched(&self, addresses: &[String]) -> HashMap<String, PriceData> {
        self.cache.get_prices(addresses).await
    }

    /// Diffed snapshot deltas, one per cycle that actually changed.
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotDelta> {
        self.delta_tx.subscribe()
    }

    /// Per-entry price change notifications from the enrichment cache.
    pub fn price_updates(&self) -> broadcast::Receiver<PriceChanged> {
        self.cache.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        self.status.read().clone()
    }

    fn set_stage(&self, stage: CycleStage) {
        self.status.write().stage = stage;
        debug!("Pipeline stage: {}", stage.name());
    }
}
