//! Per-entity price cache with stale-while-revalidate semantics
//!
//! Entries are replaced wholesale, never mutated field-by-field, so
//! concurrent readers cannot observe a torn write. Stale data keeps
//! being served while a refresh is attempted; entries disappear only
//! after refreshes have failed past the retention window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use screener_core::{EnrichmentConfig, EnrichmentError, PriceData};

use crate::oracle::PriceOracle;
use crate::rate_limit::RateLimiter;

const BACKOFF_BASE_MS: u64 = 250;
const BACKOFF_JITTER_MS: u64 = 100;

/// Timestamped cache entry.
#[derive(Debug, Clone, Copy)]
pub struct CacheEntry {
    pub data: PriceData,
    pub fetched_at: Instant,
}

impl CacheEntry {
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Emitted when a refresh actually changed an entry. Unchanged data is
/// never republished.
#[derive(Debug, Clone)]
pub struct PriceChanged {
    pub address: String,
    pub data: PriceData,
}

/// TTL cache over the price oracle, with batching, rate limiting,
/// centralized retry, and cancellation of superseded fetches.
pub struct EnrichmentCache {
    entries: DashMap<String, CacheEntry>,
    oracle: Arc<dyn PriceOracle>,
    limiter: RateLimiter,
    config: EnrichmentConfig,
    rate_limited: AtomicBool,
    watched: Mutex<Vec<String>>,
    /// Monotonic call generation; bumping it cancels older in-flight
    /// refreshes.
    supersede_tx: watch::Sender<u64>,
    change_tx: broadcast::Sender<PriceChanged>,
}

impl EnrichmentCache {
    pub fn new(oracle: Arc<dyn PriceOracle>, limiter: RateLimiter, config: EnrichmentConfig) -> Self {
        let (change_tx, _) = broadcast::channel(256);
        let (supersede_tx, _) = watch::channel(0u64);

        Self {
            entries: DashMap::new(),
            oracle,
            limiter,
            config,
            rate_limited: AtomicBool::new(false),
            watched: Mutex::new(Vec::new()),
            supersede_tx,
            change_tx,
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_millis(self.config.cache_ttl_ms)
    }

    fn retention(&self) -> Duration {
        Duration::from_millis(self.config.retention_ms)
    }

    /// True while the oracle is throttling us. Stale data is still
    /// served; this flag just tells the caller why it is stale.
    pub fn is_rate_limited(&self) -> bool {
        self.rate_limited.load(Ordering::Relaxed)
    }

    /// Observe entry changes. Only actual differences are emitted.
    pub fn subscribe(&self) -> broadcast::Receiver<PriceChanged> {
        self.change_tx.subscribe()
    }

    /// Cache-only read; never touches the network.
    pub fn snapshot(&self, addresses: &[String]) -> HashMap<String, PriceData> {
        addresses
            .iter()
            .filter_map(|address| {
                let key = address.to_lowercase();
                let data = self.entries.get(&key).map(|e| e.data)?;
                Some((key, data))
            })
            .collect()
    }

    /// Get price data for the given addresses.
    ///
    /// Fresh entries are served without a network call. Missing and
    /// stale entries are fetched in batches; stale values remain in the
    /// returned map if their refresh fails. A new call cancels the
    /// previous call's in-flight fetches: the caller only wants the
    /// latest snapshot, not a queue of superseded ones.
    pub async fn get_prices(&self, addresses: &[String]) -> HashMap<String, PriceData> {
        self.evict_expired();

        let ttl = self.ttl();
        let to_fetch: Vec<String> = addresses
            .iter()
            .map(|a| a.to_lowercase())
            .filter(|key| {
                self.entries
                    .get(key)
                    .map_or(true, |entry| !entry.is_fresh(ttl))
            })
            .collect();

        if !to_fetch.is_empty() {
            self.refresh_until_superseded(&to_fetch).await;
        }

        self.snapshot(addresses)
    }

    /// Run a refresh, cancelling it the moment a newer call bumps the
    /// generation. Cancellation drops the in-flight fetch futures, so a
    /// superseded response can never overwrite a newer cache entry.
    async fn refresh_until_superseded(&self, addresses: &[String]) {
        let mut generation = 0u64;
        self.supersede_tx.send_modify(|g| {
            *g += 1;
            generation = *g;
        });
        let mut superseded = self.supersede_tx.subscribe();

        let refresh = self.refresh_addresses(addresses);
        tokio::pin!(refresh);

        loop {
            tokio::select! {
                _ = &mut refresh => break,
                changed = superseded.changed() => {
                    if changed.is_err() || *superseded.borrow() > generation {
                        debug!("Refresh superseded by a newer call");
                        break;
                    }
                }
            }
        }
    }

    /// Re-fetch a set of addresses in sequential batches of
    /// `batch_size`, each address concurrently within its batch.
    async fn refresh_addresses(&self, addresses: &[String]) {
        for batch in addresses.chunks(self.config.batch_size.max(1)) {
            join_all(batch.iter().map(|address| self.fetch_one(address))).await;
        }
    }

    /// One rate-limited, retried fetch. Failure leaves any previous
    /// entry untouched; there is no negative caching.
    async fn fetch_one(&self, address: &str) {
        let timeout = Duration::from_millis(self.config.fetch_timeout_ms);

        for attempt in 0..=self.config.max_retries {
            self.limiter.acquire().await;

            let result = match tokio::time::timeout(timeout, self.oracle.fetch(address)).await {
                Ok(result) => result,
                Err(_) => Err(EnrichmentError::Timeout),
            };

            match result {
                Ok(data) => {
                    self.rate_limited.store(false, Ordering::Relaxed);
                    self.store(address, data);
                    return;
                }
                Err(EnrichmentError::RateLimited) => {
                    warn!("Oracle rate limited, serving stale data for {}", address);
                    self.rate_limited.store(true, Ordering::Relaxed);
                    return;
                }
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let backoff = Duration::from_millis(
                        BACKOFF_BASE_MS * 2u64.pow(attempt)
                            + rand::thread_rng().gen_range(0..BACKOFF_JITTER_MS),
                    );
                    debug!(
                        "Fetch for {} failed ({}), retrying in {:?}",
                        address, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!("Price fetch for {} failed: {}", address, e);
                    return;
                }
            }
        }
    }

    /// Whole-entry replacement plus change notification when one of the
    /// published fields actually differs.
    fn store(&self, address: &str, data: PriceData) {
        let key = address.to_lowercase();
        let changed = match self.entries.get(&key) {
            Some(existing) => existing.data.differs_from(&data),
            None => true,
        };

        self.entries.insert(
            key.clone(),
            CacheEntry {
                data,
                fetched_at: Instant::now(),
            },
        );

        if changed {
            let _ = self.change_tx.send(PriceChanged { address: key, data });
        }
    }

    /// Drop entries whose last successful fetch is past the retention
    /// window. A healthy entry never gets here: every success restamps
    /// `fetched_at`.
    fn evict_expired(&self) {
        let retention = self.retention();
        self.entries.retain(|_, entry| entry.fetched_at.elapsed() < retention);
    }

    /// Replace the address set the background refresher keeps warm.
    pub fn set_watched(&self, addresses: Vec<String>) {
        *self.watched.lock() = addresses.into_iter().map(|a| a.to_lowercase()).collect();
    }

    /// Periodic stale-while-revalidate loop over the watched set.
    pub fn spawn_refresh_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The immediate first tick would race the initial pipeline run
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let watched = self.watched.lock().clone();
                if watched.is_empty() {
                    continue;
                }

                debug!("Background refresh of {} watched addresses", watched.len());
                self.get_prices(&watched).await;
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let ttl = self.ttl();
        let fresh = self
            .entries
            .iter()
            .filter(|e| e.value().is_fresh(ttl))
            .count();

        CacheStats {
            entry_count: self.entries.len(),
            fresh_count: fresh,
            rate_limited: self.is_rate_limited(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entry_count: usize,
    pub fresh_count: usize,
    pub rate_limited: bool,
}

impl std::fmt::Debug for EnrichmentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentCache")
            .field("entries", &self.entries.len())
            .field("rate_limited", &self.is_rate_limited())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screener_core::{EnrichmentResult, RateLimitConfig};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Price(f64),
        RateLimited,
        Fail,
        SlowPrice(f64, Duration),
    }

    struct MockOracle {
        behavior: Mutex<Behavior>,
        calls: AtomicUsize,
        concurrent: AtomicUsize,
        max_concurrent: AtomicUsize,
    }

    impl MockOracle {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior: Mutex::new(behavior),
                calls: AtomicUsize::new(0),
                concurrent: AtomicUsize::new(0),
                max_concurrent: AtomicUsize::new(0),
            })
        }

        fn set_behavior(&self, behavior: Behavior) {
            *self.behavior.lock() = behavior;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl PriceOracle for MockOracle {
        async fn fetch(&self, address: &str) -> EnrichmentResult<PriceData> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);

            // Hold the slot across a suspension point so overlapping
            // fetches actually overlap.
            tokio::time::sleep(Duration::from_millis(10)).await;

            let behavior = *self.behavior.lock();
            let result = match behavior {
                Behavior::Price(p) => Ok(PriceData {
                    price_usd: p,
                    volume_h24: 100.0,
                    price_change_h24: 1.0,
                }),
                Behavior::SlowPrice(p, delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(PriceData {
                        price_usd: p,
                        volume_h24: 100.0,
                        price_change_h24: 1.0,
                    })
                }
                Behavior::RateLimited => Err(EnrichmentError::RateLimited),
                Behavior::Fail => Err(EnrichmentError::Transport(format!("{address}: reset"))),
            };

            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn cache_with(oracle: Arc<MockOracle>) -> Arc<EnrichmentCache> {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        Arc::new(EnrichmentCache::new(
            oracle,
            limiter,
            EnrichmentConfig {
                max_retries: 0,
                ..Default::default()
            },
        ))
    }

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_serves_without_network_call() {
        let oracle = MockOracle::new(Behavior::Price(1.0));
        let cache = cache_with(Arc::clone(&oracle));
        let addresses = addrs(&["0xAA"]);

        let first = cache.get_prices(&addresses).await;
        assert_eq!(first.len(), 1);
        assert_eq!(oracle.calls(), 1);

        // Still fresh: zero additional calls
        let second = cache.get_prices(&addresses).await;
        assert_eq!(second.len(), 1);
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_triggers_refetch() {
        let oracle = MockOracle::new(Behavior::Price(1.0));
        let cache = cache_with(Arc::clone(&oracle));
        let addresses = addrs(&["0xaa"]);

        cache.get_prices(&addresses).await;
        tokio::time::advance(Duration::from_millis(31_000)).await;
        cache.get_prices(&addresses).await;

        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_serves_stale_and_sets_flag() {
        let oracle = MockOracle::new(Behavior::Price(1.0));
        let cache = cache_with(Arc::clone(&oracle));
        let addresses = addrs(&["0xaa", "0xbb"]);

        let primed = cache.get_prices(&addresses).await;
        assert_eq!(primed.len(), 2);
        assert!(!cache.is_rate_limited());

        oracle.set_behavior(Behavior::RateLimited);
        tokio::time::advance(Duration::from_millis(31_000)).await;

        let throttled = cache.get_prices(&addresses).await;
        assert_eq!(throttled.len(), 2);
        assert_eq!(throttled["0xaa"].price_usd, 1.0);
        assert!(cache.is_rate_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_bound_concurrency() {
        let oracle = MockOracle::new(Behavior::Price(1.0));
        let cache = cache_with(Arc::clone(&oracle));

        let addresses: Vec<String> = (0..10).map(|i| format!("0x{i:02}")).collect();
        let result = cache.get_prices(&addresses).await;

        assert_eq!(result.len(), 10);
        assert_eq!(oracle.calls(), 10);
        // Batch size 3 bounds the outbound fan-out
        assert!(oracle.max_concurrent.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_retains_previous_entry() {
        let oracle = MockOracle::new(Behavior::Price(7.0));
        let cache = cache_with(Arc::clone(&oracle));
        let addresses = addrs(&["0xaa"]);

        cache.get_prices(&addresses).await;
        oracle.set_behavior(Behavior::Fail);
        tokio::time::advance(Duration::from_millis(31_000)).await;

        let result = cache.get_prices(&addresses).await;
        assert_eq!(result["0xaa"].price_usd, 7.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_evicts_unrefreshable_entries() {
        let oracle = MockOracle::new(Behavior::Price(7.0));
        let cache = cache_with(Arc::clone(&oracle));
        let addresses = addrs(&["0xaa"]);

        cache.get_prices(&addresses).await;
        oracle.set_behavior(Behavior::Fail);

        // Keeps failing past the retention window
        tokio::time::advance(Duration::from_millis(301_000)).await;
        let result = cache.get_prices(&addresses).await;
        assert!(result.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_notification_only_on_difference() {
        let oracle = MockOracle::new(Behavior::Price(1.0));
        let cache = cache_with(Arc::clone(&oracle));
        let addresses = addrs(&["0xaa"]);
        let mut changes = cache.subscribe();

        cache.get_prices(&addresses).await;
        let first = changes.try_recv().expect("new entry must notify");
        assert_eq!(first.data.price_usd, 1.0);

        // Same data on refresh: no notification
        tokio::time::advance(Duration::from_millis(31_000)).await;
        cache.get_prices(&addresses).await;
        assert!(changes.try_recv().is_err());

        // Changed data: notification
        oracle.set_behavior(Behavior::Price(2.0));
        tokio::time::advance(Duration::from_millis(31_000)).await;
        cache.get_prices(&addresses).await;
        let second = changes.try_recv().expect("changed entry must notify");
        assert_eq!(second.data.price_usd, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_fetch_never_overwrites() {
        let oracle = MockOracle::new(Behavior::SlowPrice(1.0, Duration::from_secs(5)));
        let cache = cache_with(Arc::clone(&oracle));
        let addresses = addrs(&["0xaa"]);

        let slow = {
            let cache = Arc::clone(&cache);
            let addresses = addresses.clone();
            tokio::spawn(async move { cache.get_prices(&addresses).await })
        };
        // Let the slow fetch get in flight
        tokio::time::advance(Duration::from_millis(1)).await;

        oracle.set_behavior(Behavior::Price(2.0));
        let fresh = cache.get_prices(&addresses).await;
        assert_eq!(fresh["0xaa"].price_usd, 2.0);

        // The superseded call was cancelled; it must not have written 1.0
        let stale = slow.await.unwrap();
        assert_ne!(stale.get("0xaa").map(|d| d.price_usd), Some(1.0));
        assert_eq!(cache.snapshot(&addresses)["0xaa"].price_usd, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_transient_failure() {
        let oracle = MockOracle::new(Behavior::Fail);
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let cache = Arc::new(EnrichmentCache::new(
            Arc::clone(&oracle) as Arc<dyn PriceOracle>,
            limiter,
            EnrichmentConfig {
                max_retries: 1,
                ..Default::default()
            },
        ));
        let addresses = addrs(&["0xaa"]);

        let empty = cache.get_prices(&addresses).await;
        assert!(empty.is_empty());
        assert_eq!(oracle.calls(), 2, "one retry after the transient failure");
    }

    #[tokio::test(start_paused = true)]
    async fn test_watched_set_is_normalized() {
        let oracle = MockOracle::new(Behavior::Price(1.0));
        let cache = cache_with(oracle);

        cache.set_watched(vec!["0xAA".to_string()]);
        assert_eq!(*cache.watched.lock(), vec!["0xaa".to_string()]);
    }
}
