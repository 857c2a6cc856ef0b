//! Price service.
//!
//! Process-wide construct (one per agent/hub process, passed as `Arc`)
//! that fronts the aggregator with a per-token TTL cache, coalesces
//! concurrent misses, and falls back to an on-chain swap quote for the
//! focal token when the aggregator is down or degraded.

use crate::chain::ChainClient;
use crate::config::Settings;
use crate::domain::{now_ms, BondingProgress, PriceSample, PriceSource};
use crate::error::Result;
use crate::market::dexscreener::DexScreener;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cache freshness window.
const CACHE_TTL_MS: i64 = 5_000;

/// Fallback quotes outside this band are treated as anomalous and dropped.
const FALLBACK_MIN_PRICE: f64 = 1e-7;
const FALLBACK_MAX_PRICE: f64 = 1e3;

#[derive(Default)]
struct CacheInner {
    /// Keyed by lowercased token address.
    samples: HashMap<String, PriceSample>,
    /// Last successful price for the focal token, any source.
    last_known_price: Option<f64>,
}

pub struct PriceService {
    screener: DexScreener,
    chain: Option<Arc<ChainClient>>,
    focal_key: String,
    cache: Mutex<CacheInner>,
    /// Per-key fetch tokens: concurrent misses for the same token await
    /// one upstream request instead of firing their own.
    fetch_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PriceService {
    pub fn new(settings: &Settings, chain: Option<Arc<ChainClient>>) -> Result<Self> {
        Ok(Self {
            screener: DexScreener::new()?,
            chain,
            focal_key: settings.token_key(),
            cache: Mutex::new(CacheInner::default()),
            fetch_locks: Mutex::new(HashMap::new()),
        })
    }

    /// The focal token's map key.
    pub fn focal_key(&self) -> &str {
        &self.focal_key
    }

    pub async fn last_known_price(&self) -> Option<f64> {
        self.cache.lock().await.last_known_price
    }

    /// Fetch the current sample for `token` (focal token when `None`).
    ///
    /// Cache hits inside the TTL return a copy with `source == Cache` and
    /// the original fetch timestamp. A miss takes the per-key fetch lock;
    /// callers that lose the race await the winner and read the refreshed
    /// cache.
    pub async fn fetch_price(&self, token: Option<&str>) -> Option<PriceSample> {
        let key = token
            .map(|t| t.to_lowercase())
            .unwrap_or_else(|| self.focal_key.clone());

        if let Some(sample) = self.cached_if_fresh(&key).await {
            return Some(sample);
        }

        let fetch_lock = self.fetch_lock_for(&key).await;
        let _guard = fetch_lock.lock().await;

        // A coalesced waiter finds the winner's result here.
        if let Some(sample) = self.cached_if_fresh(&key).await {
            return Some(sample);
        }

        match self.screener.fetch(&key).await {
            Ok(sample) => {
                self.store(&key, sample.clone()).await;
                return Some(sample);
            }
            Err(e) => {
                debug!(token = %key, error = %e, "aggregator fetch failed");
            }
        }

        // On-chain fallback is only wired for the focal token.
        if key == self.focal_key {
            if let Some(price) = self.fallback_quote().await {
                let sample = PriceSample::bare(price, &key, PriceSource::Fallback);
                self.store(&key, sample.clone()).await;
                return Some(sample);
            }
        }

        // All sources exhausted: a stale cache entry beats nothing.
        self.cached_any(&key).await
    }

    async fn cached_if_fresh(&self, key: &str) -> Option<PriceSample> {
        let inner = self.cache.lock().await;
        let sample = inner.samples.get(key)?;
        if now_ms() - sample.timestamp < CACHE_TTL_MS {
            Some(sample.as_cached())
        } else {
            None
        }
    }

    async fn cached_any(&self, key: &str) -> Option<PriceSample> {
        let inner = self.cache.lock().await;
        inner.samples.get(key).map(|s| s.as_cached())
    }

    async fn store(&self, key: &str, sample: PriceSample) {
        let mut inner = self.cache.lock().await;
        if key == self.focal_key && sample.price > 0.0 {
            inner.last_known_price = Some(sample.price);
        }
        inner.samples.insert(key.to_string(), sample);
    }

    async fn fetch_lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.fetch_locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Swap-quote fallback: price = 1 / amountOut(1 native -> token),
    /// rejected as anomalous outside (1e-7, 1e3].
    async fn fallback_quote(&self) -> Option<f64> {
        let chain = self.chain.as_ref()?;
        match chain.quote_tokens_per_native().await {
            Ok(amount_out) if amount_out > 0.0 => {
                let price = 1.0 / amount_out;
                if price <= FALLBACK_MIN_PRICE || price > FALLBACK_MAX_PRICE {
                    warn!(price, "fallback quote rejected as anomalous");
                    None
                } else {
                    debug!(price, "price served from on-chain quote");
                    Some(price)
                }
            }
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "fallback quote failed");
                None
            }
        }
    }

    /// Seed an initial history by repeated sampling. Takes the first sample
    /// immediately, then sleeps `interval` between slots until `count`
    /// samples were attempted. Failed slots are skipped, so the result may
    /// be shorter than `count`. This is the only temporal-spacing mechanism
    /// in the system; no historical backfill exists.
    pub async fn build_history(
        &self,
        token: Option<&str>,
        count: usize,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Vec<PriceSample> {
        let mut samples = Vec::with_capacity(count);
        for slot in 0..count {
            if slot > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            if let Some(sample) = self.fetch_price(token).await {
                samples.push(sample);
            }
        }
        debug!(
            collected = samples.len(),
            requested = count,
            "history primed"
        );
        samples
    }

    /// Bonding-curve progress for a launchpad token. Chain errors (or a
    /// missing chain client) degrade to `{0, false}`.
    pub async fn bonding_progress(&self, token: Option<&str>) -> BondingProgress {
        let Some(chain) = self.chain.as_ref() else {
            return BondingProgress::default();
        };
        chain.bonding_progress(token).await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_without_chain() -> PriceService {
        PriceService {
            screener: DexScreener::new().unwrap(),
            chain: None,
            focal_key: "0xduck".to_string(),
            cache: Mutex::new(CacheInner::default()),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_returns_copy_with_cache_source() {
        let service = service_without_chain();
        let sample = PriceSample::bare(2.5, "0xduck", PriceSource::Primary);
        let original_ts = sample.timestamp;
        service.store("0xduck", sample).await;

        let hit = service.cached_if_fresh("0xduck").await.unwrap();
        assert_eq!(hit.source, PriceSource::Cache);
        assert_eq!(hit.timestamp, original_ts);
        assert_eq!(hit.price, 2.5);
    }

    #[tokio::test]
    async fn test_stale_entry_not_fresh() {
        let service = service_without_chain();
        let mut sample = PriceSample::bare(2.5, "0xduck", PriceSource::Primary);
        sample.timestamp = now_ms() - CACHE_TTL_MS - 1;
        service.store("0xduck", sample).await;

        assert!(service.cached_if_fresh("0xduck").await.is_none());
        // But the stale entry still exists for degraded fallback.
        assert!(service.cached_any("0xduck").await.is_some());
    }

    #[tokio::test]
    async fn test_last_known_price_tracks_focal_only() {
        let service = service_without_chain();
        service
            .store("0xother", PriceSample::bare(9.0, "0xother", PriceSource::Primary))
            .await;
        assert_eq!(service.last_known_price().await, None);

        service
            .store("0xduck", PriceSample::bare(1.5, "0xduck", PriceSource::Primary))
            .await;
        assert_eq!(service.last_known_price().await, Some(1.5));
    }

    #[tokio::test]
    async fn test_fetch_lock_is_shared_per_key() {
        let service = service_without_chain();
        let a = service.fetch_lock_for("0xduck").await;
        let b = service.fetch_lock_for("0xduck").await;
        let c = service.fetch_lock_for("0xswan").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
