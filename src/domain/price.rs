use serde::{Deserialize, Serialize};

/// Where a price sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    /// DEX aggregator HTTP API.
    Primary,
    /// On-chain swap-quote contract.
    Fallback,
    /// Served from the TTL cache.
    Cache,
}

/// One observation of the tracked token's market state.
///
/// Immutable after creation; cache hits return a copy with
/// `source == Cache` so consumers can tell a fresh fetch from a replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSample {
    /// Price in native units (the value all analytics run on).
    pub price: f64,
    pub price_usd: f64,
    pub price_native: f64,
    /// Wall-clock ms at fetch time.
    pub timestamp: i64,
    pub volume_24h: f64,
    pub volume_6h: f64,
    pub volume_1h: f64,
    pub price_change_5m: f64,
    pub price_change_1h: f64,
    pub price_change_24h: f64,
    pub liquidity_usd: f64,
    pub market_cap: f64,
    pub buys_24h: u64,
    pub sells_24h: u64,
    pub buys_1h: u64,
    pub sells_1h: u64,
    pub source: PriceSource,
    pub token_symbol: String,
    pub token_name: String,
    pub token_address: String,
}

impl PriceSample {
    /// A minimal sample carrying only a price, used by the on-chain
    /// fallback path where the aggregator metadata is unavailable.
    pub fn bare(price: f64, token_address: &str, source: PriceSource) -> Self {
        Self {
            price,
            price_usd: 0.0,
            price_native: price,
            timestamp: super::now_ms(),
            volume_24h: 0.0,
            volume_6h: 0.0,
            volume_1h: 0.0,
            price_change_5m: 0.0,
            price_change_1h: 0.0,
            price_change_24h: 0.0,
            liquidity_usd: 0.0,
            market_cap: 0.0,
            buys_24h: 0,
            sells_24h: 0,
            buys_1h: 0,
            sells_1h: 0,
            source,
            token_symbol: String::new(),
            token_name: String::new(),
            token_address: token_address.to_lowercase(),
        }
    }

    /// Copy of this sample marked as cache-served.
    pub fn as_cached(&self) -> Self {
        let mut copy = self.clone();
        copy.source = PriceSource::Cache;
        copy
    }
}

/// Bonding-curve state for a launchpad token.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BondingProgress {
    /// Percent complete in [0, 100].
    pub progress: f64,
    pub is_graduated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_copy_flips_source_only() {
        let sample = PriceSample::bare(1.25, "0xAB", PriceSource::Primary);
        let cached = sample.as_cached();
        assert_eq!(cached.source, PriceSource::Cache);
        assert_eq!(cached.price, sample.price);
        assert_eq!(cached.timestamp, sample.timestamp);
    }

    #[test]
    fn test_bare_normalizes_address() {
        let sample = PriceSample::bare(1.0, "0xABCD", PriceSource::Fallback);
        assert_eq!(sample.token_address, "0xabcd");
    }
}
