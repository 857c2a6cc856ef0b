//! DEX aggregator HTTP source.
//!
//! Response model for `GET /latest/dex/tokens/{address}`. Numeric fields
//! arrive as either JSON numbers or strings depending on the pair, so the
//! price fields deserialize through a lenient helper.

use crate::domain::{now_ms, PriceSample, PriceSource};
use crate::error::{DuckError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const BASE_URL: &str = "https://api.dexscreener.com/latest/dex/tokens";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price_native: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price_usd: f64,
    #[serde(default)]
    pub volume: Windowed,
    #[serde(default)]
    pub price_change: Windowed,
    #[serde(default)]
    pub txns: Txns,
    #[serde(default)]
    pub liquidity: Liquidity,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub fdv: Option<f64>,
    #[serde(default)]
    pub pair_address: String,
    #[serde(default)]
    pub base_token: TokenInfo,
    #[serde(default)]
    pub quote_token: TokenInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct Windowed {
    #[serde(default)]
    pub m5: Option<f64>,
    #[serde(default)]
    pub h1: Option<f64>,
    #[serde(default)]
    pub h6: Option<f64>,
    #[serde(default)]
    pub h24: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Txns {
    #[serde(default)]
    pub h1: Option<TxnCounts>,
    #[serde(default)]
    pub h6: Option<TxnCounts>,
    #[serde(default)]
    pub h24: Option<TxnCounts>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct TxnCounts {
    #[serde(default)]
    pub buys: u64,
    #[serde(default)]
    pub sells: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct Liquidity {
    #[serde(default)]
    pub usd: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(f64),
        Str(String),
    }
    Ok(match Option::<NumOrStr>::deserialize(deserializer)? {
        Some(NumOrStr::Num(n)) => n,
        Some(NumOrStr::Str(s)) => s.parse().unwrap_or(0.0),
        None => 0.0,
    })
}

/// Thin client over the aggregator endpoint.
pub struct DexScreener {
    http: Client,
    base_url: String,
}

impl DexScreener {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DuckError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Fetch all pairs for a token and build a sample from the deepest one.
    /// Returns `PriceFeed` when no pair has a positive native price.
    pub async fn fetch(&self, token_address: &str) -> Result<PriceSample> {
        let url = format!("{}/{}", self.base_url, token_address);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        let body: TokenResponse = response.json().await?;

        let pairs = body.pairs.unwrap_or_default();
        if pairs.is_empty() {
            return Err(DuckError::PriceFeed(format!(
                "no pairs for {token_address}"
            )));
        }

        // Deepest pool wins: thin pairs quote stale or manipulated prices.
        let best = pairs
            .into_iter()
            .max_by(|a, b| {
                let la = a.liquidity.usd.unwrap_or(0.0);
                let lb = b.liquidity.usd.unwrap_or(0.0);
                la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("non-empty pairs");

        if best.price_native <= 0.0 {
            return Err(DuckError::PriceFeed(format!(
                "zero native price for {token_address}"
            )));
        }

        debug!(
            pair = %best.pair_address,
            liquidity = best.liquidity.usd.unwrap_or(0.0),
            "aggregator pair selected"
        );

        Ok(sample_from_pair(best, token_address))
    }
}

fn sample_from_pair(pair: Pair, token_address: &str) -> PriceSample {
    let h24 = pair.txns.h24.unwrap_or_default();
    let h1 = pair.txns.h1.unwrap_or_default();
    PriceSample {
        price: pair.price_native,
        price_usd: pair.price_usd,
        price_native: pair.price_native,
        timestamp: now_ms(),
        volume_24h: pair.volume.h24.unwrap_or(0.0),
        volume_6h: pair.volume.h6.unwrap_or(0.0),
        volume_1h: pair.volume.h1.unwrap_or(0.0),
        price_change_5m: pair.price_change.m5.unwrap_or(0.0),
        price_change_1h: pair.price_change.h1.unwrap_or(0.0),
        price_change_24h: pair.price_change.h24.unwrap_or(0.0),
        liquidity_usd: pair.liquidity.usd.unwrap_or(0.0),
        market_cap: pair.market_cap.or(pair.fdv).unwrap_or(0.0),
        buys_24h: h24.buys,
        sells_24h: h24.sells,
        buys_1h: h1.buys,
        sells_1h: h1.sells,
        source: PriceSource::Primary,
        token_symbol: pair.base_token.symbol,
        token_name: pair.base_token.name,
        token_address: token_address.to_lowercase(),
    }
}
