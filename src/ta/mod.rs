//! Technical analysis library.
//!
//! Pure functions over bounded price/volume histories plus the composite
//! snapshot used by the trading agent and the hub's own analysis loop.

pub mod indicators;
pub mod levels;
pub mod regime;

use serde::{Deserialize, Serialize};

pub use indicators::{
    atr, bollinger, ema, ema_series, linear_extrapolate, linear_regression, macd, momentum, obv,
    percent_b, rsi, sma, stoch_rsi, volatility, vwap, vwap_deviation,
};
pub use levels::{fibonacci_levels, support_resistance, volume_profile, Fibonacci, Levels};
pub use regime::{classify_regime, fear_greed_index, ichimoku_signal, trend, Regime, Trend};

/// Minimum history for a full snapshot; shorter inputs yield neutral
/// component values through the per-function fallbacks.
pub const MIN_FULL_ANALYSIS: usize = 30;

/// One composite snapshot of every indicator the fleet consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalAnalysis {
    pub price: f64,
    pub rsi: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,
    pub percent_b: f64,
    pub stoch_rsi_k: f64,
    pub stoch_rsi_d: f64,
    pub momentum: f64,
    pub volatility: f64,
    pub vwap_deviation: f64,
    pub atr: f64,
    pub trend_direction: i8,
    pub trend_strength: f64,
    pub ichimoku: i8,
    pub regime: Regime,
    pub fear_greed: f64,
}

/// Compute the full snapshot. Callers gate on history length themselves;
/// every component degrades to its neutral value on short input.
pub fn full_analysis(prices: &[f64], volumes: &[f64]) -> TechnicalAnalysis {
    let price = prices.last().copied().unwrap_or(0.0);
    let (macd_line, macd_signal, macd_histogram) = macd(prices, 12, 26, 9);
    let (bollinger_upper, bollinger_middle, bollinger_lower) = bollinger(prices, 20, 2.0);
    let (stoch_rsi_k, stoch_rsi_d) = stoch_rsi(prices, 14);
    let t = trend(prices);

    TechnicalAnalysis {
        price,
        rsi: rsi(prices, 14),
        macd_line,
        macd_signal,
        macd_histogram,
        bollinger_upper,
        bollinger_middle,
        bollinger_lower,
        percent_b: percent_b(prices, 20, 2.0),
        stoch_rsi_k,
        stoch_rsi_d,
        momentum: momentum(prices, 10),
        volatility: volatility(prices, 20),
        vwap_deviation: vwap_deviation(prices, volumes, 20),
        atr: atr(prices, 14),
        trend_direction: t.direction,
        trend_strength: t.strength,
        ichimoku: ichimoku_signal(prices),
        regime: classify_regime(prices),
        fear_greed: fear_greed_index(prices),
    }
}

impl TechnicalAnalysis {
    /// Weighted indicator vote in [-1, 1]. Shared by the trading agent's
    /// signal and the hub analysis loop's own score; the per-indicator
    /// weights sum to 1.
    pub fn weighted_score(&self) -> f64 {
        let mut score = 0.0;

        // RSI: oversold buys, overbought sells. Weight 0.20.
        score += 0.20
            * if self.rsi < 30.0 {
                1.0
            } else if self.rsi > 70.0 {
                -1.0
            } else {
                (50.0 - self.rsi) / 50.0
            };

        // MACD histogram sign plus line position. Weight 0.20.
        let macd_vote = if self.macd_histogram > 0.0 && self.macd_line > self.macd_signal {
            1.0
        } else if self.macd_histogram < 0.0 && self.macd_line < self.macd_signal {
            -1.0
        } else {
            0.0
        };
        score += 0.20 * macd_vote;

        // Bollinger %B: band edges mean stretch. Weight 0.10.
        score += 0.10 * (0.5 - self.percent_b.clamp(0.0, 1.0)) * 2.0;

        // Trend direction scaled by strength. Weight 0.20.
        score += 0.20 * self.trend_direction as f64 * self.trend_strength;

        // Ichimoku. Weight 0.10.
        score += 0.10 * self.ichimoku as f64;

        // Stochastic RSI crossover at extremes. Weight 0.10.
        let stoch_vote = if self.stoch_rsi_k < 20.0 && self.stoch_rsi_k > self.stoch_rsi_d {
            1.0
        } else if self.stoch_rsi_k > 80.0 && self.stoch_rsi_k < self.stoch_rsi_d {
            -1.0
        } else {
            0.0
        };
        score += 0.10 * stoch_vote;

        // Momentum, saturating at +-5%. Weight 0.05.
        score += 0.05 * (self.momentum / 5.0).clamp(-1.0, 1.0);

        // VWAP deviation: stretched above VWAP leans sell. Weight 0.05.
        score += 0.05 * (-self.vwap_deviation / 5.0).clamp(-1.0, 1.0);

        score.clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_analysis_neutral_on_flat() {
        let prices = vec![100.0; 60];
        let volumes = vec![10.0; 60];
        let ta = full_analysis(&prices, &volumes);
        assert_eq!(ta.macd_line, 0.0);
        assert_eq!(ta.macd_signal, 0.0);
        assert_eq!(ta.macd_histogram, 0.0);
        assert_eq!(ta.momentum, 0.0);
        assert_eq!(ta.volatility, 0.0);
        assert_eq!(ta.regime, Regime::Quiet);
    }

    #[test]
    fn test_full_analysis_short_input_does_not_panic() {
        let ta = full_analysis(&[1.0], &[1.0]);
        assert_eq!(ta.rsi, 50.0);
        assert_eq!(ta.price, 1.0);
        let ta = full_analysis(&[], &[]);
        assert_eq!(ta.price, 0.0);
    }

    #[test]
    fn test_weighted_score_bounds() {
        let rising: Vec<f64> = (0..80).map(|i| 100.0 * (1.0 + 0.002 * i as f64)).collect();
        let volumes = vec![50.0; 80];
        let score = full_analysis(&rising, &volumes).weighted_score();
        assert!((-1.0..=1.0).contains(&score));
    }

    #[test]
    fn test_weighted_score_leans_with_market() {
        let falling: Vec<f64> = (0..80)
            .map(|i| 100.0 * (1.0 - 0.003 * i as f64))
            .collect();
        let volumes = vec![50.0; 80];
        let score = full_analysis(&falling, &volumes).weighted_score();
        assert!(score < 0.0, "falling market should score negative, got {score}");
    }
}
