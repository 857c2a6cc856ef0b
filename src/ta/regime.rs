//! Trend, regime and composite sentiment measures.

use crate::ta::indicators::{ema, linear_regression, momentum, percent_b, rsi, volatility};
use serde::{Deserialize, Serialize};

/// Directional trend reading: `direction` in {-1, 0, +1}, `strength`
/// in [0, 1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Trend {
    pub direction: i8,
    pub strength: f64,
}

/// EMA-crossover trend with regression confirmation. Neutral below 20
/// samples.
pub fn trend(prices: &[f64]) -> Trend {
    if prices.len() < 20 {
        return Trend::default();
    }
    let fast = ema(prices, 9);
    let slow = ema(prices, 21);
    let Some(&price) = prices.last() else {
        return Trend::default();
    };
    if price <= 0.0 || slow <= 0.0 {
        return Trend::default();
    }

    let spread = (fast - slow) / slow;
    let slope = linear_regression(prices, 20)
        .map(|(s, _)| s / price)
        .unwrap_or(0.0);

    let direction = if spread > 0.001 && slope > 0.0 {
        1
    } else if spread < -0.001 && slope < 0.0 {
        -1
    } else {
        0
    };
    // Spread magnitude saturates at 2%.
    let strength = (spread.abs() / 0.02).min(1.0);
    Trend {
        direction,
        strength,
    }
}

/// Market regime over the recent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Regime {
    Trending,
    Ranging,
    Volatile,
    Quiet,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Trending => "TRENDING",
            Regime::Ranging => "RANGING",
            Regime::Volatile => "VOLATILE",
            Regime::Quiet => "QUIET",
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify the regime from volatility and trend strength.
/// Defaults to RANGING when short.
pub fn classify_regime(prices: &[f64]) -> Regime {
    if prices.len() < 20 {
        return Regime::Ranging;
    }
    let vol = volatility(prices, 20);
    let t = trend(prices);

    match (vol > 0.02, t.direction != 0 && t.strength > 0.3) {
        (true, true) => Regime::Trending,
        (true, false) => Regime::Volatile,
        (false, true) => Regime::Trending,
        (false, false) => {
            if vol < 0.003 {
                Regime::Quiet
            } else {
                Regime::Ranging
            }
        }
    }
}

/// Ichimoku-style signal from conversion/base line positions computed on
/// closes (9/26 midpoints). Returns -1, 0 or +1; 0 when short.
pub fn ichimoku_signal(prices: &[f64]) -> i8 {
    if prices.len() < 26 {
        return 0;
    }
    let midpoint = |window: &[f64]| -> f64 {
        let min = window.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        (min + max) / 2.0
    };
    let conversion = midpoint(&prices[prices.len() - 9..]);
    let base = midpoint(&prices[prices.len() - 26..]);
    let price = prices[prices.len() - 1];

    if price > conversion && conversion > base {
        1
    } else if price < conversion && conversion < base {
        -1
    } else {
        0
    }
}

/// Fear/Greed weights. They sum to 1.0 so the composite stays a proper
/// blend of its 0-100 components.
const FG_RSI_WEIGHT: f64 = 0.25;
const FG_VOLATILITY_WEIGHT: f64 = 0.20;
const FG_MOMENTUM_WEIGHT: f64 = 0.25;
const FG_TREND_WEIGHT: f64 = 0.15;
const FG_BOLLINGER_WEIGHT: f64 = 0.15;

/// Composite fear/greed index in [0, 100]; 50 = neutral.
///
/// Blends RSI, inverse volatility, momentum, trend and Bollinger %B with
/// fixed weights, then clamps.
pub fn fear_greed_index(prices: &[f64]) -> f64 {
    if prices.len() < 15 {
        return 50.0;
    }
    let rsi_component = rsi(prices, 14);

    // High volatility reads as fear: 2%+ stdev maps to 0.
    let vol = volatility(prices, 20);
    let vol_component = (1.0 - (vol / 0.02).min(1.0)) * 100.0;

    // Momentum of +-5% maps onto the full scale.
    let mom = momentum(prices, 10);
    let momentum_component = ((mom / 5.0).clamp(-1.0, 1.0) + 1.0) / 2.0 * 100.0;

    let t = trend(prices);
    let trend_component = 50.0 + t.direction as f64 * t.strength * 50.0;

    let bollinger_component = percent_b(prices, 20, 2.0).clamp(0.0, 1.0) * 100.0;

    let index = rsi_component * FG_RSI_WEIGHT
        + vol_component * FG_VOLATILITY_WEIGHT
        + momentum_component * FG_MOMENTUM_WEIGHT
        + trend_component * FG_TREND_WEIGHT
        + bollinger_component * FG_BOLLINGER_WEIGHT;
    index.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rising(n: usize) -> Vec<f64> {
        (1..=n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn test_trend_neutral_when_short() {
        let t = trend(&rising(10));
        assert_eq!(t.direction, 0);
        assert_eq!(t.strength, 0.0);
    }

    #[test]
    fn test_uptrend_detected() {
        let t = trend(&rising(40));
        assert_eq!(t.direction, 1);
        assert!(t.strength > 0.0);
    }

    #[test]
    fn test_downtrend_detected() {
        let prices: Vec<f64> = (1..=40).rev().map(|i| 100.0 + i as f64).collect();
        let t = trend(&prices);
        assert_eq!(t.direction, -1);
    }

    #[test]
    fn test_regime_quiet_on_flat() {
        let prices = vec![100.0; 40];
        assert_eq!(classify_regime(&prices), Regime::Quiet);
    }

    #[test]
    fn test_regime_short_is_ranging() {
        assert_eq!(classify_regime(&[100.0; 5]), Regime::Ranging);
    }

    #[test]
    fn test_ichimoku_neutral_when_short() {
        assert_eq!(ichimoku_signal(&rising(20)), 0);
    }

    #[test]
    fn test_ichimoku_bullish_on_strong_rise() {
        // Accelerating rise keeps price above conversion above base.
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + (i * i) as f64 / 10.0).collect();
        assert_eq!(ichimoku_signal(&prices), 1);
    }

    #[test]
    fn test_fear_greed_bounds() {
        let fg = fear_greed_index(&rising(60));
        assert!((0.0..=100.0).contains(&fg));
        // Monotone rise must read greedy.
        assert!(fg > 60.0, "rising market should be greedy, got {fg}");

        let falling: Vec<f64> = (1..=60).rev().map(|i| 100.0 + i as f64).collect();
        let fg = fear_greed_index(&falling);
        assert!(fg < 50.0, "falling market should be fearful, got {fg}");
    }

    #[test]
    fn test_fear_greed_neutral_when_short() {
        assert_eq!(fear_greed_index(&[100.0; 5]), 50.0);
    }

    #[test]
    fn test_fg_weights_sum_to_one() {
        let sum = FG_RSI_WEIGHT
            + FG_VOLATILITY_WEIGHT
            + FG_MOMENTUM_WEIGHT
            + FG_TREND_WEIGHT
            + FG_BOLLINGER_WEIGHT;
        assert!((sum - 1.0).abs() < 1e-12);
    }
}
