//! Price-level extraction: support/resistance, Fibonacci retracements,
//! volume profile.

use serde::{Deserialize, Serialize};

/// Maximum number of price bins in the volume profile.
const MAX_BINS: usize = 20;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Levels {
    pub support: f64,
    pub resistance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeBin {
    pub price: f64,
    pub volume: f64,
}

/// Bin the last `lookback` samples into at most 20 equal-width price bins
/// weighted by volume. Bin price is the bin midpoint.
pub fn volume_profile(prices: &[f64], volumes: &[f64], lookback: usize) -> Vec<VolumeBin> {
    let n = prices.len().min(volumes.len());
    if n < 2 {
        return Vec::new();
    }
    let start = n.saturating_sub(lookback);
    let p = &prices[prices.len() - (n - start)..];
    let v = &volumes[volumes.len() - (n - start)..];

    let min = p.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = p.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !(min.is_finite() && max.is_finite()) || max <= min {
        return Vec::new();
    }

    let bins = MAX_BINS.min(p.len());
    let width = (max - min) / bins as f64;
    let mut totals = vec![0.0f64; bins];
    for (price, volume) in p.iter().zip(v.iter()) {
        let idx = (((price - min) / width) as usize).min(bins - 1);
        totals[idx] += volume;
    }

    totals
        .into_iter()
        .enumerate()
        .map(|(i, volume)| VolumeBin {
            price: min + (i as f64 + 0.5) * width,
            volume,
        })
        .collect()
}

/// Support and resistance from the volume profile: support is the
/// highest-volume bin midpoint below the current price, resistance the
/// highest-volume bin above. When volumes carry no information (all
/// equal, including all-zero), fall back to the 10th/90th percentiles of
/// the price window.
pub fn support_resistance(prices: &[f64], volumes: &[f64], lookback: usize) -> Levels {
    let Some(&current) = prices.last() else {
        return Levels::default();
    };
    if prices.len() < 2 {
        return Levels {
            support: current,
            resistance: current,
        };
    }

    let profile = volume_profile(prices, volumes, lookback);
    let informative = {
        let mut values: Vec<f64> = profile.iter().map(|b| b.volume).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        match (values.first(), values.last()) {
            (Some(min), Some(max)) => max - min > f64::EPSILON,
            _ => false,
        }
    };

    if informative {
        let support = profile
            .iter()
            .filter(|b| b.price < current)
            .max_by(|a, b| a.volume.partial_cmp(&b.volume).unwrap_or(std::cmp::Ordering::Equal))
            .map(|b| b.price);
        let resistance = profile
            .iter()
            .filter(|b| b.price > current)
            .max_by(|a, b| a.volume.partial_cmp(&b.volume).unwrap_or(std::cmp::Ordering::Equal))
            .map(|b| b.price);
        if support.is_some() || resistance.is_some() {
            return Levels {
                support: support.unwrap_or_else(|| percentile(prices, lookback, 0.10)),
                resistance: resistance.unwrap_or_else(|| percentile(prices, lookback, 0.90)),
            };
        }
    }

    Levels {
        support: percentile(prices, lookback, 0.10),
        resistance: percentile(prices, lookback, 0.90),
    }
}

fn percentile(prices: &[f64], lookback: usize, q: f64) -> f64 {
    let start = prices.len().saturating_sub(lookback);
    let mut window: Vec<f64> = prices[start..].to_vec();
    if window.is_empty() {
        return 0.0;
    }
    window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((window.len() - 1) as f64 * q).round() as usize;
    window[idx]
}

/// Standard Fibonacci retracement levels between the window low and high.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fibonacci {
    pub low: f64,
    pub high: f64,
    pub levels: Vec<(f64, f64)>,
}

pub fn fibonacci_levels(prices: &[f64], lookback: usize) -> Option<Fibonacci> {
    let start = prices.len().saturating_sub(lookback);
    let window = &prices[start..];
    if window.len() < 2 {
        return None;
    }
    let low = window.iter().cloned().fold(f64::INFINITY, f64::min);
    let high = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if high <= low {
        return None;
    }
    let range = high - low;
    let ratios = [0.0, 0.236, 0.382, 0.5, 0.618, 0.786, 1.0];
    Some(Fibonacci {
        low,
        high,
        levels: ratios.iter().map(|&r| (r, high - range * r)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_profile_bin_count() {
        let prices: Vec<f64> = (0..100).map(|i| 100.0 + (i % 17) as f64).collect();
        let volumes: Vec<f64> = (0..100).map(|i| 10.0 + i as f64).collect();
        let profile = volume_profile(&prices, &volumes, 100);
        assert!(!profile.is_empty());
        assert!(profile.len() <= MAX_BINS);
    }

    #[test]
    fn test_support_below_resistance_above() {
        // Heavy volume clustered at 95 and 105 around a current price of 100.
        let mut prices = Vec::new();
        let mut volumes = Vec::new();
        for _ in 0..20 {
            prices.push(95.0);
            volumes.push(1000.0);
            prices.push(105.0);
            volumes.push(900.0);
            prices.push(100.0);
            volumes.push(10.0);
        }
        prices.push(100.0);
        volumes.push(10.0);

        let levels = support_resistance(&prices, &volumes, prices.len());
        assert!(levels.support < 100.0, "support {}", levels.support);
        assert!(levels.resistance > 100.0, "resistance {}", levels.resistance);
        assert!((levels.support - 95.0).abs() < 2.0);
        assert!((levels.resistance - 105.0).abs() < 2.0);
    }

    #[test]
    fn test_percentile_fallback_on_flat_volume() {
        let prices: Vec<f64> = (0..50).map(|i| 90.0 + i as f64 * 0.5).collect();
        let volumes = vec![5.0; 50];
        let levels = support_resistance(&prices, &volumes, 50);
        // 10th/90th percentile of a 90..114.5 ramp.
        assert!(levels.support < levels.resistance);
        assert!(levels.support >= 90.0);
        assert!(levels.resistance <= 114.5);
    }

    #[test]
    fn test_fibonacci_levels_ordering() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let fib = fibonacci_levels(&prices, 30).unwrap();
        assert_eq!(fib.low, 100.0);
        assert_eq!(fib.high, 129.0);
        assert_eq!(fib.levels.len(), 7);
        // Level at ratio 0 is the high; at ratio 1 the low.
        assert_eq!(fib.levels[0].1, fib.high);
        assert_eq!(fib.levels[6].1, fib.low);
    }

    #[test]
    fn test_fibonacci_none_on_flat() {
        assert!(fibonacci_levels(&[100.0; 30], 30).is_none());
        assert!(fibonacci_levels(&[100.0], 30).is_none());
    }
}
