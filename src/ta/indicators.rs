//! Core indicator math.
//!
//! Pure functions over oldest-first price slices (optionally with a
//! parallel volume slice). No I/O, no hidden state: same input, same
//! output. Every function defines a minimum length and returns its
//! documented neutral fallback below it instead of panicking.
//!
//! Windowed indicators read only their trailing window; EMA-derived ones
//! (MACD, Stochastic RSI) consume the whole slice and are only meaningful
//! once `n >= slow + signal` periods are present.

/// Simple moving average of the last `period` samples.
/// Falls back to the last price (or 0 on empty input).
pub fn sma(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.is_empty() {
        return prices.last().copied().unwrap_or(0.0);
    }
    let window = &prices[prices.len().saturating_sub(period)..];
    window.iter().sum::<f64>() / window.len() as f64
}

/// Exponential moving average series, seeded with the SMA of the first
/// `period` values. Empty when there is insufficient data.
pub fn ema_series(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed = prices[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(prices.len() - period + 1);
    out.push(seed);
    for &price in &prices[period..] {
        let prev = *out.last().expect("seeded");
        out.push(price * k + prev * (1.0 - k));
    }
    out
}

/// Latest EMA value. Falls back to the last price.
pub fn ema(prices: &[f64], period: usize) -> f64 {
    ema_series(prices, period)
        .last()
        .copied()
        .unwrap_or_else(|| prices.last().copied().unwrap_or(0.0))
}

/// Relative Strength Index with Wilder's smoothing (factor `1/period`).
/// Neutral 50 below `period + 1` samples; 100 when there are no losses.
pub fn rsi(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        return 50.0;
    }
    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..period]
        .iter()
        .map(|&c| c.max(0.0))
        .sum::<f64>()
        / period as f64;
    let mut avg_loss = changes[..period]
        .iter()
        .map(|&c| (-c).max(0.0))
        .sum::<f64>()
        / period as f64;

    for &c in &changes[period..] {
        avg_gain = (avg_gain * (period as f64 - 1.0) + c.max(0.0)) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + (-c).max(0.0)) / period as f64;
    }

    if avg_loss == 0.0 {
        // No losses: saturated at 100, except a fully flat series which
        // has no information and stays neutral.
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD: `(macd_line, signal_line, histogram)`.
///
/// The signal line is the `signal`-period EMA over the series of MACD-line
/// values at successive trailing windows, not a scalar multiple of the
/// line. A constant price series therefore yields exactly `(0, 0, 0)`.
/// Zeros below `slow + signal` samples.
pub fn macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> (f64, f64, f64) {
    if prices.len() < slow + signal {
        return (0.0, 0.0, 0.0);
    }
    let fast_ema = ema_series(prices, fast);
    let slow_ema = ema_series(prices, slow);
    if fast_ema.is_empty() || slow_ema.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    // Both series end at the last price; align the fast one to the slow
    // one's start before differencing.
    let offset = slow - fast;
    let macd_values: Vec<f64> = (0..slow_ema.len())
        .map(|i| fast_ema[i + offset] - slow_ema[i])
        .collect();

    let signal_series = ema_series(&macd_values, signal);
    let Some(&signal_line) = signal_series.last() else {
        return (0.0, 0.0, 0.0);
    };
    let macd_line = *macd_values.last().expect("non-empty");
    (macd_line, signal_line, macd_line - signal_line)
}

/// Bollinger bands `(upper, middle, lower)` over the last `period`
/// samples with population standard deviation. Collapses to the last
/// price when short.
pub fn bollinger(prices: &[f64], period: usize, std_mult: f64) -> (f64, f64, f64) {
    let fallback = prices.last().copied().unwrap_or(0.0);
    if period == 0 || prices.len() < period {
        return (fallback, fallback, fallback);
    }
    let window = &prices[prices.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();
    (middle + std_mult * std_dev, middle, middle - std_mult * std_dev)
}

/// Bollinger %B: where the current price sits inside the bands.
/// 0.5 on short input or when the bands collapse (flat series).
pub fn percent_b(prices: &[f64], period: usize, std_mult: f64) -> f64 {
    let (upper, _, lower) = bollinger(prices, period, std_mult);
    let Some(&price) = prices.last() else {
        return 0.5;
    };
    let width = upper - lower;
    if width <= 0.0 {
        return 0.5;
    }
    (price - lower) / width
}

/// Stochastic RSI `(k, d)`: the position of RSI inside its own recent
/// range, with `d` a 3-sample SMA of `k`. Neutral (50, 50) when short.
pub fn stoch_rsi(prices: &[f64], period: usize) -> (f64, f64) {
    // Need enough samples for a rolling RSI series of length `period`.
    if period == 0 || prices.len() < 2 * period + 1 {
        return (50.0, 50.0);
    }

    let mut rsi_series = Vec::with_capacity(period);
    for end in (prices.len() - period + 1)..=prices.len() {
        rsi_series.push(rsi(&prices[..end], period));
    }

    let k_at = |series: &[f64]| -> f64 {
        let min = series.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = series.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let last = *series.last().expect("non-empty");
        if max - min <= f64::EPSILON {
            50.0
        } else {
            (last - min) / (max - min) * 100.0
        }
    };

    let k = k_at(&rsi_series);
    // d = SMA(3) of k over the last three window positions.
    let mut ks = Vec::with_capacity(3);
    for back in 0..3 {
        if rsi_series.len() > back {
            ks.push(k_at(&rsi_series[..rsi_series.len() - back]));
        }
    }
    let d = ks.iter().sum::<f64>() / ks.len() as f64;
    (k, d)
}

/// Percent change over the last `period` samples. 0 when short.
pub fn momentum(prices: &[f64], period: usize) -> f64 {
    if prices.len() < period + 1 || period == 0 {
        return 0.0;
    }
    let past = prices[prices.len() - 1 - period];
    let current = prices[prices.len() - 1];
    if past == 0.0 {
        return 0.0;
    }
    (current - past) / past * 100.0
}

/// Population standard deviation of simple returns over the trailing
/// `window`, as a fraction. 0 when short.
pub fn volatility(prices: &[f64], window: usize) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }
    let start = prices.len().saturating_sub(window.max(2));
    let slice = &prices[start..];
    let returns: Vec<f64> = slice
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    variance.sqrt()
}

/// Volume-weighted average price over the last `period` samples.
/// Falls back to SMA when volumes are missing or all zero.
pub fn vwap(prices: &[f64], volumes: &[f64], period: usize) -> f64 {
    if prices.is_empty() || period == 0 {
        return 0.0;
    }
    let n = prices.len().min(volumes.len());
    if n == 0 {
        return sma(prices, period);
    }
    let start = n.saturating_sub(period);
    let p = &prices[prices.len() - (n - start)..];
    let v = &volumes[volumes.len() - (n - start)..];

    let total_volume: f64 = v.iter().sum();
    if total_volume <= 0.0 {
        return sma(prices, period);
    }
    p.iter().zip(v.iter()).map(|(p, v)| p * v).sum::<f64>() / total_volume
}

/// Deviation of the current price from VWAP, percent. 0 when undefined.
pub fn vwap_deviation(prices: &[f64], volumes: &[f64], period: usize) -> f64 {
    let anchor = vwap(prices, volumes, period);
    let Some(&price) = prices.last() else {
        return 0.0;
    };
    if anchor <= 0.0 {
        return 0.0;
    }
    (price - anchor) / anchor * 100.0
}

/// Close-to-close average true range with Wilder smoothing. For a
/// tick-sampled series without highs/lows, the true range degenerates to
/// the absolute close move. 0 when short.
pub fn atr(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        return 0.0;
    }
    let moves: Vec<f64> = prices.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    let mut value = moves[..period].iter().sum::<f64>() / period as f64;
    for &m in &moves[period..] {
        value = (value * (period as f64 - 1.0) + m) / period as f64;
    }
    value
}

/// On-balance volume: cumulative volume signed by the price direction.
/// 0 when fewer than two samples.
pub fn obv(prices: &[f64], volumes: &[f64]) -> f64 {
    let n = prices.len().min(volumes.len());
    if n < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 1..n {
        if prices[i] > prices[i - 1] {
            total += volumes[i];
        } else if prices[i] < prices[i - 1] {
            total -= volumes[i];
        }
    }
    total
}

/// Least-squares slope and intercept over the last `n` samples
/// (x = 0..n-1). `None` when fewer than two samples.
pub fn linear_regression(prices: &[f64], n: usize) -> Option<(f64, f64)> {
    let start = prices.len().saturating_sub(n);
    let slice = &prices[start..];
    let count = slice.len();
    if count < 2 {
        return None;
    }
    let count_f = count as f64;
    let mean_x = (count_f - 1.0) / 2.0;
    let mean_y = slice.iter().sum::<f64>() / count_f;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in slice.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den == 0.0 {
        return None;
    }
    let slope = num / den;
    Some((slope, mean_y - slope * mean_x))
}

/// Extrapolate the regression line `steps` samples past the window end.
pub fn linear_extrapolate(prices: &[f64], n: usize, steps: usize) -> Option<f64> {
    let (slope, intercept) = linear_regression(prices, n)?;
    let count = prices.len().min(n) as f64;
    Some(intercept + slope * (count - 1.0 + steps as f64))
}
