//! Sentiment agent: a 0-100 crowd-mood score from transaction flow,
//! volume acceleration and momentum.

use crate::agents::{AgentContext, AgentSpec, Analyzer};
use crate::domain::{AgentOutput, PriceSample, SignalKind};
use crate::error::Result;
use crate::ta;
use async_trait::async_trait;
use serde_json::json;

/// Five-step sentiment labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    VeryBullish,
    Bullish,
    Neutral,
    Bearish,
    VeryBearish,
}

impl Mood {
    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            Mood::VeryBullish
        } else if score >= 60.0 {
            Mood::Bullish
        } else if score > 40.0 {
            Mood::Neutral
        } else if score > 25.0 {
            Mood::Bearish
        } else {
            Mood::VeryBearish
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::VeryBullish => "VERY BULLISH",
            Mood::Bullish => "BULLISH",
            Mood::Neutral => "NEUTRAL",
            Mood::Bearish => "BEARISH",
            Mood::VeryBearish => "VERY BEARISH",
        }
    }
}

pub struct SentimentAgent {
    /// Previous tick's 24h transaction count, for activity growth.
    prev_tx_count: Option<u64>,
}

impl SentimentAgent {
    pub fn new() -> Self {
        Self {
            prev_tx_count: None,
        }
    }

    /// Composite score in [0, 100]; 50 is neutral.
    fn score(sample: &PriceSample, prices: &[f64], tx_growth: f64) -> f64 {
        let mut score = 50.0;

        // 24h buy/sell ratio: up to +-15 points.
        let total_24h = sample.buys_24h + sample.sells_24h;
        if total_24h > 0 {
            let buy_ratio = sample.buys_24h as f64 / total_24h as f64;
            score += (buy_ratio - 0.5) * 30.0;
        }

        // 1h buy/sell ratio, fresher so slightly heavier: +-20 points.
        let total_1h = sample.buys_1h + sample.sells_1h;
        if total_1h > 0 {
            let buy_ratio = sample.buys_1h as f64 / total_1h as f64;
            score += (buy_ratio - 0.5) * 40.0;
        }

        // Volume acceleration: 1h pace versus the 6h average pace,
        // +-10 points.
        if sample.volume_6h > 0.0 {
            let hourly_avg = sample.volume_6h / 6.0;
            let acceleration = (sample.volume_1h / hourly_avg).min(3.0);
            score += (acceleration - 1.0) * 5.0;
        }

        // Price momentum over the ring: +-15 points at +-5%.
        let momentum = ta::momentum(prices, 10);
        score += (momentum / 5.0).clamp(-1.0, 1.0) * 15.0;

        // Transaction-activity growth tick over tick: +-5 points.
        score += tx_growth.clamp(-1.0, 1.0) * 5.0;

        score.clamp(0.0, 100.0)
    }
}

impl Default for SentimentAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for SentimentAgent {
    fn spec(&self) -> &'static AgentSpec {
        &crate::agents::FLEET[5]
    }

    async fn analyze(&mut self, ctx: &mut AgentContext) -> Result<Option<AgentOutput>> {
        let Some(sample) = ctx.last_sample.clone() else {
            return Ok(None);
        };
        let prices = ctx.prices();

        let tx_count = sample.buys_24h + sample.sells_24h;
        let tx_growth = match self.prev_tx_count {
            Some(prev) if prev > 0 => (tx_count as f64 - prev as f64) / prev as f64,
            _ => 0.0,
        };
        self.prev_tx_count = Some(tx_count);

        let score = Self::score(&sample, &prices, tx_growth);
        let mood = Mood::from_score(score);

        let kind = match mood {
            Mood::VeryBullish | Mood::Bullish => SignalKind::Buy,
            Mood::Neutral => SignalKind::Hold,
            Mood::Bearish | Mood::VeryBearish => SignalKind::Sell,
        };
        // Distance from neutral drives conviction.
        let confidence = (40.0 + (score - 50.0).abs() * 1.2).min(95.0);

        let reason = format!(
            "Sentiment {} ({score:.0}/100): {}buys/{}sells 1h, vol 1h {:.0}",
            mood.as_str(),
            sample.buys_1h,
            sample.sells_1h,
            sample.volume_1h
        );

        let extra = json!({
            "sentimentScore": score,
            "label": mood.as_str(),
            "buys24h": sample.buys_24h,
            "sells24h": sample.sells_24h,
            "buys1h": sample.buys_1h,
            "sells1h": sample.sells_1h,
            "txGrowth": tx_growth,
        });

        Ok(Some(
            AgentOutput::new(kind, confidence, sample.price, reason).with_extra(extra),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::runtime_test_support::context_with_prices;
    use crate::domain::PriceSource;

    fn sample(buys_1h: u64, sells_1h: u64) -> PriceSample {
        let mut s = PriceSample::bare(1.0, "0xduck", PriceSource::Primary);
        s.buys_1h = buys_1h;
        s.sells_1h = sells_1h;
        s.buys_24h = buys_1h * 10;
        s.sells_24h = sells_1h * 10;
        s
    }

    #[test]
    fn test_balanced_flow_is_neutral() {
        let prices = vec![1.0; 30];
        let score = SentimentAgent::score(&sample(50, 50), &prices, 0.0);
        assert!((score - 50.0).abs() < 1.0, "score {score}");
        assert_eq!(Mood::from_score(score), Mood::Neutral);
    }

    #[test]
    fn test_buy_pressure_reads_bullish() {
        let prices: Vec<f64> = (0..30).map(|i| 1.0 + i as f64 * 0.01).collect();
        let score = SentimentAgent::score(&sample(90, 10), &prices, 0.5);
        assert!(score >= 75.0, "score {score}");
        assert_eq!(Mood::from_score(score), Mood::VeryBullish);
    }

    #[test]
    fn test_sell_pressure_reads_bearish() {
        let prices: Vec<f64> = (0..30).map(|i| 2.0 - i as f64 * 0.02).collect();
        let score = SentimentAgent::score(&sample(5, 95), &prices, -0.5);
        assert!(score <= 25.0, "score {score}");
        assert_eq!(Mood::from_score(score), Mood::VeryBearish);
    }

    #[test]
    fn test_score_is_clamped() {
        let mut s = sample(1000, 0);
        s.volume_1h = 1e9;
        s.volume_6h = 1.0;
        let prices: Vec<f64> = (0..30).map(|i| 1.0 + i as f64).collect();
        let score = SentimentAgent::score(&s, &prices, 100.0);
        assert!(score <= 100.0);
    }

    #[tokio::test]
    async fn test_no_sample_no_output() {
        let mut ctx = context_with_prices(&[1.0; 10]);
        ctx.last_sample = None;
        let mut agent = SentimentAgent::new();
        assert!(agent.analyze(&mut ctx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_signal_mapping() {
        let mut ctx = context_with_prices(&[1.0; 30]);
        ctx.last_sample = Some(sample(90, 10));
        let mut agent = SentimentAgent::new();
        let out = agent.analyze(&mut ctx).await.unwrap().unwrap();
        assert_eq!(out.kind, SignalKind::Buy);
        assert!(out.extra["sentimentScore"].as_f64().unwrap() > 60.0);
    }
}
