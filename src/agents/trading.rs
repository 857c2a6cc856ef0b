//! Trading agent: weighted indicator vote over the price history.

use crate::agents::{AgentContext, AgentSpec, Analyzer};
use crate::domain::{AgentOutput, SignalKind};
use crate::error::Result;
use crate::ta::{self, MIN_FULL_ANALYSIS};
use async_trait::async_trait;
use serde_json::json;

/// Net-score thresholds for BUY/SELL.
const SIGNAL_THRESHOLD: f64 = 0.15;

/// Confidence floor for a directional signal.
const MIN_SIGNAL_CONFIDENCE: f64 = 25.0;

pub struct TradingAgent;

impl TradingAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TradingAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for TradingAgent {
    fn spec(&self) -> &'static AgentSpec {
        &crate::agents::FLEET[0]
    }

    async fn analyze(&mut self, ctx: &mut AgentContext) -> Result<Option<AgentOutput>> {
        let prices = ctx.prices();
        let Some(&price) = prices.last() else {
            // No data at all this tick; emit nothing rather than noise.
            return Ok(None);
        };

        if prices.len() < MIN_FULL_ANALYSIS {
            return Ok(Some(AgentOutput::hold(price, "Insufficient data")));
        }

        let volumes = ctx.volume_vec();
        let analysis = ta::full_analysis(&prices, &volumes);
        let net = analysis.weighted_score();
        let kind = SignalKind::from_score(net, SIGNAL_THRESHOLD);

        let confidence = (50.0 + net.abs() * 100.0).min(95.0).max(MIN_SIGNAL_CONFIDENCE);

        let reason = match kind {
            SignalKind::Buy => format!(
                "Bullish confluence: net score {net:.2}, RSI {:.0}, MACD hist {:+.2e}, trend {}",
                analysis.rsi, analysis.macd_histogram, analysis.trend_direction
            ),
            SignalKind::Sell => format!(
                "Bearish confluence: net score {net:.2}, RSI {:.0}, MACD hist {:+.2e}, trend {}",
                analysis.rsi, analysis.macd_histogram, analysis.trend_direction
            ),
            SignalKind::Hold => format!(
                "No edge: net score {net:.2} inside +-{SIGNAL_THRESHOLD}, regime {}",
                analysis.regime
            ),
        };

        let extra = json!({
            "indicators": analysis,
            "netScore": net,
        });

        Ok(Some(
            AgentOutput::new(kind, confidence, price, reason).with_extra(extra),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::runtime_test_support::context_with_prices;

    #[tokio::test]
    async fn test_below_min_history_holds_with_reason() {
        let mut ctx = context_with_prices(&vec![1.0; MIN_FULL_ANALYSIS - 1]);
        let mut agent = TradingAgent::new();
        let out = agent.analyze(&mut ctx).await.unwrap().unwrap();
        assert_eq!(out.kind, SignalKind::Hold);
        assert_eq!(out.confidence, 30.0);
        assert_eq!(out.reason, "Insufficient data");
    }

    #[tokio::test]
    async fn test_at_min_history_produces_signal() {
        let prices: Vec<f64> = (0..MIN_FULL_ANALYSIS).map(|i| 100.0 + i as f64).collect();
        let mut ctx = context_with_prices(&prices);
        let mut agent = TradingAgent::new();
        let out = agent.analyze(&mut ctx).await.unwrap().unwrap();
        assert_ne!(out.reason, "Insufficient data");
        assert!(out.confidence >= MIN_SIGNAL_CONFIDENCE);
        assert!(out.confidence <= 95.0);
        assert!(out.extra["indicators"]["rsi"].is_number());
    }

    #[tokio::test]
    async fn test_empty_history_emits_nothing() {
        let mut ctx = context_with_prices(&[]);
        let mut agent = TradingAgent::new();
        assert!(agent.analyze(&mut ctx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_strong_downtrend_sells() {
        let prices: Vec<f64> = (0..80).map(|i| 100.0 * (1.0 - 0.004 * i as f64)).collect();
        let mut ctx = context_with_prices(&prices);
        let mut agent = TradingAgent::new();
        let out = agent.analyze(&mut ctx).await.unwrap().unwrap();
        assert_ne!(out.kind, SignalKind::Buy);
    }
}
