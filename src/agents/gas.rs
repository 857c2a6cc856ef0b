//! Gas agent: fast-cadence gas price polling with recommendations and a
//! next-block extrapolation.

use crate::agents::{AgentContext, AgentSpec, Analyzer};
use crate::domain::{now_ms, AgentOutput, SignalKind};
use crate::error::Result;
use crate::market::Ring;
use crate::ta;
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Gas history length (at the 15 s cadence, ~25 minutes).
const GAS_RING_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasLevel {
    Excellent,
    Good,
    Normal,
    Elevated,
    High,
}

impl GasLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GasLevel::Excellent => "EXCELLENT",
            GasLevel::Good => "GOOD",
            GasLevel::Normal => "NORMAL",
            GasLevel::Elevated => "ELEVATED",
            GasLevel::High => "HIGH",
        }
    }

    /// Rate the current price against the rolling average.
    pub fn classify(current_gwei: f64, average_gwei: f64) -> Self {
        if average_gwei <= 0.0 {
            return GasLevel::Normal;
        }
        let ratio = current_gwei / average_gwei;
        if ratio <= 0.7 {
            GasLevel::Excellent
        } else if ratio <= 0.9 {
            GasLevel::Good
        } else if ratio <= 1.1 {
            GasLevel::Normal
        } else if ratio <= 1.5 {
            GasLevel::Elevated
        } else {
            GasLevel::High
        }
    }
}

pub struct GasAgent {
    gas_history: Ring<f64>,
}

impl GasAgent {
    pub fn new() -> Self {
        Self {
            gas_history: Ring::new(GAS_RING_SIZE),
        }
    }
}

impl Default for GasAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for GasAgent {
    fn spec(&self) -> &'static AgentSpec {
        &crate::agents::FLEET[7]
    }

    async fn analyze(&mut self, ctx: &mut AgentContext) -> Result<Option<AgentOutput>> {
        let gwei = match ctx.chain.gas_price_gwei().await {
            Ok(g) => g,
            Err(e) => {
                // Chain read errors are transient; skip the tick.
                debug!(error = %e, "gas read failed");
                return Ok(None);
            }
        };
        self.gas_history.push(gwei);

        let history = self.gas_history.to_vec();
        let average = history.iter().sum::<f64>() / history.len() as f64;
        let level = GasLevel::classify(gwei, average);

        // Next-block estimate from the recent slope.
        let predicted = ta::linear_extrapolate(&history, 20, 1)
            .unwrap_or(gwei)
            .max(0.0);

        let update = json!({
            "agentName": self.spec().name,
            "gasPriceGwei": gwei,
            "averageGwei": average,
            "recommendation": level.as_str(),
            "predictedNextGwei": predicted,
            "samples": history.len(),
            "timestamp": now_ms(),
        });
        ctx.hub.post_gas_update(&update).await;

        let price = ctx.history.last().copied().unwrap_or(0.0);
        // Gas conditions gate activity rather than direction; the signal
        // is HOLD-flavored unless fees are exceptional.
        let (kind, confidence) = match level {
            GasLevel::Excellent => (SignalKind::Buy, 55.0),
            GasLevel::High => (SignalKind::Sell, 50.0),
            _ => (SignalKind::Hold, 40.0),
        };

        let reason = format!(
            "Gas {:.2} gwei ({}), avg {:.2}, next-block est {:.2}",
            gwei,
            level.as_str(),
            average,
            predicted
        );

        Ok(Some(
            AgentOutput::new(kind, confidence, price, reason).with_extra(update),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_bands() {
        assert_eq!(GasLevel::classify(30.0, 50.0), GasLevel::Excellent);
        assert_eq!(GasLevel::classify(42.0, 50.0), GasLevel::Good);
        assert_eq!(GasLevel::classify(50.0, 50.0), GasLevel::Normal);
        assert_eq!(GasLevel::classify(60.0, 50.0), GasLevel::Elevated);
        assert_eq!(GasLevel::classify(100.0, 50.0), GasLevel::High);
    }

    #[test]
    fn test_classification_degenerate_average() {
        assert_eq!(GasLevel::classify(50.0, 0.0), GasLevel::Normal);
    }

    #[test]
    fn test_gas_ring_bounded() {
        let mut agent = GasAgent::new();
        for i in 0..500 {
            agent.gas_history.push(i as f64);
            assert!(agent.gas_history.len() <= GAS_RING_SIZE);
        }
    }

    #[test]
    fn test_next_block_extrapolation_follows_trend() {
        let rising: Vec<f64> = (0..30).map(|i| 50.0 + i as f64).collect();
        let predicted = ta::linear_extrapolate(&rising, 20, 1).unwrap();
        assert!(predicted > rising[rising.len() - 1]);
    }
}
