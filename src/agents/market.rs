//! Market-health agent: full technical picture, sudden-move detection,
//! regime classification and operator alerts.

use crate::agents::{AgentContext, AgentSpec, Analyzer};
use crate::domain::{now_ms, AgentOutput, SignalKind};
use crate::error::Result;
use crate::ta::{self, Regime, MIN_FULL_ANALYSIS};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

/// Adjacent-sample move beyond this fraction reads as whale activity.
const WHALE_MOVE_THRESHOLD: f64 = 0.03;

/// Volume spike multiple versus the running average.
const VOLUME_SURGE_MULT: f64 = 3.0;

pub struct MarketAgent;

impl MarketAgent {
    pub fn new() -> Self {
        Self
    }

    /// Alert strings for out-of-band conditions this tick.
    fn collect_alerts(prices: &[f64], volumes: &[f64], analysis: &ta::TechnicalAnalysis) -> Vec<String> {
        let mut alerts = Vec::new();

        if let Some(move_pct) = adjacent_move(prices) {
            if move_pct.abs() > WHALE_MOVE_THRESHOLD {
                alerts.push(format!(
                    "Sudden {} of {:.1}% between samples, possible whale activity",
                    if move_pct > 0.0 { "pump" } else { "dump" },
                    move_pct.abs() * 100.0
                ));
            }
        }

        if volumes.len() >= 10 {
            let recent = volumes[volumes.len() - 1];
            let avg =
                volumes[..volumes.len() - 1].iter().sum::<f64>() / (volumes.len() - 1) as f64;
            if avg > 0.0 && recent > avg * VOLUME_SURGE_MULT {
                alerts.push(format!(
                    "Volume surge: {:.1}x the running average",
                    recent / avg
                ));
            }
        }

        if analysis.rsi >= 80.0 {
            alerts.push(format!("RSI overbought at {:.0}", analysis.rsi));
        } else if analysis.rsi <= 20.0 {
            alerts.push(format!("RSI oversold at {:.0}", analysis.rsi));
        }

        if analysis.volatility > 0.05 {
            alerts.push(format!(
                "Volatility elevated: {:.1}% per sample",
                analysis.volatility * 100.0
            ));
        }

        alerts
    }
}

fn adjacent_move(prices: &[f64]) -> Option<f64> {
    let n = prices.len();
    if n < 2 || prices[n - 2] == 0.0 {
        return None;
    }
    Some((prices[n - 1] - prices[n - 2]) / prices[n - 2])
}

impl Default for MarketAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for MarketAgent {
    fn spec(&self) -> &'static AgentSpec {
        &crate::agents::FLEET[2]
    }

    async fn analyze(&mut self, ctx: &mut AgentContext) -> Result<Option<AgentOutput>> {
        let prices = ctx.prices();
        let Some(&price) = prices.last() else {
            return Ok(None);
        };
        if prices.len() < MIN_FULL_ANALYSIS {
            return Ok(Some(AgentOutput::hold(price, "Insufficient data")));
        }

        let volumes = ctx.volume_vec();
        let analysis = ta::full_analysis(&prices, &volumes);
        let alerts = Self::collect_alerts(&prices, &volumes, &analysis);

        // A detected whale-sized move also goes to the whale ring so the
        // dashboard surfaces it immediately.
        if let Some(move_pct) = adjacent_move(&prices) {
            if move_pct.abs() > WHALE_MOVE_THRESHOLD {
                info!(move_pct = move_pct * 100.0, "whale-sized price move");
                ctx.hub
                    .post_whale_alert(&json!({
                        "agentName": self.spec().name,
                        "kind": "PRICE_MOVE",
                        "movePct": move_pct * 100.0,
                        "price": price,
                        "timestamp": now_ms(),
                    }))
                    .await;
            }
        }

        let score = analysis.weighted_score();
        let kind = SignalKind::from_score(score, 0.15);
        let confidence = (50.0 + score.abs() * 100.0).min(95.0);

        let health = match analysis.regime {
            Regime::Trending => "healthy trend",
            Regime::Ranging => "stable range",
            Regime::Volatile => "turbulent",
            Regime::Quiet => "dormant",
        };
        let reason = format!(
            "Market {} ({}), fear/greed {:.0}, {} alert(s)",
            health,
            analysis.regime,
            analysis.fear_greed,
            alerts.len()
        );

        let extra = json!({
            "indicators": analysis,
            "alerts": alerts,
            "regime": analysis.regime,
            "fearGreed": analysis.fear_greed,
        });

        Ok(Some(
            AgentOutput::new(kind, confidence, price, reason).with_extra(extra),
        ))
    }
}
