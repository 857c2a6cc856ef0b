//! Liquidity agent: pool depth, bonding-curve progress and rug risk.

use crate::agents::{AgentContext, AgentSpec, Analyzer};
use crate::domain::{now_ms, AgentOutput, BondingProgress, PriceSample, SignalKind};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

/// Bonding progress at which graduation is considered imminent.
const GRADUATION_IMMINENT_PCT: f64 = 85.0;

/// Liquidity below this reads as thin.
const LOW_LIQUIDITY_USD: f64 = 10_000.0;

/// 24h volume below this reads as dead.
const LOW_VOLUME_USD: f64 = 1_000.0;

pub struct LiquidityAgent {
    /// Set once the graduation alert has fired so it fires only once per
    /// process lifetime.
    graduation_alerted: bool,
}

impl LiquidityAgent {
    pub fn new() -> Self {
        Self {
            graduation_alerted: false,
        }
    }

    /// Rug-risk score in [0, 100]: a weighted sum of red flags.
    fn rug_risk(sample: &PriceSample, bonding: &BondingProgress) -> f64 {
        let mut risk = 0.0;

        // Thin liquidity is the dominant factor.
        if sample.liquidity_usd < LOW_LIQUIDITY_USD {
            let scarcity = 1.0 - (sample.liquidity_usd / LOW_LIQUIDITY_USD).clamp(0.0, 1.0);
            risk += 35.0 * scarcity.max(0.3);
        }

        // Not graduated means the curve owner still controls the pool.
        if !bonding.is_graduated {
            risk += 20.0;
        }

        // Sell-heavy flow.
        let total = sample.buys_24h + sample.sells_24h;
        if total > 10 {
            let sell_ratio = sample.sells_24h as f64 / total as f64;
            if sell_ratio > 0.6 {
                risk += 20.0 * ((sell_ratio - 0.6) / 0.4).min(1.0);
            }
        }

        // Sharp drop over 24h.
        if sample.price_change_24h < -30.0 {
            risk += 15.0;
        } else if sample.price_change_24h < -15.0 {
            risk += 8.0;
        }

        // Near-zero volume.
        if sample.volume_24h < LOW_VOLUME_USD {
            risk += 10.0;
        }

        risk.clamp(0.0, 100.0)
    }
}

impl Default for LiquidityAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for LiquidityAgent {
    fn spec(&self) -> &'static AgentSpec {
        &crate::agents::FLEET[4]
    }

    async fn analyze(&mut self, ctx: &mut AgentContext) -> Result<Option<AgentOutput>> {
        let Some(sample) = ctx.last_sample.clone() else {
            return Ok(None);
        };

        let bonding = ctx.price.bonding_progress(None).await;
        let risk = Self::rug_risk(&sample, &bonding);

        if bonding.progress >= GRADUATION_IMMINENT_PCT
            && !bonding.is_graduated
            && !self.graduation_alerted
        {
            info!(progress = bonding.progress, "graduation imminent");
            let delivered = ctx
                .hub
                .post_token_launch(&json!({
                    "agentName": self.spec().name,
                    "kind": "GRADUATION_IMMINENT",
                    "tokenAddress": ctx.settings.token_key(),
                    "progress": bonding.progress,
                    "timestamp": now_ms(),
                }))
                .await;
            // Keep retrying next tick if the hub was unreachable.
            self.graduation_alerted = delivered;
        }

        let (kind, confidence) = if risk >= 70.0 {
            (SignalKind::Sell, 60.0 + risk * 0.3)
        } else if risk <= 25.0 && sample.liquidity_usd >= LOW_LIQUIDITY_USD {
            (SignalKind::Buy, 45.0 + (25.0 - risk))
        } else {
            (SignalKind::Hold, 40.0 + (50.0 - risk).abs() * 0.2)
        };

        let reason = format!(
            "Liquidity ${:.0}, rug risk {risk:.0}/100, bonding {:.0}%{}",
            sample.liquidity_usd,
            bonding.progress,
            if bonding.is_graduated { " (graduated)" } else { "" }
        );

        let extra = json!({
            "liquidityUsd": sample.liquidity_usd,
            "rugRisk": risk,
            "bondingProgress": bonding.progress,
            "isGraduated": bonding.is_graduated,
            "volume24h": sample.volume_24h,
        });

        Ok(Some(
            AgentOutput::new(kind, confidence.min(95.0), sample.price, reason).with_extra(extra),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceSource;

    fn healthy_sample() -> PriceSample {
        let mut s = PriceSample::bare(1.0, "0xduck", PriceSource::Primary);
        s.liquidity_usd = 80_000.0;
        s.volume_24h = 25_000.0;
        s.buys_24h = 500;
        s.sells_24h = 450;
        s.price_change_24h = 2.0;
        s
    }

    #[test]
    fn test_healthy_graduated_token_low_risk() {
        let bonding = BondingProgress {
            progress: 100.0,
            is_graduated: true,
        };
        let risk = LiquidityAgent::rug_risk(&healthy_sample(), &bonding);
        assert!(risk < 25.0, "risk {risk}");
    }

    #[test]
    fn test_thin_dumping_token_high_risk() {
        let mut s = healthy_sample();
        s.liquidity_usd = 500.0;
        s.volume_24h = 100.0;
        s.buys_24h = 20;
        s.sells_24h = 180;
        s.price_change_24h = -45.0;
        let bonding = BondingProgress {
            progress: 40.0,
            is_graduated: false,
        };
        let risk = LiquidityAgent::rug_risk(&s, &bonding);
        assert!(risk >= 70.0, "risk {risk}");
    }

    #[test]
    fn test_risk_clamped_to_100() {
        let mut s = healthy_sample();
        s.liquidity_usd = 0.0;
        s.volume_24h = 0.0;
        s.buys_24h = 0;
        s.sells_24h = 100;
        s.price_change_24h = -90.0;
        let bonding = BondingProgress::default();
        let risk = LiquidityAgent::rug_risk(&s, &bonding);
        assert!(risk <= 100.0);
        assert!(risk >= 80.0);
    }

    #[test]
    fn test_ungraduated_carries_base_risk() {
        let graduated = BondingProgress {
            progress: 100.0,
            is_graduated: true,
        };
        let curve = BondingProgress {
            progress: 50.0,
            is_graduated: false,
        };
        let sample = healthy_sample();
        let delta = LiquidityAgent::rug_risk(&sample, &curve)
            - LiquidityAgent::rug_risk(&sample, &graduated);
        assert_eq!(delta, 20.0);
    }
}
