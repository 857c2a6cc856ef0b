//! The hub's own per-token analysis loop.
//!
//! At most one loop runs at a time; `token:analyze` for a new address
//! cancels the previous one, repoints the focal token, analyzes
//! immediately and then on a fixed cadence. Results are cached per token
//! and broadcast as `analysis:result`.

use crate::advisor::Advisor;
use crate::domain::{now_ms, SignalKind};
use crate::hub::state::HubState;
use crate::market::PriceService;
use crate::ta::{self, Regime};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cadence of the self-analysis loop.
pub const ANALYSIS_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Minimum ring length for the technical pass.
const MIN_TECHNICAL: usize = 5;

/// Minimum ring length for levels, Fibonacci, volume profile and OBV.
const MIN_LEVELS: usize = 20;

/// Merge weights: own technicals dominate, the fleet refines.
const OWN_WEIGHT: f64 = 0.6;
const CONSENSUS_WEIGHT: f64 = 0.4;
const MERGED_THRESHOLD: f64 = 0.10;

/// Risk sizing constants: assumed win rate, ATR stop multiple, and the
/// half-Kelly cap.
const ASSUMED_WIN_RATE: f64 = 0.55;
const ATR_STOP_MULT: f64 = 1.5;
const MAX_POSITION_FRACTION: f64 = 0.125;

pub struct AnalysisEngine {
    state: Arc<HubState>,
    price: Arc<PriceService>,
    advisor: Option<Arc<Advisor>>,
    active: Mutex<Option<CancellationToken>>,
}

impl AnalysisEngine {
    pub fn new(
        state: Arc<HubState>,
        price: Arc<PriceService>,
        advisor: Option<Arc<Advisor>>,
    ) -> Self {
        Self {
            state,
            price,
            advisor,
            active: Mutex::new(None),
        }
    }

    /// Point the loop at `token`, cancelling any prior loop. The first
    /// analysis runs immediately.
    pub async fn start_loop(self: Arc<Self>, token: &str) {
        let token = token.to_lowercase();
        let cancel = CancellationToken::new();
        {
            let mut active = self.active.lock().await;
            if let Some(prior) = active.take() {
                prior.cancel();
            }
            *active = Some(cancel.clone());
        }
        self.state.set_focal_token(&token).await;
        info!(token = %token, "analysis loop started");

        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                engine.analyze_token(&token).await;
                tokio::select! {
                    _ = tokio::time::sleep(ANALYSIS_INTERVAL) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            info!(token = %token, "analysis loop stopped");
        });
    }

    /// One full analysis pass. Failures degrade to a partial result; a
    /// missing price sample skips the pass entirely.
    pub async fn analyze_token(&self, token: &str) {
        let Some(sample) = self.price.fetch_price(Some(token)).await else {
            warn!(token = %token, "no price data, analysis skipped");
            return;
        };
        self.state
            .push_history(token, sample.price, sample.volume_24h)
            .await;

        let (prices, volumes) = self.state.history_snapshot(token).await;
        if prices.len() < MIN_TECHNICAL {
            info!(token = %token, len = prices.len(), "waiting for history");
            return;
        }

        let analysis = ta::full_analysis(&prices, &volumes);
        let own_score = analysis.weighted_score();

        let consensus = self.state.consensus().await;
        let merged_score = OWN_WEIGHT * own_score + CONSENSUS_WEIGHT * consensus.score;
        let verdict = SignalKind::from_score(merged_score, MERGED_THRESHOLD);

        let levels = if prices.len() >= MIN_LEVELS {
            Some(LevelBlock::compute(&prices, &volumes))
        } else {
            None
        };

        let risk = RiskPlan::compute(sample.price, analysis.atr, levels.as_ref());

        let narrative = narrative(
            &analysis,
            verdict,
            merged_score,
            &consensus,
            levels.as_ref(),
            &risk,
        );

        let mut result = json!({
            "tokenAddress": token,
            "price": sample.price,
            "priceUsd": sample.price_usd,
            "verdict": verdict,
            "ownScore": own_score,
            "consensusScore": consensus.score,
            "mergedScore": merged_score,
            "indicators": analysis,
            "consensus": consensus,
            "risk": risk.to_json(),
            "narrative": narrative,
            "timestamp": now_ms(),
        });
        if let Some(levels) = &levels {
            result["levels"] = levels.to_json();
        }

        // Optional advisor enrichment: strictly best-effort.
        if let Some(advisor) = &self.advisor {
            let prompt = format!(
                "You are reviewing an automated market analysis. Respond with a single JSON \
                 object {{\"note\": string, \"agrees\": bool}}. Verdict: {verdict}, merged score \
                 {merged_score:.2}, regime {}, RSI {:.0}, narrative: {narrative}",
                analysis.regime, analysis.rsi
            );
            if let Some(note) = advisor.call(&prompt).await {
                result["advisor"] = note;
            }
        }

        self.state.store_analysis(token, result).await;
        info!(token = %token, %verdict, merged_score, "analysis cached");
    }
}

/// Level extraction bundle for histories past [`MIN_LEVELS`].
pub struct LevelBlock {
    levels: ta::Levels,
    fibonacci: Option<ta::Fibonacci>,
    obv: f64,
    profile: Vec<ta::levels::VolumeBin>,
}

impl LevelBlock {
    fn compute(prices: &[f64], volumes: &[f64]) -> Self {
        Self {
            levels: ta::support_resistance(prices, volumes, 50),
            fibonacci: ta::fibonacci_levels(prices, 50),
            obv: ta::obv(prices, volumes),
            profile: ta::volume_profile(prices, volumes, 50),
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "support": self.levels.support,
            "resistance": self.levels.resistance,
            "fibonacci": self.fibonacci,
            "obv": self.obv,
            "volumeProfile": self.profile,
        })
    }
}

/// Entry/stop/target prices with a half-Kelly position fraction.
#[derive(Debug, Clone)]
pub struct RiskPlan {
    pub entry: f64,
    pub stop: f64,
    pub target_2r: f64,
    pub target_3r: f64,
    pub position_fraction: f64,
}

impl RiskPlan {
    /// ATR stop at `entry - 1.5*ATR`, raised to just under support when
    /// support sits above the raw stop. Targets at 2R and 3R. Position
    /// size is half of a heuristic Kelly fraction (fixed win rate, R/R
    /// from the candidate trade), clamped to [0, 12.5%].
    pub fn compute(entry: f64, atr: f64, levels: Option<&LevelBlock>) -> Self {
        let atr = if atr > 0.0 { atr } else { entry * 0.02 };
        let mut stop = entry - ATR_STOP_MULT * atr;

        if let Some(block) = levels {
            let support_floor = block.levels.support * 0.99;
            if support_floor > stop && support_floor < entry {
                stop = support_floor;
            }
        }
        if stop < 0.0 {
            stop = 0.0;
        }

        let r = (entry - stop).max(entry * 1e-6);
        let target_2r = entry + 2.0 * r;
        let target_3r = entry + 3.0 * r;

        // Heuristic Kelly with the 2R target as the R/R ratio.
        let rr = 2.0;
        let kelly = ASSUMED_WIN_RATE - (1.0 - ASSUMED_WIN_RATE) / rr;
        let position_fraction = (kelly / 2.0).clamp(0.0, MAX_POSITION_FRACTION);

        Self {
            entry,
            stop,
            target_2r,
            target_3r,
            position_fraction,
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "entry": self.entry,
            "stop": self.stop,
            "target2R": self.target_2r,
            "target3R": self.target_3r,
            "positionFraction": self.position_fraction,
        })
    }
}

/// Fixed-template prose paragraph. No model call involved.
fn narrative(
    analysis: &ta::TechnicalAnalysis,
    verdict: SignalKind,
    merged_score: f64,
    consensus: &crate::hub::consensus::Consensus,
    levels: Option<&LevelBlock>,
    risk: &RiskPlan,
) -> String {
    let regime_phrase = match analysis.regime {
        Regime::Trending => "the market is in a directional trend",
        Regime::Ranging => "the market is consolidating in a range",
        Regime::Volatile => "the market is choppy with elevated volatility",
        Regime::Quiet => "the market is quiet with little movement",
    };

    let rsi_phrase = if analysis.rsi > 70.0 {
        format!("RSI at {:.0} is overbought", analysis.rsi)
    } else if analysis.rsi < 30.0 {
        format!("RSI at {:.0} is oversold", analysis.rsi)
    } else {
        format!("RSI at {:.0} is neutral", analysis.rsi)
    };

    let trend_phrase = match analysis.trend_direction {
        1 => "the short-term trend points up",
        -1 => "the short-term trend points down",
        _ => "no clear short-term trend",
    };

    let consensus_phrase = if consensus.contributors.is_empty() {
        "No fleet consensus is available yet".to_string()
    } else {
        format!(
            "The agent fleet leans {} at {}% strength with {:.0}% agreement",
            consensus.signal, consensus.strength, consensus.agreement_pct
        )
    };

    let levels_phrase = levels
        .map(|block| {
            format!(
                " Key levels sit at {:.6} support and {:.6} resistance.",
                block.levels.support, block.levels.resistance
            )
        })
        .unwrap_or_default();

    format!(
        "Verdict {verdict} (merged score {merged_score:+.2}): {regime_phrase}; {rsi_phrase}, and {trend_phrase}. \
         {consensus_phrase}.{levels_phrase} Suggested plan: entry {:.6}, stop {:.6}, targets {:.6} / {:.6}, \
         risking no more than {:.1}% of the book.",
        risk.entry,
        risk.stop,
        risk.target_2r,
        risk.target_3r,
        risk.position_fraction * 100.0
    )
}
