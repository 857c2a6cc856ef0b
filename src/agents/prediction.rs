//! Prediction agent: multi-horizon ensemble forecasts with verification
//! against realized prices.

use crate::agents::{AgentContext, AgentSpec, Analyzer};
use crate::domain::{now_ms, AgentOutput, Direction, PendingPrediction, SignalKind};
use crate::error::Result;
use crate::ta;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

/// Forecast horizons, minutes.
const HORIZONS: [u64; 4] = [5, 15, 60, 240];

/// Minimum history before forecasting.
const MIN_HISTORY: usize = 25;

/// One sub-model's opinion: a direction score in [-1, 1] and a
/// confidence in [0, 100].
#[derive(Debug, Clone, Copy)]
struct ModelVote {
    direction: f64,
    confidence: f64,
}

pub struct PredictionAgent {
    pending: Vec<PendingPrediction>,
    verified_correct: u64,
    verified_total: u64,
    /// (correct, total) per horizon, for the stats payload.
    horizon_stats: std::collections::HashMap<u64, (u64, u64)>,
    /// Next on-chain prediction index for this wallet, seeded from the
    /// registry record before the first post. `None` means unseeded (or
    /// unseedable) and on-chain verification stays off.
    onchain_counter: Option<u64>,
}

impl PredictionAgent {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            verified_correct: 0,
            verified_total: 0,
            horizon_stats: std::collections::HashMap::new(),
            onchain_counter: None,
        }
    }

    /// Local accuracy over verified predictions, percent.
    pub fn accuracy(&self) -> f64 {
        if self.verified_total == 0 {
            return 0.0;
        }
        self.verified_correct as f64 / self.verified_total as f64 * 100.0
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Verify every due prediction exactly once and drop it from pending.
    async fn verify_due(&mut self, ctx: &mut AgentContext, actual_price: f64) {
        let now = now_ms();
        let mut kept = Vec::with_capacity(self.pending.len());
        for prediction in self.pending.drain(..) {
            if !prediction.is_due(now) {
                kept.push(prediction);
                continue;
            }
            let correct = prediction.is_correct(actual_price);
            self.verified_total += 1;
            if correct {
                self.verified_correct += 1;
            }
            let per_horizon = self
                .horizon_stats
                .entry(prediction.horizon_minutes)
                .or_insert((0, 0));
            per_horizon.1 += 1;
            if correct {
                per_horizon.0 += 1;
            }
            info!(
                direction = %prediction.direction,
                horizon = prediction.horizon_minutes,
                reference = prediction.reference_price,
                actual = actual_price,
                correct,
                "prediction verified"
            );
            if let Some(index) = prediction.onchain_index {
                if ctx.chain.can_write() {
                    if let Err(e) = ctx.chain.verify_prediction(index, actual_price).await {
                        warn!(index, error = %e, "on-chain verification failed");
                    }
                }
            }
        }
        self.pending = kept;
    }

    fn ensemble(prices: &[f64], horizon_minutes: u64) -> (f64, f64) {
        let votes = [
            Self::linreg_model(prices, horizon_minutes),
            Self::crossover_model(prices),
            Self::mean_reversion_model(prices),
            Self::momentum_cascade_model(prices),
        ];
        let weight_sum: f64 = votes.iter().map(|v| v.confidence).sum();
        if weight_sum <= 0.0 {
            return (0.0, 0.0);
        }
        let direction =
            votes.iter().map(|v| v.direction * v.confidence).sum::<f64>() / weight_sum;
        let mean_confidence = weight_sum / votes.len() as f64;

        // Agreement scaling: unanimous models deserve the full mean
        // confidence, split opinions get discounted.
        let signs: Vec<f64> = votes
            .iter()
            .filter(|v| v.direction.abs() > 0.05)
            .map(|v| v.direction.signum())
            .collect();
        let agreement = if signs.is_empty() {
            0.5
        } else {
            let positive = signs.iter().filter(|&&s| s > 0.0).count() as f64;
            let ratio = positive / signs.len() as f64;
            ratio.max(1.0 - ratio)
        };
        (direction, (mean_confidence * agreement).clamp(0.0, 95.0))
    }

    /// Linear-regression extrapolation of the last <=30 samples.
    fn linreg_model(prices: &[f64], horizon_minutes: u64) -> ModelVote {
        let window = prices.len().min(30);
        let Some(&current) = prices.last() else {
            return ModelVote { direction: 0.0, confidence: 0.0 };
        };
        // One sample slot approximates one minute of horizon.
        let steps = horizon_minutes.min(60) as usize;
        let Some(projected) = ta::linear_extrapolate(prices, window, steps) else {
            return ModelVote { direction: 0.0, confidence: 0.0 };
        };
        if current <= 0.0 {
            return ModelVote { direction: 0.0, confidence: 0.0 };
        }
        let ret = (projected - current) / current;
        ModelVote {
            direction: (ret / 0.01).clamp(-1.0, 1.0),
            confidence: 40.0 + 30.0 * (ret.abs() / 0.01).min(1.0),
        }
    }

    /// Fast/slow moving-average crossover.
    fn crossover_model(prices: &[f64]) -> ModelVote {
        if prices.len() < 20 {
            return ModelVote { direction: 0.0, confidence: 0.0 };
        }
        let fast = ta::sma(prices, 5);
        let slow = ta::sma(prices, 20);
        if slow <= 0.0 {
            return ModelVote { direction: 0.0, confidence: 0.0 };
        }
        let spread = (fast - slow) / slow;
        if spread.abs() < 0.001 {
            ModelVote { direction: 0.0, confidence: 30.0 }
        } else {
            ModelVote {
                direction: spread.signum() * (spread.abs() / 0.01).min(1.0),
                confidence: 60.0,
            }
        }
    }

    /// Mean reversion relative to SMA20: stretch implies a pull back.
    fn mean_reversion_model(prices: &[f64]) -> ModelVote {
        if prices.len() < 20 {
            return ModelVote { direction: 0.0, confidence: 0.0 };
        }
        let anchor = ta::sma(prices, 20);
        let Some(&current) = prices.last() else {
            return ModelVote { direction: 0.0, confidence: 0.0 };
        };
        if anchor <= 0.0 {
            return ModelVote { direction: 0.0, confidence: 0.0 };
        }
        let deviation = (current - anchor) / anchor;
        ModelVote {
            direction: (-deviation / 0.02).clamp(-1.0, 1.0),
            confidence: 30.0 + 40.0 * (deviation.abs() / 0.02).min(1.0),
        }
    }

    /// Momentum cascade: short, medium and long momentum agreeing.
    fn momentum_cascade_model(prices: &[f64]) -> ModelVote {
        if prices.len() < 21 {
            return ModelVote { direction: 0.0, confidence: 0.0 };
        }
        let m5 = ta::momentum(prices, 5);
        let m10 = ta::momentum(prices, 10);
        let m20 = ta::momentum(prices, 20);
        let signs = [m5, m10, m20].map(f64::signum);
        let aligned = signs[0] == signs[1] && signs[1] == signs[2] && m5 != 0.0;
        if aligned {
            ModelVote {
                direction: signs[0] * ((m5.abs() / 2.0).min(1.0)),
                confidence: 70.0,
            }
        } else {
            ModelVote {
                direction: (m5 / 2.0).clamp(-1.0, 1.0) * 0.3,
                confidence: 25.0,
            }
        }
    }
}

impl Default for PredictionAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for PredictionAgent {
    fn spec(&self) -> &'static AgentSpec {
        &crate::agents::FLEET[1]
    }

    async fn before_tick(&mut self, ctx: &mut AgentContext) -> Result<()> {
        let has_due = {
            let now = now_ms();
            self.pending.iter().any(|p| p.is_due(now))
        };
        if !has_due {
            return Ok(());
        }
        // Verification needs a realized price; a cache hit is fine.
        if let Some(sample) = ctx.price.fetch_price(None).await {
            self.verify_due(ctx, sample.price).await;
        } else if let Some(price) = ctx.price.last_known_price().await {
            self.verify_due(ctx, price).await;
        } else {
            debug!("no price available, verification deferred");
        }
        Ok(())
    }

    async fn analyze(&mut self, ctx: &mut AgentContext) -> Result<Option<AgentOutput>> {
        let prices = ctx.prices();
        let Some(&price) = prices.last() else {
            return Ok(None);
        };
        if prices.len() < MIN_HISTORY {
            return Ok(Some(AgentOutput::hold(price, "Insufficient data")));
        }

        let now = now_ms();
        let mut forecasts = Vec::with_capacity(HORIZONS.len());
        let mut flagship: Option<(Direction, f64, u64)> = None;
        let mut hour_forecast = (0.0, 0.0);

        for &horizon in &HORIZONS {
            let (score, confidence) = Self::ensemble(&prices, horizon);
            if horizon == 60 {
                hour_forecast = (score, confidence);
            }
            let direction = Direction::from_score(score);
            forecasts.push(json!({
                "horizonMinutes": horizon,
                "direction": direction,
                "score": score,
                "confidence": confidence,
            }));

            self.pending.push(PendingPrediction {
                direction,
                confidence,
                reference_price: price,
                target_time_ms: now + (horizon * 60_000) as i64,
                horizon_minutes: horizon,
                onchain_index: None,
            });

            let is_flagship = flagship
                .map(|(_, best, _)| confidence > best)
                .unwrap_or(true);
            if is_flagship {
                flagship = Some((direction, confidence, horizon));
            }
        }

        // Post the most confident horizon to the registry.
        if let Some((direction, confidence, horizon)) = flagship {
            if confidence >= self.spec().min_confidence
                && direction != Direction::Sideways
                && ctx.chain.can_write()
            {
                if self.onchain_counter.is_none() {
                    self.onchain_counter = ctx.chain.prediction_count().await.ok();
                }
                let target_unix =
                    (now / 1000) as u64 + horizon * 60;
                match ctx
                    .chain
                    .post_prediction(direction.as_str(), confidence, price, target_unix)
                    .await
                {
                    Ok(tx) => {
                        info!(%direction, horizon, tx = %tx, "prediction posted on-chain");
                        // Tag the newest pending entry for that horizon so
                        // verification can reach the contract too.
                        if let Some(index) = self.onchain_counter {
                            if let Some(entry) = self
                                .pending
                                .iter_mut()
                                .rev()
                                .find(|p| p.horizon_minutes == horizon)
                            {
                                entry.onchain_index = Some(index);
                            }
                            self.onchain_counter = Some(index + 1);
                        }
                    }
                    Err(e) => warn!(error = %e, "on-chain prediction failed"),
                }
            }
        }

        let (score, confidence) = hour_forecast;
        let direction = Direction::from_score(score);
        let kind = match direction {
            Direction::Up => SignalKind::Buy,
            Direction::Down => SignalKind::Sell,
            Direction::Sideways => SignalKind::Hold,
        };

        let reason = format!(
            "Ensemble {direction} (score {score:.2}) over 60m; accuracy {:.0}% of {} verified",
            self.accuracy(),
            self.verified_total
        );

        let horizon_accuracy: serde_json::Map<String, serde_json::Value> = self
            .horizon_stats
            .iter()
            .map(|(horizon, (correct, total))| {
                let pct = if *total > 0 {
                    *correct as f64 / *total as f64 * 100.0
                } else {
                    0.0
                };
                (format!("{horizon}m"), json!({"correct": correct, "total": total, "pct": pct}))
            })
            .collect();

        let extra = json!({
            "forecasts": forecasts,
            "pendingCount": self.pending.len(),
            "accuracy": self.accuracy(),
            "verified": self.verified_total,
            "horizonAccuracy": horizon_accuracy,
        });

        Ok(Some(
            AgentOutput::new(kind, confidence, price, reason).with_extra(extra),
        ))
    }
}
