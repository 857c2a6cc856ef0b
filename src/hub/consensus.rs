//! Weighted multi-agent consensus with freshness decay.

use crate::domain::{now_ms, SignalKind};
use crate::hub::state::StoredSignal;
use serde::Serialize;
use std::collections::HashMap;

/// A signal older than this contributes nothing.
pub const SIGNAL_EXPIRY_MS: i64 = 20 * 60 * 1000;

/// Label thresholds on the normalized score.
const CONSENSUS_THRESHOLD: f64 = 0.15;

/// Per-agent weights. They total 1.00; agents missing from this table
/// (gas) never contribute.
pub const AGENT_WEIGHTS: &[(&str, f64)] = &[
    ("trading", 0.30),
    ("market", 0.20),
    ("prediction", 0.15),
    ("liquidity", 0.12),
    ("sentiment", 0.10),
    ("onchain", 0.08),
    ("whale", 0.05),
];

fn weight_for(agent: &str) -> Option<f64> {
    AGENT_WEIGHTS
        .iter()
        .find(|(name, _)| *name == agent)
        .map(|(_, w)| *w)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub agent: String,
    pub signal: SignalKind,
    pub confidence: f64,
    pub weight: f64,
    pub age_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consensus {
    pub signal: SignalKind,
    /// Normalized score in [-1, 1]; 0 with no contributors.
    pub score: f64,
    /// `min(95, round(|score| * 100))`.
    pub strength: u32,
    /// Fraction of contributors voting with the mode, percent.
    pub agreement_pct: f64,
    pub contributors: Vec<Contribution>,
    pub computed_at: i64,
}

impl Consensus {
    pub fn empty() -> Self {
        Self {
            signal: SignalKind::Hold,
            score: 0.0,
            strength: 0,
            agreement_pct: 0.0,
            contributors: Vec::new(),
            computed_at: now_ms(),
        }
    }
}

/// Fold the latest per-agent signals into one verdict. Entries older
/// than the expiry window are ignored (they stay in the map until
/// overwritten, they just stop counting).
pub fn compute(agent_signals: &HashMap<String, StoredSignal>) -> Consensus {
    compute_at(agent_signals, now_ms())
}

pub fn compute_at(agent_signals: &HashMap<String, StoredSignal>, now: i64) -> Consensus {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    let mut contributors = Vec::new();

    for (agent, signal) in agent_signals {
        let Some(weight) = weight_for(agent) else {
            continue;
        };
        let age_ms = now - signal.received_at;
        if age_ms > SIGNAL_EXPIRY_MS {
            continue;
        }
        let score = signal.kind.sign() * (signal.confidence / 100.0);
        weighted_sum += score * weight;
        total_weight += weight;
        contributors.push(Contribution {
            agent: agent.clone(),
            signal: signal.kind,
            confidence: signal.confidence,
            weight,
            age_seconds: age_ms / 1000,
        });
    }

    if total_weight <= 0.0 {
        return Consensus::empty();
    }

    let normalized = weighted_sum / total_weight;
    let signal = SignalKind::from_score(normalized, CONSENSUS_THRESHOLD);
    let strength = ((normalized.abs() * 100.0).round() as u32).min(95);

    // Agreement: how many contributors voted with the most common label.
    let mut counts: HashMap<SignalKind, usize> = HashMap::new();
    for c in &contributors {
        *counts.entry(c.signal).or_insert(0) += 1;
    }
    let mode_count = counts.values().copied().max().unwrap_or(0);
    let agreement_pct = if contributors.is_empty() {
        0.0
    } else {
        mode_count as f64 / contributors.len() as f64 * 100.0
    };

    contributors.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));

    Consensus {
        signal,
        score: normalized,
        strength,
        agreement_pct,
        contributors,
        computed_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(kind: SignalKind, confidence: f64, received_at: i64) -> StoredSignal {
        StoredSignal {
            agent_name: String::new(),
            kind,
            confidence,
            price: 1.0,
            reason: None,
            received_at,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_weights_total_one() {
        let total: f64 = AGENT_WEIGHTS.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_map_is_neutral() {
        let consensus = compute(&HashMap::new());
        assert_eq!(consensus.signal, SignalKind::Hold);
        assert_eq!(consensus.score, 0.0);
        assert_eq!(consensus.strength, 0);
    }

    #[test]
    fn test_documented_consensus_example() {
        // Trading BUY@80, Market HOLD@50, Prediction SELL@60,
        // Liquidity BUY@70 =>
        // (0.24 + 0 - 0.09 + 0.084) / 0.77 ~= 0.304 => BUY, strength 30.
        let now = 1_000_000;
        let mut signals = HashMap::new();
        signals.insert("trading".to_string(), stored(SignalKind::Buy, 80.0, now));
        signals.insert("market".to_string(), stored(SignalKind::Hold, 50.0, now));
        signals.insert("prediction".to_string(), stored(SignalKind::Sell, 60.0, now));
        signals.insert("liquidity".to_string(), stored(SignalKind::Buy, 70.0, now));

        let consensus = compute_at(&signals, now);
        assert_eq!(consensus.signal, SignalKind::Buy);
        assert!((consensus.score - 0.3039).abs() < 0.001, "{}", consensus.score);
        assert_eq!(consensus.strength, 30);
        assert_eq!(consensus.contributors.len(), 4);
        // Two of four contributors said BUY.
        assert!((consensus.agreement_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_expired_signals_are_ignored() {
        let now = SIGNAL_EXPIRY_MS * 10;
        let mut signals = HashMap::new();
        signals.insert(
            "trading".to_string(),
            stored(SignalKind::Buy, 90.0, now - SIGNAL_EXPIRY_MS - 1),
        );
        signals.insert("market".to_string(), stored(SignalKind::Buy, 80.0, now));

        let consensus = compute_at(&signals, now);
        assert_eq!(consensus.contributors.len(), 1);
        assert_eq!(consensus.contributors[0].agent, "market");
        // Entry at exactly the window boundary still counts.
        signals.insert(
            "liquidity".to_string(),
            stored(SignalKind::Buy, 80.0, now - SIGNAL_EXPIRY_MS),
        );
        let consensus = compute_at(&signals, now);
        assert_eq!(consensus.contributors.len(), 2);
    }

    #[test]
    fn test_unweighted_agent_contributes_nothing() {
        let now = 1_000_000;
        let mut signals = HashMap::new();
        signals.insert("gas".to_string(), stored(SignalKind::Buy, 95.0, now));
        let consensus = compute_at(&signals, now);
        assert!(consensus.contributors.is_empty());
        assert_eq!(consensus.score, 0.0);
    }

    #[test]
    fn test_strength_caps_at_95() {
        let now = 1_000_000;
        let mut signals = HashMap::new();
        signals.insert("trading".to_string(), stored(SignalKind::Buy, 100.0, now));
        let consensus = compute_at(&signals, now);
        // Single BUY@100 normalizes to 1.0 => min(95, 100).
        assert_eq!(consensus.strength, 95);
        assert_eq!(consensus.agreement_pct, 100.0);
    }
}
