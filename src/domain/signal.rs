use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Trading signal verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Buy => "BUY",
            SignalKind::Sell => "SELL",
            SignalKind::Hold => "HOLD",
        }
    }

    /// Directional sign used by the consensus: BUY=+1, SELL=-1, HOLD=0.
    pub fn sign(&self) -> f64 {
        match self {
            SignalKind::Buy => 1.0,
            SignalKind::Sell => -1.0,
            SignalKind::Hold => 0.0,
        }
    }

    /// Score-to-label thresholding shared by the trading agent and the
    /// hub consensus: above +threshold BUY, below -threshold SELL.
    pub fn from_score(score: f64, threshold: f64) -> Self {
        if score > threshold {
            SignalKind::Buy
        } else if score < -threshold {
            SignalKind::Sell
        } else {
            SignalKind::Hold
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification tag on an emitted signal, one per agent variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Technical,
    Prediction,
    Market,
    Whale,
    Liquidity,
    Sentiment,
    Onchain,
    Gas,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Technical => "technical",
            Category::Prediction => "prediction",
            Category::Market => "market",
            Category::Whale => "whale",
            Category::Liquidity => "liquidity",
            Category::Sentiment => "sentiment",
            Category::Onchain => "onchain",
            Category::Gas => "gas",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The result of one analysis tick, carried to both sinks.
///
/// `extra` is a category-specific payload (indicator blob, buy/sell ratios,
/// gas stats, ...) forwarded verbatim to the hub and preserved there.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutput {
    pub kind: SignalKind,
    /// Confidence in [0, 100].
    pub confidence: f64,
    pub price: f64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub extra: Value,
}

impl AgentOutput {
    pub fn hold(price: f64, reason: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::Hold,
            confidence: 30.0,
            price,
            reason: reason.into(),
            extra: Value::Null,
        }
    }

    pub fn new(kind: SignalKind, confidence: f64, price: f64, reason: impl Into<String>) -> Self {
        Self {
            kind,
            confidence: confidence.clamp(0.0, 100.0),
            price,
            reason: reason.into(),
            extra: Value::Null,
        }
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_kind_serialization() {
        assert_eq!(serde_json::to_string(&SignalKind::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&Category::Onchain).unwrap(), "\"onchain\"");
    }

    #[test]
    fn test_from_score_thresholds() {
        assert_eq!(SignalKind::from_score(0.2, 0.15), SignalKind::Buy);
        assert_eq!(SignalKind::from_score(-0.2, 0.15), SignalKind::Sell);
        assert_eq!(SignalKind::from_score(0.15, 0.15), SignalKind::Hold);
        assert_eq!(SignalKind::from_score(-0.1, 0.15), SignalKind::Hold);
    }

    #[test]
    fn test_output_confidence_clamped() {
        let out = AgentOutput::new(SignalKind::Buy, 140.0, 1.0, "x");
        assert_eq!(out.confidence, 100.0);
    }
}
