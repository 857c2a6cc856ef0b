use serde::{Deserialize, Serialize};

/// Predicted price direction over a horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Sideways,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Sideways => "SIDEWAYS",
        }
    }

    /// Label a mean ensemble score: above +0.15 UP, below -0.15 DOWN.
    pub fn from_score(score: f64) -> Self {
        if score > 0.15 {
            Direction::Up
        } else if score < -0.15 {
            Direction::Down
        } else {
            Direction::Sideways
        }
    }

    /// Label a realized return the way the registry contract does when
    /// verifying: +-0.5% for UP/DOWN, inside +-1% counts as SIDEWAYS.
    pub fn from_realized_return(ret: f64) -> Self {
        if ret > 0.005 {
            Direction::Up
        } else if ret < -0.005 {
            Direction::Down
        } else {
            Direction::Sideways
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A prediction awaiting verification against the realized price.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPrediction {
    pub direction: Direction,
    /// Confidence in [0, 100].
    pub confidence: f64,
    pub reference_price: f64,
    /// Wall-clock ms at which the prediction becomes verifiable.
    pub target_time_ms: i64,
    pub horizon_minutes: u64,
    /// Index in the on-chain prediction log, when posted.
    pub onchain_index: Option<u64>,
}

impl PendingPrediction {
    pub fn is_due(&self, now_ms: i64) -> bool {
        now_ms >= self.target_time_ms
    }

    /// Whether the realized price over the horizon matches the predicted
    /// direction. UP/DOWN need a move past +-0.5%; SIDEWAYS needs the
    /// absolute return to stay under 1%.
    pub fn is_correct(&self, actual_price: f64) -> bool {
        if self.reference_price <= 0.0 {
            return false;
        }
        let ret = (actual_price - self.reference_price) / self.reference_price;
        match self.direction {
            Direction::Up => ret > 0.005,
            Direction::Down => ret < -0.005,
            Direction::Sideways => ret.abs() < 0.01,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(direction: Direction) -> PendingPrediction {
        PendingPrediction {
            direction,
            confidence: 60.0,
            reference_price: 1.0,
            target_time_ms: 1000,
            horizon_minutes: 5,
            onchain_index: None,
        }
    }

    #[test]
    fn test_up_prediction_verification() {
        let p = pending(Direction::Up);
        assert!(p.is_correct(1.01)); // +1%
        assert!(!p.is_correct(1.004)); // +0.4%, under threshold
        assert!(!p.is_correct(0.99));
    }

    #[test]
    fn test_down_prediction_verification() {
        let p = pending(Direction::Down);
        assert!(p.is_correct(0.99));
        assert!(!p.is_correct(1.0));
    }

    #[test]
    fn test_sideways_prediction_verification() {
        let p = pending(Direction::Sideways);
        assert!(p.is_correct(1.005));
        assert!(p.is_correct(0.995));
        assert!(!p.is_correct(1.02));
    }

    #[test]
    fn test_due_at_exact_target_time() {
        let p = pending(Direction::Up);
        assert!(!p.is_due(999));
        assert!(p.is_due(1000));
        assert!(p.is_due(1001));
    }

    #[test]
    fn test_direction_from_score() {
        assert_eq!(Direction::from_score(0.2), Direction::Up);
        assert_eq!(Direction::from_score(-0.2), Direction::Down);
        assert_eq!(Direction::from_score(0.0), Direction::Sideways);
    }
}
