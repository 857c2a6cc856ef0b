use serde::{Deserialize, Serialize};

/// A decoded ERC-20 `Transfer` event.
///
/// `value` is in whole tokens, converted from base-18 units at the chain
/// client boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    pub from: String,
    pub to: String,
    pub value: f64,
    pub block_number: u64,
    pub tx_hash: String,
}

/// Behavioral classification of a tracked wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WhaleProfile {
    New,
    Accumulator,
    Distributor,
    Trader,
    Mixed,
}

impl WhaleProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            WhaleProfile::New => "NEW",
            WhaleProfile::Accumulator => "ACCUMULATOR",
            WhaleProfile::Distributor => "DISTRIBUTOR",
            WhaleProfile::Trader => "TRADER",
            WhaleProfile::Mixed => "MIXED",
        }
    }
}

impl std::fmt::Display for WhaleProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Running tally for one wallet seen in large transfers. Created on first
/// sighting, updated on every transfer, never evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleTally {
    pub address: String,
    pub total_in: f64,
    pub total_out: f64,
    pub tx_count: u64,
    pub first_seen: i64,
    pub last_seen: i64,
}

impl WhaleTally {
    pub fn new(address: &str, now: i64) -> Self {
        Self {
            address: address.to_lowercase(),
            total_in: 0.0,
            total_out: 0.0,
            tx_count: 0,
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn record_in(&mut self, value: f64, now: i64) {
        self.total_in += value;
        self.tx_count += 1;
        self.last_seen = now;
    }

    pub fn record_out(&mut self, value: f64, now: i64) {
        self.total_out += value;
        self.tx_count += 1;
        self.last_seen = now;
    }

    pub fn net_flow(&self) -> f64 {
        self.total_in - self.total_out
    }

    /// Classify by flow shape. A wallet with almost no history is NEW;
    /// dominant inflow is an ACCUMULATOR, dominant outflow a DISTRIBUTOR,
    /// high churn with balanced flow a TRADER, anything else MIXED.
    pub fn profile(&self) -> WhaleProfile {
        if self.tx_count < 3 {
            return WhaleProfile::New;
        }
        let total = self.total_in + self.total_out;
        if total <= 0.0 {
            return WhaleProfile::New;
        }
        let in_ratio = self.total_in / total;
        if in_ratio > 0.7 {
            WhaleProfile::Accumulator
        } else if in_ratio < 0.3 {
            WhaleProfile::Distributor
        } else if self.tx_count >= 10 {
            WhaleProfile::Trader
        } else {
            WhaleProfile::Mixed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_wallet_is_new() {
        let mut tally = WhaleTally::new("0xAA", 1);
        tally.record_in(100.0, 2);
        assert_eq!(tally.profile(), WhaleProfile::New);
        assert_eq!(tally.address, "0xaa");
    }

    #[test]
    fn test_accumulator_profile() {
        let mut tally = WhaleTally::new("0xaa", 1);
        for i in 0..5 {
            tally.record_in(1000.0, i);
        }
        assert_eq!(tally.profile(), WhaleProfile::Accumulator);
        assert_eq!(tally.net_flow(), 5000.0);
    }

    #[test]
    fn test_distributor_profile() {
        let mut tally = WhaleTally::new("0xaa", 1);
        for i in 0..5 {
            tally.record_out(1000.0, i);
        }
        assert_eq!(tally.profile(), WhaleProfile::Distributor);
        assert!(tally.net_flow() < 0.0);
    }

    #[test]
    fn test_trader_profile_needs_churn() {
        let mut tally = WhaleTally::new("0xaa", 1);
        for i in 0..6 {
            tally.record_in(500.0, i);
            tally.record_out(500.0, i);
        }
        assert_eq!(tally.profile(), WhaleProfile::Trader);
    }
}
