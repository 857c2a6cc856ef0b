//! On-chain activity agent: transfer-flow aggregation, holder growth and
//! an organic-activity score that penalizes wash-trading shapes.

use crate::agents::{AgentContext, AgentSpec, Analyzer};
use crate::domain::{AgentOutput, SignalKind, TransferEvent};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use tracing::debug;

/// First-run scan depth, matching the whale agent's window.
const LOOKBACK_BLOCKS: u64 = 500;

/// Addresses treated as routers/contracts for buy/sell inference. A
/// transfer out of a router is a buy, into a router a sell.
const ROUTER_ADDRESSES: &[&str] = &[
    "0x760afe86e5de5fa0ee542fc7b7b713e1c5425701",
    "0x0000000000000000000000000000000000000000",
];

/// Aggregate view of one scanned window.
#[derive(Debug, Clone, Default)]
pub struct WindowStats {
    pub transfers: usize,
    pub buys: usize,
    pub sells: usize,
    pub unique_addresses: usize,
    pub new_holders: usize,
    /// Tokens moved per block across the window.
    pub velocity: f64,
    pub organic_score: f64,
}

pub struct OnchainAgent {
    last_scanned_block: Option<u64>,
    /// Every address ever seen receiving tokens; first sightings count as
    /// new holders.
    known_holders: HashSet<String>,
}

fn is_router(address: &str) -> bool {
    let lower = address.to_lowercase();
    ROUTER_ADDRESSES.iter().any(|r| *r == lower)
}

impl OnchainAgent {
    pub fn new() -> Self {
        Self {
            last_scanned_block: None,
            known_holders: HashSet::new(),
        }
    }

    fn scan_range(&self, current_block: u64) -> Option<(u64, u64)> {
        match self.last_scanned_block {
            None => Some((current_block.saturating_sub(LOOKBACK_BLOCKS), current_block)),
            Some(last) if last < current_block => Some((last + 1, current_block)),
            Some(_) => None,
        }
    }

    fn aggregate(&mut self, transfers: &[TransferEvent], span_blocks: u64) -> WindowStats {
        let mut stats = WindowStats {
            transfers: transfers.len(),
            ..Default::default()
        };

        let mut addresses = HashSet::new();
        let mut total_moved = 0.0;
        for t in transfers {
            let from = t.from.to_lowercase();
            let to = t.to.to_lowercase();
            addresses.insert(from.clone());
            addresses.insert(to.clone());
            total_moved += t.value;

            match (is_router(&from), is_router(&to)) {
                (true, false) => stats.buys += 1,
                (false, true) => stats.sells += 1,
                _ => {}
            }

            if !is_router(&to) && self.known_holders.insert(to) {
                stats.new_holders += 1;
            }
        }
        stats.unique_addresses = addresses.len();
        stats.velocity = if span_blocks > 0 {
            total_moved / span_blocks as f64
        } else {
            0.0
        };
        stats.organic_score = organic_score(transfers);
        stats
    }
}

/// Organic-activity score in [0, 100], starting from 70.
///
/// Circular flows (A->B->A and A->B->C->A) and suspiciously uniform
/// transfer sizes subtract; size variety and a high unique-address ratio
/// add.
pub fn organic_score(transfers: &[TransferEvent]) -> f64 {
    let mut score: f64 = 70.0;
    if transfers.len() < 2 {
        return score;
    }

    // Circular pattern search over the window, in order.
    let hops: Vec<(String, String)> = transfers
        .iter()
        .map(|t| (t.from.to_lowercase(), t.to.to_lowercase()))
        .collect();

    let mut circular = 0usize;
    for i in 0..hops.len() {
        for j in (i + 1)..hops.len() {
            // A -> B followed by B -> A.
            if hops[i].0 == hops[j].1 && hops[i].1 == hops[j].0 {
                circular += 1;
            }
            // A -> B, B -> C, C -> A.
            for k in (j + 1)..hops.len() {
                if hops[i].1 == hops[j].0 && hops[j].1 == hops[k].0 && hops[k].1 == hops[i].0 {
                    circular += 1;
                }
            }
        }
    }
    score -= (circular as f64 * 8.0).min(40.0);

    // Coefficient of variation of transfer sizes.
    let values: Vec<f64> = transfers.iter().map(|t| t.value).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean > 0.0 {
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        let cv = variance.sqrt() / mean;
        if cv < 0.1 {
            // Bot-uniform sizing.
            score -= 15.0;
        } else if cv > 0.5 {
            score += 10.0;
        }
    }

    // Many distinct participants per transfer reads organic.
    let mut addresses = HashSet::new();
    for t in transfers {
        addresses.insert(t.from.to_lowercase());
        addresses.insert(t.to.to_lowercase());
    }
    let unique_ratio = addresses.len() as f64 / (transfers.len() as f64 * 2.0);
    if unique_ratio > 0.6 {
        score += 10.0;
    } else if unique_ratio < 0.25 {
        score -= 10.0;
    }

    score.clamp(0.0, 100.0)
}

impl Default for OnchainAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for OnchainAgent {
    fn spec(&self) -> &'static AgentSpec {
        &crate::agents::FLEET[6]
    }

    async fn analyze(&mut self, ctx: &mut AgentContext) -> Result<Option<AgentOutput>> {
        let current_block = match ctx.chain.block_number().await {
            Ok(b) => b,
            Err(e) => {
                debug!(error = %e, "block number unavailable");
                return Ok(None);
            }
        };
        let Some((from_block, to_block)) = self.scan_range(current_block) else {
            return Ok(None);
        };

        let transfers = ctx.chain.transfer_logs(from_block, to_block).await?;
        self.last_scanned_block = Some(to_block);

        let stats = self.aggregate(&transfers, to_block - from_block + 1);
        let price = ctx.history.last().copied().unwrap_or(0.0);

        // Flow-based direction: net buys with organic activity is
        // accumulation; heavy sells or wash shapes lean bearish.
        let flow = stats.buys as f64 - stats.sells as f64;
        let organic = stats.organic_score >= 50.0;
        let (kind, confidence) = if stats.transfers == 0 {
            (SignalKind::Hold, 30.0)
        } else if flow > 2.0 && organic {
            (SignalKind::Buy, (55.0 + flow * 2.0).min(90.0))
        } else if flow < -2.0 || stats.organic_score < 35.0 {
            (SignalKind::Sell, (55.0 + flow.abs() * 2.0).min(90.0))
        } else {
            (SignalKind::Hold, 45.0)
        };

        let reason = format!(
            "{} transfers ({} buys/{} sells), {} new holders, organic {:.0}/100",
            stats.transfers, stats.buys, stats.sells, stats.new_holders, stats.organic_score
        );

        let extra = json!({
            "scannedFrom": from_block,
            "scannedTo": to_block,
            "transfers": stats.transfers,
            "buys": stats.buys,
            "sells": stats.sells,
            "uniqueAddresses": stats.unique_addresses,
            "newHolders": stats.new_holders,
            "velocity": stats.velocity,
            "organicScore": stats.organic_score,
        });

        Ok(Some(
            AgentOutput::new(kind, confidence, price, reason).with_extra(extra),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(from: &str, to: &str, value: f64) -> TransferEvent {
        TransferEvent {
            from: from.to_string(),
            to: to.to_string(),
            value,
            block_number: 1,
            tx_hash: String::new(),
        }
    }

    const ROUTER: &str = "0x760afe86e5de5fa0ee542fc7b7b713e1c5425701";

    #[test]
    fn test_buy_sell_inference() {
        let mut agent = OnchainAgent::new();
        let transfers = vec![
            transfer(ROUTER, "0xaaa", 100.0),  // buy
            transfer(ROUTER, "0xbbb", 150.0),  // buy
            transfer("0xaaa", ROUTER, 50.0),   // sell
            transfer("0xccc", "0xddd", 10.0),  // plain move
        ];
        let stats = agent.aggregate(&transfers, 10);
        assert_eq!(stats.buys, 2);
        assert_eq!(stats.sells, 1);
        assert_eq!(stats.transfers, 4);
    }

    #[test]
    fn test_new_holder_counting() {
        let mut agent = OnchainAgent::new();
        let first = vec![transfer(ROUTER, "0xaaa", 1.0)];
        assert_eq!(agent.aggregate(&first, 1).new_holders, 1);
        // Same recipient again is not a new holder.
        let second = vec![transfer(ROUTER, "0xaaa", 1.0)];
        assert_eq!(agent.aggregate(&second, 1).new_holders, 0);
        // Router addresses never count as holders.
        let third = vec![transfer("0xaaa", ROUTER, 1.0)];
        assert_eq!(agent.aggregate(&third, 1).new_holders, 0);
    }

    #[test]
    fn test_organic_score_penalizes_circular_flow() {
        // A -> B -> A round trip plus an A -> B -> C -> A triangle.
        let wash = vec![
            transfer("0xa", "0xb", 100.0),
            transfer("0xb", "0xa", 100.0),
            transfer("0xb", "0xc", 100.0),
            transfer("0xc", "0xa", 100.0),
        ];
        let score = organic_score(&wash);
        assert!(score < 50.0, "wash trading should score low, got {score}");
    }

    #[test]
    fn test_organic_score_rewards_variety() {
        let organic = vec![
            transfer("0xa", "0xb", 120.0),
            transfer("0xc", "0xd", 950.0),
            transfer("0xe", "0xf", 40.0),
            transfer("0x1", "0x2", 3000.0),
        ];
        let score = organic_score(&organic);
        assert!(score > 70.0, "varied organic flow should score high, got {score}");
    }

    #[test]
    fn test_organic_score_penalizes_uniform_sizes() {
        let uniform: Vec<TransferEvent> = (0..6)
            .map(|i| transfer(&format!("0xa{i}"), &format!("0xb{i}"), 500.0))
            .collect();
        let varied: Vec<TransferEvent> = (0..6)
            .map(|i| transfer(&format!("0xa{i}"), &format!("0xb{i}"), 100.0 * (i + 1) as f64))
            .collect();
        assert!(organic_score(&uniform) < organic_score(&varied));
    }

    #[test]
    fn test_scan_cursor_monotone() {
        let mut agent = OnchainAgent::new();
        assert_eq!(agent.scan_range(1_000), Some((500, 1_000)));
        agent.last_scanned_block = Some(1_000);
        assert_eq!(agent.scan_range(1_080), Some((1_001, 1_080)));
        assert_eq!(agent.scan_range(900), None);
    }

    #[test]
    fn test_velocity() {
        let mut agent = OnchainAgent::new();
        let transfers = vec![
            transfer("0xa", "0xb", 600.0),
            transfer("0xc", "0xd", 400.0),
        ];
        let stats = agent.aggregate(&transfers, 10);
        assert_eq!(stats.velocity, 100.0);
    }
}
