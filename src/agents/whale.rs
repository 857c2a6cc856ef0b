//! Whale agent: large-transfer surveillance over the token's event log.
//!
//! Keeps a monotone block cursor so no block is scanned twice by one
//! instance, tallies both endpoints of every large transfer, and tiers
//! alerts by fraction of total supply.

use crate::agents::{AgentContext, AgentSpec, Analyzer};
use crate::domain::{now_ms, AgentOutput, SignalKind, TransferEvent, WhaleProfile, WhaleTally};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info};

/// First-run scan depth.
const LOOKBACK_BLOCKS: u64 = 500;

/// Transfers below this many whole tokens are ignored.
const MIN_TRANSFER_TOKENS: f64 = 1_000_000.0;

/// Supply-fraction tiers.
const MEGA_SUPPLY_FRACTION: f64 = 0.005;
const LARGE_SUPPLY_FRACTION: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTier {
    Mega,
    Large,
    Whale,
}

impl AlertTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertTier::Mega => "MEGA",
            AlertTier::Large => "LARGE",
            AlertTier::Whale => "WHALE",
        }
    }

    pub fn classify(value_tokens: f64, total_supply: Option<f64>) -> Self {
        let Some(supply) = total_supply.filter(|s| *s > 0.0) else {
            return AlertTier::Whale;
        };
        let fraction = value_tokens / supply;
        if fraction >= MEGA_SUPPLY_FRACTION {
            AlertTier::Mega
        } else if fraction >= LARGE_SUPPLY_FRACTION {
            AlertTier::Large
        } else {
            AlertTier::Whale
        }
    }
}

pub struct WhaleAgent {
    /// Highest block already scanned; next scan starts one past it.
    last_scanned_block: Option<u64>,
    /// Wallet tallies, keyed by lowercased address. Never evicted.
    wallets: HashMap<String, WhaleTally>,
    total_supply: Option<f64>,
}

impl WhaleAgent {
    pub fn new() -> Self {
        Self {
            last_scanned_block: None,
            wallets: HashMap::new(),
            total_supply: None,
        }
    }

    pub fn last_scanned_block(&self) -> Option<u64> {
        self.last_scanned_block
    }

    /// Inclusive scan range for the current tip, or `None` when there is
    /// nothing new.
    fn scan_range(&self, current_block: u64) -> Option<(u64, u64)> {
        match self.last_scanned_block {
            None => Some((current_block.saturating_sub(LOOKBACK_BLOCKS), current_block)),
            Some(last) if last < current_block => Some((last + 1, current_block)),
            Some(_) => None,
        }
    }

    /// Update both endpoints' tallies and return the signal contribution
    /// of this transfer based on the counterparties' profiles.
    fn record_transfer(&mut self, transfer: &TransferEvent) -> f64 {
        let now = now_ms();
        let sender_profile = {
            let tally = self
                .wallets
                .entry(transfer.from.to_lowercase())
                .or_insert_with(|| WhaleTally::new(&transfer.from, now));
            tally.record_out(transfer.value, now);
            tally.profile()
        };
        let recipient_profile = {
            let tally = self
                .wallets
                .entry(transfer.to.to_lowercase())
                .or_insert_with(|| WhaleTally::new(&transfer.to, now));
            tally.record_in(transfer.value, now);
            tally.profile()
        };

        // Tokens flowing into accumulators read bullish; accumulators
        // unloading, or distributors receiving fresh inventory, bearish.
        let mut vote = 0.0;
        if recipient_profile == WhaleProfile::Accumulator {
            vote += 1.0;
        }
        if sender_profile == WhaleProfile::Accumulator {
            vote -= 1.0;
        }
        if recipient_profile == WhaleProfile::Distributor {
            vote -= 0.5;
        }
        if sender_profile == WhaleProfile::Distributor {
            vote += 0.5;
        }
        vote
    }
}

/// Addresses that both received and sent a large transfer within the
/// same scanned window.
fn round_trip_addresses(transfers: &[TransferEvent]) -> Vec<String> {
    use std::collections::HashSet;
    let senders: HashSet<String> = transfers.iter().map(|t| t.from.to_lowercase()).collect();
    let mut seen = HashSet::new();
    transfers
        .iter()
        .map(|t| t.to.to_lowercase())
        .filter(|to| senders.contains(to))
        .filter(|to| seen.insert(to.clone()))
        .collect()
}

impl Default for WhaleAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for WhaleAgent {
    fn spec(&self) -> &'static AgentSpec {
        &crate::agents::FLEET[3]
    }

    async fn analyze(&mut self, ctx: &mut AgentContext) -> Result<Option<AgentOutput>> {
        let current_block = match ctx.chain.block_number().await {
            Ok(b) => b,
            Err(e) => {
                debug!(error = %e, "block number unavailable, skipping scan");
                return Ok(None);
            }
        };

        let Some((from_block, to_block)) = self.scan_range(current_block) else {
            return Ok(None);
        };

        if self.total_supply.is_none() {
            self.total_supply = ctx.chain.token_total_supply().await.ok();
        }

        let transfers = ctx.chain.transfer_logs(from_block, to_block).await?;
        // The cursor only advances after a successful log read, so a
        // failed range is retried whole on the next tick.
        self.last_scanned_block = Some(to_block);

        let price = ctx.history.last().copied().unwrap_or(0.0);
        let mut vote_sum = 0.0;
        let mut large_count = 0u32;
        let mut largest_value = 0.0f64;

        let large: Vec<TransferEvent> = transfers
            .into_iter()
            .filter(|t| t.value >= MIN_TRANSFER_TOKENS)
            .collect();

        for transfer in &large {
            vote_sum += self.record_transfer(transfer);
            large_count += 1;
            largest_value = largest_value.max(transfer.value);

            let tier = AlertTier::classify(transfer.value, self.total_supply);
            info!(
                tier = tier.as_str(),
                value = transfer.value,
                from = %transfer.from,
                to = %transfer.to,
                "large transfer"
            );
            ctx.hub
                .post_whale_alert(&json!({
                    "agentName": self.spec().name,
                    "tier": tier.as_str(),
                    "value": transfer.value,
                    "from": transfer.from,
                    "to": transfer.to,
                    "txHash": transfer.tx_hash,
                    "blockNumber": transfer.block_number,
                    "supplyPct": self.total_supply
                        .filter(|s| *s > 0.0)
                        .map(|s| transfer.value / s * 100.0),
                    "timestamp": now_ms(),
                }))
                .await;
        }

        // Round-trip flows inside one window (the same wallet on both
        // sides of large transfers) look sandwich-able; surface them on
        // the MEV ring.
        for address in round_trip_addresses(&large) {
            ctx.hub
                .post_mev_opportunity(&json!({
                    "agentName": self.spec().name,
                    "kind": "ROUND_TRIP",
                    "address": address,
                    "blockRange": [from_block, to_block],
                    "timestamp": now_ms(),
                }))
                .await;
        }

        // Network stats ride along on every tick. Gas is converted with
        // the exact 1e9 divisor inside the chain client.
        let gas_gwei = ctx.chain.gas_price_gwei().await.unwrap_or(0.0);

        let (kind, confidence) = if large_count == 0 {
            (SignalKind::Hold, 35.0)
        } else if vote_sum > 0.5 {
            (SignalKind::Buy, (55.0 + vote_sum * 10.0).min(90.0))
        } else if vote_sum < -0.5 {
            (SignalKind::Sell, (55.0 + vote_sum.abs() * 10.0).min(90.0))
        } else {
            (SignalKind::Hold, 45.0)
        };

        let reason = if large_count == 0 {
            format!("No large transfers in blocks {from_block}-{to_block}")
        } else {
            format!(
                "{large_count} large transfer(s) in blocks {from_block}-{to_block}, flow bias {vote_sum:+.1}"
            )
        };

        let extra = json!({
            "scannedFrom": from_block,
            "scannedTo": to_block,
            "largeTransfers": large_count,
            "largestTransfer": largest_value,
            "trackedWallets": self.wallets.len(),
            "networkStats": {
                "blockHeight": current_block,
                "gasPriceGwei": gas_gwei,
            },
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
            tx_hash: "0xabc".to_string(),
        }
    }

    #[test]
    fn test_first_scan_uses_lookback() {
        let agent = WhaleAgent::new();
        assert_eq!(agent.scan_range(10_000), Some((9_500, 10_000)));
        // A young chain must not underflow.
        assert_eq!(agent.scan_range(100), Some((0, 100)));
    }

    #[test]
    fn test_cursor_is_monotone_without_overlap() {
        let mut agent = WhaleAgent::new();
        let (_, to) = agent.scan_range(10_000).unwrap();
        agent.last_scanned_block = Some(to);

        // Next scan starts exactly one past the previous end.
        assert_eq!(agent.scan_range(10_050), Some((10_001, 10_050)));
        agent.last_scanned_block = Some(10_050);

        // No new blocks: nothing to scan, cursor holds.
        assert_eq!(agent.scan_range(10_050), None);
        assert_eq!(agent.last_scanned_block(), Some(10_050));
    }

    #[test]
    fn test_alert_tiers_by_supply_fraction() {
        let supply = Some(1_000_000_000.0);
        assert_eq!(AlertTier::classify(6_000_000.0, supply), AlertTier::Mega); // 0.6%
        assert_eq!(AlertTier::classify(5_000_000.0, supply), AlertTier::Mega); // 0.5% boundary
        assert_eq!(AlertTier::classify(2_000_000.0, supply), AlertTier::Large); // 0.2%
        assert_eq!(AlertTier::classify(1_000_000.0, supply), AlertTier::Large); // 0.1% boundary
        assert_eq!(AlertTier::classify(500_000.0, supply), AlertTier::Whale); // 0.05%
        // Unknown supply degrades to the base tier.
        assert_eq!(AlertTier::classify(6_000_000.0, None), AlertTier::Whale);
    }

    #[test]
    fn test_tallies_update_both_endpoints() {
        let mut agent = WhaleAgent::new();
        agent.record_transfer(&transfer("0xAAA", "0xBBB", 2_000_000.0));
        assert_eq!(agent.wallets.len(), 2);
        let sender = &agent.wallets["0xaaa"];
        let recipient = &agent.wallets["0xbbb"];
        assert_eq!(sender.total_out, 2_000_000.0);
        assert_eq!(sender.total_in, 0.0);
        assert_eq!(recipient.total_in, 2_000_000.0);
        assert_eq!(recipient.net_flow(), 2_000_000.0);
    }

    #[test]
    fn test_round_trip_detection() {
        let transfers = vec![
            transfer("0xAAA", "0xBBB", 2_000_000.0),
            transfer("0xBBB", "0xCCC", 2_000_000.0),
            transfer("0xDDD", "0xEEE", 2_000_000.0),
        ];
        let hits = round_trip_addresses(&transfers);
        assert_eq!(hits, vec!["0xbbb".to_string()]);
    }

    #[test]
    fn test_accumulator_inflow_votes_bullish() {
        let mut agent = WhaleAgent::new();
        // Build an accumulator profile for 0xbbb.
        for _ in 0..5 {
            agent.record_transfer(&transfer("0xccc", "0xbbb", 2_000_000.0));
        }
        let vote = agent.record_transfer(&transfer("0xddd", "0xbbb", 2_000_000.0));
        assert!(vote > 0.0, "vote {vote}");
    }
}
