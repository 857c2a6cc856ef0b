//! The agent fleet.
//!
//! Eight analytical pipelines share one runtime scaffold
//! ([`runtime::run_agent`]); a variant differs only in its `analyze`
//! implementation and side-effects. The fleet table below is the single
//! source of truth for names, cadences and the supervisor's staggered
//! launch schedule.

pub mod gas;
pub mod liquidity;
pub mod market;
pub mod onchain;
pub mod prediction;
pub mod runtime;
pub mod sentiment;
pub mod trading;
pub mod whale;

use crate::chain::ChainClient;
use crate::config::Settings;
use crate::domain::{AgentOutput, Category, PriceSample};
use crate::error::Result;
use crate::hub_client::{HeartbeatStats, HubClient};
use crate::market::{PriceService, Ring};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Static parameters of one agent variant.
#[derive(Debug, Clone, Copy)]
pub struct AgentSpec {
    pub name: &'static str,
    pub category: Category,
    pub interval: Duration,
    pub history_size: usize,
    /// Signals below this confidence stay off-chain (hub only).
    pub min_confidence: f64,
    /// Offset from supervisor start to first launch.
    pub launch_delay: Duration,
}

/// The full fleet in launch order.
pub const FLEET: &[AgentSpec] = &[
    AgentSpec {
        name: "trading",
        category: Category::Technical,
        interval: Duration::from_secs(45),
        history_size: 100,
        min_confidence: 65.0,
        launch_delay: Duration::from_secs(0),
    },
    AgentSpec {
        name: "prediction",
        category: Category::Prediction,
        interval: Duration::from_secs(60),
        history_size: 300,
        min_confidence: 60.0,
        launch_delay: Duration::from_secs(5),
    },
    AgentSpec {
        name: "market",
        category: Category::Market,
        interval: Duration::from_secs(60),
        history_size: 100,
        min_confidence: 70.0,
        launch_delay: Duration::from_secs(10),
    },
    AgentSpec {
        name: "whale",
        category: Category::Whale,
        interval: Duration::from_secs(30),
        history_size: 50,
        min_confidence: 70.0,
        launch_delay: Duration::from_secs(15),
    },
    AgentSpec {
        name: "liquidity",
        category: Category::Liquidity,
        interval: Duration::from_secs(120),
        history_size: 50,
        min_confidence: 65.0,
        launch_delay: Duration::from_secs(20),
    },
    AgentSpec {
        name: "sentiment",
        category: Category::Sentiment,
        interval: Duration::from_secs(90),
        history_size: 100,
        min_confidence: 65.0,
        launch_delay: Duration::from_secs(25),
    },
    AgentSpec {
        name: "onchain",
        category: Category::Onchain,
        interval: Duration::from_secs(120),
        history_size: 50,
        min_confidence: 70.0,
        launch_delay: Duration::from_secs(30),
    },
    AgentSpec {
        name: "gas",
        category: Category::Gas,
        interval: Duration::from_secs(15),
        history_size: 50,
        min_confidence: 75.0,
        launch_delay: Duration::from_secs(35),
    },
];

pub fn spec_by_name(name: &str) -> Option<&'static AgentSpec> {
    FLEET.iter().find(|s| s.name == name)
}

/// Shared per-agent state handed to `analyze` on every tick.
pub struct AgentContext {
    pub settings: Arc<Settings>,
    pub chain: Arc<ChainClient>,
    pub price: Arc<PriceService>,
    pub hub: Arc<HubClient>,
    pub cancel: CancellationToken,
    /// Bounded price history, oldest first.
    pub history: Ring<f64>,
    /// Parallel volume ring, same length discipline.
    pub volumes: Ring<f64>,
    pub last_sample: Option<PriceSample>,
    /// Tick/error counters reported by the heartbeat.
    pub stats: Arc<HeartbeatStats>,
}

impl AgentContext {
    pub fn prices(&self) -> Vec<f64> {
        self.history.to_vec()
    }

    pub fn volume_vec(&self) -> Vec<f64> {
        self.volumes.to_vec()
    }
}

/// One agent variant: a pull-based analyzer the runtime drives.
///
/// `analyze` returning `Ok(None)` means "nothing to say this tick" (e.g.
/// no price data); the runtime then posts nothing anywhere. Errors are
/// caught at the tick boundary and never kill the loop.
#[async_trait]
pub trait Analyzer: Send {
    fn spec(&self) -> &'static AgentSpec;

    /// Hook that runs before the price fetch. The prediction agent
    /// verifies due predictions here.
    async fn before_tick(&mut self, _ctx: &mut AgentContext) -> Result<()> {
        Ok(())
    }

    async fn analyze(&mut self, ctx: &mut AgentContext) -> Result<Option<AgentOutput>>;
}

/// Construct the variant for a fleet name.
pub fn build_analyzer(name: &str) -> Option<Box<dyn Analyzer>> {
    match name {
        "trading" => Some(Box::new(trading::TradingAgent::new())),
        "prediction" => Some(Box::new(prediction::PredictionAgent::new())),
        "market" => Some(Box::new(market::MarketAgent::new())),
        "whale" => Some(Box::new(whale::WhaleAgent::new())),
        "liquidity" => Some(Box::new(liquidity::LiquidityAgent::new())),
        "sentiment" => Some(Box::new(sentiment::SentimentAgent::new())),
        "onchain" => Some(Box::new(onchain::OnchainAgent::new())),
        "gas" => Some(Box::new(gas::GasAgent::new())),
        _ => None,
    }
}

/// Shared construction of a standalone context for variant tests. All
/// endpoints point at unreachable or read-only targets; no test path
/// touches the network.
#[cfg(test)]
pub mod runtime_test_support {
    use super::*;

    pub fn test_settings() -> Settings {
        Settings {
            rpc_url: "https://testnet-rpc.monad.xyz".to_string(),
            private_key: None,
            signals_address: None,
            token_address: alloy::primitives::Address::ZERO,
            wmon_address: None,
            hub_url: "http://127.0.0.1:1".to_string(),
            hub_port: 3001,
            advisor_api_key: None,
        }
    }

    pub fn context_with_prices(prices: &[f64]) -> AgentContext {
        let settings = Arc::new(test_settings());
        let chain = Arc::new(ChainClient::new(&settings).unwrap());
        let price = Arc::new(PriceService::new(&settings, Some(chain.clone())).unwrap());
        let hub = Arc::new(HubClient::new(&settings.hub_url).unwrap());
        let mut history = Ring::new(prices.len().max(8));
        let mut volumes = Ring::new(prices.len().max(8));
        for &p in prices {
            history.push(p);
            volumes.push(1000.0);
        }
        AgentContext {
            settings,
            chain,
            price,
            hub,
            cancel: CancellationToken::new(),
            history,
            volumes,
            last_sample: None,
            stats: Arc::new(HeartbeatStats::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fleet_has_eight_unique_agents() {
        assert_eq!(FLEET.len(), 8);
        let mut names: Vec<_> = FLEET.iter().map(|s| s.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn test_launch_delays_are_staggered() {
        for pair in FLEET.windows(2) {
            assert!(pair[0].launch_delay < pair[1].launch_delay);
        }
    }

    #[test]
    fn test_history_sizes_in_range() {
        for spec in FLEET {
            assert!((50..=300).contains(&spec.history_size), "{}", spec.name);
        }
    }

    #[test]
    fn test_every_fleet_member_buildable() {
        for spec in FLEET {
            assert!(build_analyzer(spec.name).is_some(), "{}", spec.name);
        }
        assert!(build_analyzer("unknown").is_none());
    }
}
