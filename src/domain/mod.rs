pub mod prediction;
pub mod price;
pub mod signal;
pub mod transfer;

pub use prediction::{Direction, PendingPrediction};
pub use price::{BondingProgress, PriceSample, PriceSource};
pub use signal::{AgentOutput, Category, SignalKind};
pub use transfer::{TransferEvent, WhaleProfile, WhaleTally};

/// Wall-clock milliseconds since the Unix epoch. Target times, freshness
/// windows and cache TTLs all use this clock.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
