//! Generic agent execution loop.
//!
//! init -> register -> heartbeat -> prime history -> tick forever.
//! Ticks are strictly serial: the interval timer skips missed slots
//! instead of queueing a backlog, and one bad tick is logged and dropped
//! without touching the accumulated history.

use crate::agents::{build_analyzer, spec_by_name, AgentContext, Analyzer};
use crate::chain::{ChainClient, Registration};
use crate::config::Settings;
use crate::error::{DuckError, Result};
use crate::hub_client::{HeartbeatStats, HubClient, HEARTBEAT_INTERVAL};
use crate::market::{PriceService, Ring};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Interval between history-priming samples.
const PRIME_INTERVAL: Duration = Duration::from_secs(2);

/// How many samples to prime before the first tick. Kept small so an
/// agent is productive quickly; the ring fills to capacity over normal
/// ticks.
const PRIME_COUNT: usize = 10;

/// Run one agent variant to completion. Returns an error only on fatal
/// init failure; the supervisor treats a non-zero exit as a crash.
pub async fn run_agent(name: &str, settings: Settings) -> Result<()> {
    let spec = spec_by_name(name)
        .ok_or_else(|| DuckError::InvalidInput(format!("unknown agent: {name}")))?;
    let mut analyzer =
        build_analyzer(name).ok_or_else(|| DuckError::Internal(format!("no analyzer: {name}")))?;

    info!(
        agent = name,
        category = %spec.category,
        interval_secs = spec.interval.as_secs(),
        "agent starting"
    );

    let settings = Arc::new(settings);
    let chain = Arc::new(ChainClient::new(&settings)?);
    let price = Arc::new(PriceService::new(&settings, Some(chain.clone()))?);
    let hub = Arc::new(HubClient::new(&settings.hub_url)?);
    let cancel = CancellationToken::new();

    crate::shutdown::listen_with_force_exit(cancel.clone());

    // Registration is idempotent; a transient failure here is retried at
    // tick boundaries rather than failing startup.
    let mut registered = try_register(&chain, spec.name).await;

    let stats = Arc::new(HeartbeatStats::default());
    let heartbeat = hub.start_heartbeat(spec.name, HEARTBEAT_INTERVAL, stats.clone(), &cancel);

    let mut ctx = AgentContext {
        settings: settings.clone(),
        chain: chain.clone(),
        price: price.clone(),
        hub: hub.clone(),
        cancel: cancel.clone(),
        history: Ring::new(spec.history_size),
        volumes: Ring::new(spec.history_size),
        last_sample: None,
        stats: stats.clone(),
    };

    // Prime the ring so the first ticks have something to chew on.
    let seed = price
        .build_history(None, PRIME_COUNT, PRIME_INTERVAL, &cancel)
        .await;
    for sample in seed {
        ctx.history.push(sample.price);
        ctx.volumes.push(sample.volume_24h);
        ctx.last_sample = Some(sample);
    }
    info!(agent = name, primed = ctx.history.len(), "history primed");

    let mut interval = tokio::time::interval(spec.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = cancel.cancelled() => break,
        }

        if !registered {
            registered = try_register(&chain, spec.name).await;
        }

        if let Err(e) = run_tick(&mut *analyzer, &mut ctx).await {
            ctx.stats.record_error();
            error!(agent = name, error = %e, "tick failed");
        }
        ctx.stats.record_tick();
    }

    heartbeat.cancel();
    info!(agent = name, stats = %stats.snapshot(), "agent stopped");
    Ok(())
}

async fn run_tick(analyzer: &mut dyn Analyzer, ctx: &mut AgentContext) -> Result<()> {
    let spec = analyzer.spec();

    analyzer.before_tick(ctx).await?;

    if let Some(sample) = ctx.price.fetch_price(None).await {
        ctx.history.push(sample.price);
        ctx.volumes.push(sample.volume_24h);
        ctx.last_sample = Some(sample);
    }

    let Some(output) = analyzer.analyze(ctx).await? else {
        return Ok(());
    };

    // On-chain first: the hub sink is best-effort and must not delay it.
    if output.confidence >= spec.min_confidence && ctx.chain.can_write() {
        match ctx
            .chain
            .post_signal(output.kind.as_str(), output.confidence, output.price, &output.reason)
            .await
        {
            Ok(tx) => info!(agent = spec.name, kind = %output.kind, tx = %tx, "signal posted on-chain"),
            // Never retried within the tick; the next cycle decides.
            Err(e) => warn!(agent = spec.name, error = %e, "on-chain post failed"),
        }
    }

    ctx.hub.post_signal(spec.name, spec.category, &output).await;
    Ok(())
}

async fn try_register(chain: &ChainClient, name: &str) -> bool {
    match chain.register_agent(name).await {
        Ok(Registration::Registered { tx_hash }) => {
            info!(agent = name, tx = %tx_hash, "registered on-chain");
            true
        }
        Ok(Registration::AlreadyRegistered) => {
            info!(agent = name, "already registered");
            true
        }
        Ok(Registration::Skipped) => true,
        Err(e) => {
            warn!(agent = name, error = %e, "registration failed, will retry");
            false
        }
    }
}
