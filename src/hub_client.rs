//! Outbound sink to the hub.
//!
//! Fire-and-forget: every post returns a bool, failures are logged at
//! debug and swallowed. A hub outage must never stall chain interaction,
//! so nothing here is awaited on the critical path beyond the bounded
//! HTTP timeout.

use crate::domain::{now_ms, AgentOutput, Category};
use crate::error::{DuckError, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default heartbeat cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Rolling counters the heartbeat reports for one agent.
#[derive(Debug, Default)]
pub struct HeartbeatStats {
    pub ticks: AtomicU64,
    pub errors: AtomicU64,
}

impl HeartbeatStats {
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Value {
        json!({
            "ticks": self.ticks.load(Ordering::Relaxed),
            "errors": self.errors.load(Ordering::Relaxed),
        })
    }
}

#[derive(Clone)]
pub struct HubClient {
    http: Client,
    base_url: String,
}

impl HubClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DuckError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> bool {
        let url = format!("{}{}", self.base_url, path);
        match self.http.post(&url).json(body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(path, status = %response.status(), "hub rejected event");
                false
            }
            Err(e) => {
                debug!(path, error = %e, "hub post failed");
                false
            }
        }
    }

    /// Post an agent's tick result to `/api/signal`.
    pub async fn post_signal(&self, agent: &str, category: Category, output: &AgentOutput) -> bool {
        let mut body = json!({
            "agentName": agent,
            "type": output.kind,
            "confidence": output.confidence,
            "price": output.price,
            "reason": output.reason,
            "category": category,
        });
        // Category-specific payloads ride along at the top level.
        if let (Some(map), Some(extra)) = (body.as_object_mut(), output.extra.as_object()) {
            for (k, v) in extra {
                map.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        self.post("/api/signal", &body).await
    }

    pub async fn post_whale_alert(&self, body: &Value) -> bool {
        self.post("/api/whale/alert", body).await
    }

    pub async fn post_token_launch(&self, body: &Value) -> bool {
        self.post("/api/token/launch", body).await
    }

    pub async fn post_mev_opportunity(&self, body: &Value) -> bool {
        self.post("/api/mev/opportunity", body).await
    }

    pub async fn post_gas_update(&self, body: &Value) -> bool {
        self.post("/api/gas/update", body).await
    }

    pub async fn post_heartbeat(&self, agent: &str, status: &str, uptime_ms: i64, stats: Value) -> bool {
        let body = json!({
            "agentName": agent,
            "status": status,
            "uptime": uptime_ms,
            "stats": stats,
        });
        self.post("/api/agent/heartbeat", &body).await
    }

    /// Start the background heartbeat cadence. Returns the token that
    /// cancels it; the task also stops when the parent token fires.
    pub fn start_heartbeat(
        &self,
        agent: &str,
        interval: Duration,
        stats: Arc<HeartbeatStats>,
        parent: &CancellationToken,
    ) -> CancellationToken {
        let cancel = parent.child_token();
        let client = self.clone();
        let agent = agent.to_string();
        let handle = cancel.clone();
        let started = now_ms();

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let uptime = now_ms() - started;
                        client
                            .post_heartbeat(&agent, "active", uptime, stats.snapshot())
                            .await;
                    }
                    _ = handle.cancelled() => break,
                }
            }
            debug!(agent = %agent, "heartbeat stopped");
        });

        cancel
    }
}
