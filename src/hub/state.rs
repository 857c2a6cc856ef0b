//! Hub state: bounded recent-history rings, per-agent signal map and the
//! broadcast fan-out.
//!
//! All mutation happens under one write lock, and the per-event order is
//! fixed: overwrite `agent_signals` first, append to the ring second,
//! broadcast last. A consensus read that observes the broadcast is
//! guaranteed to see the new signal.

use crate::domain::{now_ms, SignalKind};
use crate::hub::consensus::{self, Consensus};
use crate::market::Ring;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{broadcast, RwLock};
use tracing::info;

/// Ring capacities.
pub const SIGNALS_CAP: usize = 100;
pub const ALERTS_CAP: usize = 50;
pub const HISTORY_CAP: usize = 200;

/// Heartbeats older than this mark an agent dead in `/api/state`.
pub const ALIVE_WINDOW_MS: i64 = 120_000;

/// Outbound subscriber queue; lagging consumers drop messages instead of
/// stalling ingress.
const BROADCAST_CAPACITY: usize = 256;

/// One event on the socket channel.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub event: String,
    pub data: Value,
}

impl Envelope {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }
}

/// Latest signal per agent, kept verbatim plus the parsed fields the
/// consensus needs.
#[derive(Debug, Clone)]
pub struct StoredSignal {
    pub agent_name: String,
    pub kind: SignalKind,
    pub confidence: f64,
    pub price: f64,
    pub reason: Option<String>,
    pub received_at: i64,
    pub raw: Value,
}

/// Agent liveness record fed by heartbeats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentHealth {
    pub name: String,
    pub status: String,
    pub uptime_ms: i64,
    pub stats: Value,
    pub last_heartbeat_ms: i64,
}

/// Newest-first bounded alert ring.
#[derive(Debug, Clone, Default)]
pub struct AlertRing {
    items: VecDeque<Value>,
    cap: usize,
}

impl AlertRing {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::new(),
            cap,
        }
    }

    pub fn push(&mut self, item: Value) {
        self.items.push_front(item);
        self.items.truncate(self.cap);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Newest-first snapshot of up to `n` entries.
    pub fn head(&self, n: usize) -> Vec<Value> {
        self.items.iter().take(n).cloned().collect()
    }
}

#[derive(Debug)]
pub struct HubInner {
    pub agent_signals: HashMap<String, StoredSignal>,
    pub signals: AlertRing,
    pub whale_alerts: AlertRing,
    pub token_launches: AlertRing,
    pub mev_opportunities: AlertRing,
    pub gas_updates: AlertRing,
    pub agents: HashMap<String, AgentHealth>,
    pub price_histories: HashMap<String, Ring<f64>>,
    pub volume_histories: HashMap<String, Ring<f64>>,
    pub analysis_results: HashMap<String, Value>,
    pub focal_token: Option<String>,
    pub total_signals: u64,
    pub total_alerts: u64,
    pub total_launches: u64,
    pub total_mev: u64,
}

impl HubInner {
    fn new() -> Self {
        Self {
            agent_signals: HashMap::new(),
            signals: AlertRing::new(SIGNALS_CAP),
            whale_alerts: AlertRing::new(ALERTS_CAP),
            token_launches: AlertRing::new(ALERTS_CAP),
            mev_opportunities: AlertRing::new(ALERTS_CAP),
            gas_updates: AlertRing::new(ALERTS_CAP),
            agents: HashMap::new(),
            price_histories: HashMap::new(),
            volume_histories: HashMap::new(),
            analysis_results: HashMap::new(),
            focal_token: None,
            total_signals: 0,
            total_alerts: 0,
            total_launches: 0,
            total_mev: 0,
        }
    }
}

pub struct HubState {
    inner: RwLock<HubInner>,
    tx: broadcast::Sender<Envelope>,
    started_at: i64,
}

impl HubState {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: RwLock::new(HubInner::new()),
            tx,
            started_at: now_ms(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn uptime_ms(&self) -> i64 {
        now_ms() - self.started_at
    }

    fn broadcast(&self, event: &str, data: Value) {
        let _ = self.tx.send(Envelope::new(event, data));
    }

    /// `/api/signal` ingress. Overwrite -> append -> broadcast.
    pub async fn ingest_signal(&self, payload: Value) -> Result<(), &'static str> {
        let Some(agent_name) = payload["agentName"].as_str().map(str::to_string) else {
            return Err("agentName is required");
        };

        let mut stamped = payload.clone();
        let received_at = now_ms();
        if let Some(map) = stamped.as_object_mut() {
            map.insert("receivedAt".to_string(), json!(received_at));
        }

        let stored = StoredSignal {
            agent_name: agent_name.clone(),
            kind: parse_kind(&payload["type"]),
            confidence: payload["confidence"].as_f64().unwrap_or(0.0).clamp(0.0, 100.0),
            price: payload["price"].as_f64().unwrap_or(0.0),
            reason: payload["reason"].as_str().map(str::to_string),
            received_at,
            raw: stamped.clone(),
        };

        {
            let mut inner = self.inner.write().await;
            inner.agent_signals.insert(agent_name.clone(), stored);
            inner.signals.push(stamped.clone());
            inner.total_signals += 1;
        }
        info!(agent = %agent_name, "signal ingested");
        self.broadcast("signal", stamped);
        Ok(())
    }

    pub async fn ingest_whale_alert(&self, payload: Value) -> Result<(), &'static str> {
        let stamped = stamp(payload);
        {
            let mut inner = self.inner.write().await;
            inner.whale_alerts.push(stamped.clone());
            inner.total_alerts += 1;
        }
        info!("whale alert ingested");
        self.broadcast("whale:alert", stamped);
        Ok(())
    }

    pub async fn ingest_token_launch(&self, payload: Value) -> Result<(), &'static str> {
        let stamped = stamp(payload);
        {
            let mut inner = self.inner.write().await;
            inner.token_launches.push(stamped.clone());
            inner.total_launches += 1;
        }
        info!("token launch ingested");
        self.broadcast("token:launch", stamped);
        Ok(())
    }

    pub async fn ingest_mev(&self, payload: Value) -> Result<(), &'static str> {
        let stamped = stamp(payload);
        {
            let mut inner = self.inner.write().await;
            inner.mev_opportunities.push(stamped.clone());
            inner.total_mev += 1;
        }
        info!("mev opportunity ingested");
        self.broadcast("mev:opportunity", stamped);
        Ok(())
    }

    pub async fn ingest_gas_update(&self, payload: Value) -> Result<(), &'static str> {
        let stamped = stamp(payload);
        {
            let mut inner = self.inner.write().await;
            inner.gas_updates.push(stamped.clone());
        }
        info!("gas update ingested");
        self.broadcast("gas:update", stamped);
        Ok(())
    }

    pub async fn ingest_heartbeat(&self, payload: Value) -> Result<(), &'static str> {
        let Some(agent_name) = payload["agentName"].as_str().map(str::to_string) else {
            return Err("agentName is required");
        };
        let stamped = stamp(payload.clone());
        {
            let mut inner = self.inner.write().await;
            inner.agents.insert(
                agent_name.clone(),
                AgentHealth {
                    name: agent_name.clone(),
                    status: payload["status"].as_str().unwrap_or("active").to_string(),
                    uptime_ms: payload["uptime"].as_i64().unwrap_or(0),
                    stats: payload["stats"].clone(),
                    last_heartbeat_ms: now_ms(),
                },
            );
        }
        self.broadcast("agent:heartbeat", stamped);
        Ok(())
    }

    /// Append one price/volume point for a token (hub analysis loop).
    pub async fn push_history(&self, token: &str, price: f64, volume: f64) {
        let key = token.to_lowercase();
        let mut inner = self.inner.write().await;
        inner
            .price_histories
            .entry(key.clone())
            .or_insert_with(|| Ring::new(HISTORY_CAP))
            .push(price);
        inner
            .volume_histories
            .entry(key)
            .or_insert_with(|| Ring::new(HISTORY_CAP))
            .push(volume);
    }

    pub async fn history_snapshot(&self, token: &str) -> (Vec<f64>, Vec<f64>) {
        let key = token.to_lowercase();
        let inner = self.inner.read().await;
        (
            inner
                .price_histories
                .get(&key)
                .map(|r| r.to_vec())
                .unwrap_or_default(),
            inner
                .volume_histories
                .get(&key)
                .map(|r| r.to_vec())
                .unwrap_or_default(),
        )
    }

    pub async fn set_focal_token(&self, token: &str) {
        let mut inner = self.inner.write().await;
        inner.focal_token = Some(token.to_lowercase());
    }

    pub async fn focal_token(&self) -> Option<String> {
        self.inner.read().await.focal_token.clone()
    }

    pub async fn store_analysis(&self, token: &str, analysis: Value) {
        {
            let mut inner = self.inner.write().await;
            inner
                .analysis_results
                .insert(token.to_lowercase(), analysis.clone());
        }
        self.broadcast("analysis:result", analysis);
    }

    pub async fn consensus(&self) -> Consensus {
        let inner = self.inner.read().await;
        consensus::compute(&inner.agent_signals)
    }

    /// The one-shot `state` event sent on socket connect.
    pub async fn connect_snapshot(&self) -> Value {
        let inner = self.inner.read().await;
        let analysis = inner
            .focal_token
            .as_ref()
            .and_then(|t| inner.analysis_results.get(t))
            .cloned();
        json!({
            "signals": inner.signals.head(20),
            "whaleAlerts": inner.whale_alerts.head(10),
            "tokenLaunches": inner.token_launches.head(10),
            "mevOpportunities": inner.mev_opportunities.head(10),
            "gasUpdates": inner.gas_updates.head(10),
            "currentToken": inner.focal_token,
            "analysis": analysis,
        })
    }

    /// `GET /api/state` body.
    pub async fn state_snapshot(&self) -> Value {
        let now = now_ms();
        let inner = self.inner.read().await;
        let agents: Vec<Value> = inner
            .agents
            .values()
            .map(|a| {
                let mut v = serde_json::to_value(a).unwrap_or(Value::Null);
                if let Some(map) = v.as_object_mut() {
                    map.insert(
                        "isAlive".to_string(),
                        json!(now - a.last_heartbeat_ms < ALIVE_WINDOW_MS),
                    );
                }
                v
            })
            .collect();

        let confluence = consensus::compute(&inner.agent_signals);

        json!({
            "uptime": now - self.started_at,
            "agents": agents,
            "confluence": confluence,
            "totalSignals": inner.total_signals,
            "totalAlerts": inner.total_alerts,
            "totalLaunches": inner.total_launches,
            "totalMev": inner.total_mev,
            "recentSignals": inner.signals.head(20),
            "recentAlerts": inner.whale_alerts.head(10),
            "currentToken": inner.focal_token,
        })
    }

    /// `GET /health` body.
    pub async fn health_snapshot(&self) -> Value {
        let inner = self.inner.read().await;
        json!({
            "status": "ok",
            "uptime": self.uptime_ms(),
            "agents": inner.agents.len(),
            "connections": self.subscriber_count(),
            "currentToken": inner.focal_token,
            "confluenceAgents": inner.agent_signals.len(),
        })
    }

    #[cfg(test)]
    pub async fn inner_read(&self) -> tokio::sync::RwLockReadGuard<'_, HubInner> {
        self.inner.read().await
    }
}

impl Default for HubState {
    fn default() -> Self {
        Self::new()
    }
}

fn stamp(mut payload: Value) -> Value {
    if let Some(map) = payload.as_object_mut() {
        map.insert("receivedAt".to_string(), json!(now_ms()));
    }
    payload
}

fn parse_kind(value: &Value) -> SignalKind {
    match value.as_str().map(str::to_ascii_uppercase).as_deref() {
        Some("BUY") => SignalKind::Buy,
        Some("SELL") => SignalKind::Sell,
        _ => SignalKind::Hold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_requires_agent_name() {
        let state = HubState::new();
        assert!(state.ingest_signal(json!({"type": "BUY"})).await.is_err());
        assert!(state
            .ingest_signal(json!({"agentName": "trading", "type": "BUY", "confidence": 80.0}))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_signal_overwrites_and_appends() {
        let state = HubState::new();
        for i in 0..5 {
            state
                .ingest_signal(json!({
                    "agentName": "trading",
                    "type": "BUY",
                    "confidence": 50.0 + i as f64,
                    "price": 1.0,
                }))
                .await
                .unwrap();
        }
        let inner = state.inner_read().await;
        // Map holds only the latest, ring holds all five.
        assert_eq!(inner.agent_signals.len(), 1);
        assert_eq!(inner.agent_signals["trading"].confidence, 54.0);
        assert_eq!(inner.signals.len(), 5);
        assert_eq!(inner.total_signals, 5);
    }

    #[tokio::test]
    async fn test_signals_ring_capped_at_100() {
        let state = HubState::new();
        for i in 0..150 {
            state
                .ingest_signal(json!({
                    "agentName": format!("agent-{i}"),
                    "type": "HOLD",
                    "confidence": 40.0,
                }))
                .await
                .unwrap();
        }
        let inner = state.inner_read().await;
        assert_eq!(inner.signals.len(), SIGNALS_CAP);
        assert_eq!(inner.total_signals, 150);
        // Newest-first: head starts with the last ingested.
        let head = inner.signals.head(1);
        assert_eq!(head[0]["agentName"], "agent-149");
    }

    #[tokio::test]
    async fn test_alert_rings_capped_at_50() {
        let state = HubState::new();
        for i in 0..80 {
            state
                .ingest_whale_alert(json!({"tier": "WHALE", "n": i}))
                .await
                .unwrap();
            state.ingest_gas_update(json!({"gwei": i})).await.unwrap();
        }
        let inner = state.inner_read().await;
        assert_eq!(inner.whale_alerts.len(), ALERTS_CAP);
        assert_eq!(inner.gas_updates.len(), ALERTS_CAP);
        assert_eq!(inner.total_alerts, 80);
    }

    #[tokio::test]
    async fn test_history_ring_capped_at_200() {
        let state = HubState::new();
        for i in 0..300 {
            state.push_history("0xDUCK", i as f64, 1.0).await;
        }
        let (prices, volumes) = state.history_snapshot("0xduck").await;
        assert_eq!(prices.len(), HISTORY_CAP);
        assert_eq!(volumes.len(), HISTORY_CAP);
        // Keyed by lowercased address.
        let (upper, _) = state.history_snapshot("0XDUCK").await;
        assert_eq!(upper.len(), HISTORY_CAP);
    }

    #[tokio::test]
    async fn test_heartbeat_liveness() {
        let state = HubState::new();
        state
            .ingest_heartbeat(json!({"agentName": "gas", "status": "active", "uptime": 1000}))
            .await
            .unwrap();
        let snapshot = state.state_snapshot().await;
        let agents = snapshot["agents"].as_array().unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0]["isAlive"], true);
        assert_eq!(agents[0]["name"], "gas");
    }

    #[tokio::test]
    async fn test_stale_heartbeat_reports_dead() {
        let state = HubState::new();
        state
            .ingest_heartbeat(json!({"agentName": "gas"}))
            .await
            .unwrap();
        {
            let mut inner = state.inner.write().await;
            let record = inner.agents.get_mut("gas").unwrap();
            record.last_heartbeat_ms = now_ms() - ALIVE_WINDOW_MS - 1;
        }
        let snapshot = state.state_snapshot().await;
        assert_eq!(snapshot["agents"][0]["isAlive"], false);
    }

    #[tokio::test]
    async fn test_broadcast_order_follows_ingress() {
        let state = HubState::new();
        let mut rx = state.subscribe();
        state
            .ingest_signal(json!({"agentName": "a", "type": "BUY", "confidence": 60.0}))
            .await
            .unwrap();
        state
            .ingest_whale_alert(json!({"tier": "MEGA"}))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event, "signal");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event, "whale:alert");
    }

    #[tokio::test]
    async fn test_connect_snapshot_shape() {
        let state = HubState::new();
        state.set_focal_token("0xDUCK").await;
        for i in 0..30 {
            state
                .ingest_signal(json!({"agentName": format!("a{i}"), "type": "HOLD", "confidence": 1.0}))
                .await
                .unwrap();
        }
        let snap = state.connect_snapshot().await;
        assert_eq!(snap["signals"].as_array().unwrap().len(), 20);
        assert_eq!(snap["currentToken"], "0xduck");
    }
}
