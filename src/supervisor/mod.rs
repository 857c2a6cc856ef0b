//! Fleet supervisor.
//!
//! Launches one child process per agent variant on a staggered schedule
//! and restarts crashed children with capped exponential backoff. A
//! clean exit (status 0) is final; everything else doubles the restart
//! delay up to the cap. There is no restart-count limit — a flapping
//! chain endpoint should not strand the fleet.

use crate::agents::{spec_by_name, AgentSpec, FLEET};
use crate::domain::now_ms;
use crate::error::{DuckError, Result};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Initial restart delay.
const INITIAL_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Restart delay cap.
const MAX_RESTART_DELAY: Duration = Duration::from_secs(5 * 60);

/// Status table cadence.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Grace between SIGTERM and giving up on a child.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Scheduled,
    Running,
    Backoff,
    Stopped,
}

impl ChildStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ChildStatus::Scheduled => "scheduled",
            ChildStatus::Running => "running",
            ChildStatus::Backoff => "backoff",
            ChildStatus::Stopped => "stopped",
        }
    }
}

/// Per-child health record. Created at spawn scheduling, updated on
/// every exit, never removed.
#[derive(Debug, Clone)]
pub struct ChildRecord {
    pub restarts: u32,
    pub last_start_ms: Option<i64>,
    pub last_crash_ms: Option<i64>,
    pub status: ChildStatus,
    pub restart_delay: Duration,
    pub pid: Option<u32>,
}

impl ChildRecord {
    fn new() -> Self {
        Self {
            restarts: 0,
            last_start_ms: None,
            last_crash_ms: None,
            status: ChildStatus::Scheduled,
            restart_delay: INITIAL_RESTART_DELAY,
            pid: None,
        }
    }
}

/// Backoff schedule: `min(5s * 2^(k-1), 5min)` after the k-th
/// consecutive crash.
pub fn backoff_delay(consecutive_crashes: u32) -> Duration {
    if consecutive_crashes == 0 {
        return INITIAL_RESTART_DELAY;
    }
    let exponent = consecutive_crashes.saturating_sub(1).min(16);
    let delay = INITIAL_RESTART_DELAY.saturating_mul(1u32 << exponent);
    delay.min(MAX_RESTART_DELAY)
}

type Registry = Arc<RwLock<HashMap<&'static str, ChildRecord>>>;

/// Run the supervisor. `only` restricts the fleet to a single agent and
/// skips its staggered delay.
pub async fn run(only: Option<&str>) -> Result<()> {
    let selected: Vec<&'static AgentSpec> = match only {
        Some(name) => match spec_by_name(name) {
            Some(spec) => vec![spec],
            None => {
                eprintln!("Unknown agent '{name}'. Known agents:");
                for spec in FLEET {
                    eprintln!("  {}", spec.name);
                }
                return Err(DuckError::InvalidInput(format!("unknown agent: {name}")));
            }
        },
        None => FLEET.iter().collect(),
    };
    let single = only.is_some();

    let registry: Registry = Arc::new(RwLock::new(
        selected.iter().map(|s| (s.name, ChildRecord::new())).collect(),
    ));
    let cancel = CancellationToken::new();
    crate::shutdown::listen(cancel.clone());

    info!(agents = selected.len(), "supervisor starting");

    let mut monitors = Vec::with_capacity(selected.len());
    for spec in &selected {
        let delay = if single {
            Duration::ZERO
        } else {
            spec.launch_delay
        };
        monitors.push(tokio::spawn(monitor_child(
            spec.name,
            delay,
            registry.clone(),
            cancel.clone(),
        )));
    }

    let status_task = tokio::spawn(status_loop(registry.clone(), cancel.clone()));

    cancel.cancelled().await;
    println!("\x1b[33mSupervisor shutting down, signalling children...\x1b[0m");

    for monitor in monitors {
        let _ = monitor.await;
    }
    status_task.abort();

    print_status_table(&registry).await;
    info!("supervisor stopped");
    Ok(())
}

/// Spawn-wait-backoff loop for one child.
async fn monitor_child(
    name: &'static str,
    initial_delay: Duration,
    registry: Registry,
    cancel: CancellationToken,
) {
    if !initial_delay.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(initial_delay) => {}
            _ = cancel.cancelled() => return,
        }
    }

    loop {
        let mut child = match spawn_agent(name) {
            Ok(child) => child,
            Err(e) => {
                error!(agent = name, error = %e, "failed to spawn");
                mark_crash(&registry, name).await;
                let delay = current_delay(&registry, name).await;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => continue,
                    _ = cancel.cancelled() => return,
                }
            }
        };

        let pid = child.id();
        {
            let mut records = registry.write().await;
            if let Some(record) = records.get_mut(name) {
                record.status = ChildStatus::Running;
                record.last_start_ms = Some(now_ms());
                record.pid = pid;
            }
        }
        println!("\x1b[32m✓ {name} started (pid {})\x1b[0m", pid.unwrap_or(0));

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        match exited {
            // Supervisor shutdown: terminate the child gracefully.
            None => {
                terminate_child(name, &mut child).await;
                let mut records = registry.write().await;
                if let Some(record) = records.get_mut(name) {
                    record.status = ChildStatus::Stopped;
                    record.pid = None;
                }
                return;
            }
            Some(Ok(status)) if status.success() => {
                println!("\x1b[36m{name} exited cleanly, not restarting\x1b[0m");
                let mut records = registry.write().await;
                if let Some(record) = records.get_mut(name) {
                    record.status = ChildStatus::Stopped;
                    record.pid = None;
                }
                return;
            }
            Some(status) => {
                let code = status
                    .as_ref()
                    .ok()
                    .and_then(|s| s.code())
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                println!("\x1b[31m✗ {name} crashed (exit {code})\x1b[0m");
                mark_crash(&registry, name).await;

                let delay = current_delay(&registry, name).await;
                println!(
                    "\x1b[33m↻ restarting {name} in {}s (restart #{})\x1b[0m",
                    delay.as_secs(),
                    restart_count(&registry, name).await,
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return,
                }
            }
        }
    }
}

fn spawn_agent(name: &str) -> Result<Child> {
    let exe = std::env::current_exe()?;
    // Children inherit the supervisor's environment and stdio so logs
    // interleave in one stream.
    Command::new(exe)
        .arg("agent")
        .arg(name)
        .stdin(Stdio::null())
        .spawn()
        .map_err(|e| DuckError::Internal(format!("spawn {name}: {e}")))
}

async fn terminate_child(name: &str, child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
        Ok(_) => info!(agent = name, "child exited within grace"),
        Err(_) => {
            warn!(agent = name, "child did not exit in time, killing");
            let _ = child.kill().await;
        }
    }
}

async fn mark_crash(registry: &Registry, name: &str) {
    let mut records = registry.write().await;
    if let Some(record) = records.get_mut(name) {
        record.restarts += 1;
        record.last_crash_ms = Some(now_ms());
        record.status = ChildStatus::Backoff;
        record.pid = None;
        record.restart_delay = backoff_delay(record.restarts);
    }
}

async fn current_delay(registry: &Registry, name: &str) -> Duration {
    registry
        .read()
        .await
        .get(name)
        .map(|r| r.restart_delay)
        .unwrap_or(INITIAL_RESTART_DELAY)
}

async fn restart_count(registry: &Registry, name: &str) -> u32 {
    registry.read().await.get(name).map(|r| r.restarts).unwrap_or(0)
}

async fn status_loop(registry: Registry, cancel: CancellationToken) {
    let mut tick = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // Skip the immediate first tick.
    tick.tick().await;
    loop {
        tokio::select! {
            _ = tick.tick() => print_status_table(&registry).await,
            _ = cancel.cancelled() => return,
        }
    }
}

async fn print_status_table(registry: &Registry) {
    let records = registry.read().await;
    let now = now_ms();
    println!("\n  {:<2} {:<12} {:>10} {:>9}  status", "", "agent", "uptime", "restarts");
    let mut running = 0usize;
    let mut total_restarts = 0u32;
    let mut names: Vec<_> = records.keys().copied().collect();
    names.sort();
    for name in names {
        let record = &records[name];
        let alive = record.status == ChildStatus::Running;
        if alive {
            running += 1;
        }
        total_restarts += record.restarts;
        let uptime = match (alive, record.last_start_ms) {
            (true, Some(start)) => format_uptime(now - start),
            _ => "-".to_string(),
        };
        println!(
            "  {:<2} {:<12} {:>10} {:>9}  {}",
            if alive { "\x1b[32m●\x1b[0m" } else { "\x1b[31m○\x1b[0m" },
            name,
            uptime,
            record.restarts,
            record.status.as_str(),
        );
    }
    println!(
        "  {running}/{} running, {total_restarts} total restarts\n",
        records.len()
    );
}

fn format_uptime(ms: i64) -> String {
    let secs = ms / 1000;
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        // 5s, 10s, 20s, 40s, 80s, 160s, 300s (cap), 300s, ...
        assert_eq!(backoff_delay(1), Duration::from_secs(5));
        assert_eq!(backoff_delay(2), Duration::from_secs(10));
        assert_eq!(backoff_delay(3), Duration::from_secs(20));
        assert_eq!(backoff_delay(4), Duration::from_secs(40));
        assert_eq!(backoff_delay(5), Duration::from_secs(80));
        assert_eq!(backoff_delay(6), Duration::from_secs(160));
        assert_eq!(backoff_delay(7), Duration::from_secs(300));
        assert_eq!(backoff_delay(8), Duration::from_secs(300));
        assert_eq!(backoff_delay(100), Duration::from_secs(300));
    }

    #[test]
    fn test_backoff_general_form() {
        // min(5s * 2^(k-1), 5min) for every k.
        for k in 1..=20u32 {
            let expected = Duration::from_secs(5)
                .saturating_mul(1u32 << (k - 1).min(16))
                .min(Duration::from_secs(300));
            assert_eq!(backoff_delay(k), expected, "k={k}");
        }
    }

    #[tokio::test]
    async fn test_crash_doubles_recorded_delay() {
        let registry: Registry = Arc::new(RwLock::new(
            [("trading", ChildRecord::new())].into_iter().collect(),
        ));
        assert_eq!(current_delay(&registry, "trading").await, Duration::from_secs(5));

        mark_crash(&registry, "trading").await;
        assert_eq!(current_delay(&registry, "trading").await, Duration::from_secs(5));
        mark_crash(&registry, "trading").await;
        assert_eq!(current_delay(&registry, "trading").await, Duration::from_secs(10));
        mark_crash(&registry, "trading").await;
        assert_eq!(current_delay(&registry, "trading").await, Duration::from_secs(20));

        let records = registry.read().await;
        let record = &records["trading"];
        assert_eq!(record.restarts, 3);
        assert_eq!(record.status, ChildStatus::Backoff);
        assert!(record.last_crash_ms.is_some());
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(30_000), "30s");
        assert_eq!(format_uptime(90_000), "1m30s");
        assert_eq!(format_uptime(3_700_000), "1h1m");
    }
}
