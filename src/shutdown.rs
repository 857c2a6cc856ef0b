//! Process termination plumbing.
//!
//! Every process (hub, agent, supervisor) wires SIGINT/SIGTERM to one
//! `CancellationToken` and drains in-flight work inside a short grace
//! window. Pending sleeps and HTTP calls observe the token through
//! `tokio::select!` at their await points.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// In-flight work gets this long after a termination signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Cancel `cancel` on SIGTERM or SIGINT.
pub fn listen(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("termination signal received");
        cancel.cancel();
    });
}

/// Like [`listen`], but force-exits the process if it is still alive
/// once the grace window elapses. Used by agents, whose tick may be
/// blocked on a slow upstream when the signal lands.
pub fn listen_with_force_exit(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("termination signal received, finishing in-flight work");
        cancel.cancel();
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        std::process::exit(0);
    });
}

/// Resolve when the OS asks us to stop.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(_) => {
                // No SIGTERM stream: fall back to Ctrl+C only.
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listen_does_not_cancel_spuriously() {
        let cancel = CancellationToken::new();
        listen(cancel.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_grace_window_is_two_seconds() {
        assert_eq!(SHUTDOWN_GRACE, Duration::from_secs(2));
    }
}
