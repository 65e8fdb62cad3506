//! Background reclamation of idle sessions.
//!
//! The reaper sleeps for the check interval, then disconnects every session
//! idle past the threshold. It stops as soon as its shutdown token is
//! cancelled, even mid-sleep. Each scan runs in its own task so a panic inside
//! one scan is logged and the next tick still fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::config::{resolve_check_interval, resolve_idle_timeout};
use super::registry::SessionRegistry;

pub struct InactivityReaper {
    registry: Arc<SessionRegistry>,
    check_interval: Duration,
    idle_threshold: Duration,
}

impl InactivityReaper {
    /// Reaper using the configured interval and threshold
    /// (env: `SESSION_CHECK_INTERVAL_SECS`, `SESSION_IDLE_TIMEOUT_SECS`).
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self::with_intervals(registry, resolve_check_interval(None), resolve_idle_timeout(None))
    }

    pub fn with_intervals(
        registry: Arc<SessionRegistry>,
        check_interval: Duration,
        idle_threshold: Duration,
    ) -> Self {
        Self {
            registry,
            check_interval,
            idle_threshold,
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "Inactivity reaper started (interval {:?}, threshold {:?})",
            self.check_interval, self.idle_threshold
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                _ = tokio::time::sleep(self.check_interval) => {
                    let registry = self.registry.clone();
                    let threshold = self.idle_threshold;
                    let scan = tokio::spawn(async move { registry.reap_inactive(threshold).await });

                    match scan.await {
                        Ok(reaped) => debug!("Reaper scan finished, {} session(s) reaped", reaped),
                        Err(e) => error!("Reaper scan failed: {}", e),
                    }
                }
            }
        }

        info!("Inactivity reaper stopped");
    }
}
