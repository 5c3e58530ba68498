use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::service::AuthService;
use crate::telemetry::AdminState;

use super::shutdown::ShutdownState;

/// Periodically sweeps every chain until shutdown starts.
///
/// Sweeps never overlap: a slow sweep delays the next tick instead of
/// piling up behind it.
pub struct CleanupTicker {
    service: Arc<AuthService>,
    admin: Arc<AdminState>,
    interval: Duration,
}

impl CleanupTicker {
    pub fn new(service: Arc<AuthService>, admin: Arc<AdminState>, interval: Duration) -> Self {
        Self {
            service,
            admin,
            interval,
        }
    }

    /// Run until the shutdown state leaves `Running`.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<ShutdownState>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(interval_ms = self.interval.as_millis() as u64, "cleanup ticker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.service.run_periodic_cleanup().await;
                    self.admin.inc_cleanup_runs();
                    if report.failed.is_empty() {
                        debug!(chains = report.completed, "cleanup tick");
                    } else {
                        warn!(failed = ?report.failed, "cleanup tick had failing chains");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() != ShutdownState::Running {
                        break;
                    }
                }
            }
        }

        info!("cleanup ticker stopped");
    }
}
