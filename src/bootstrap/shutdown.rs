use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Shutdown state machine
///
/// States:
/// 1. Running - normal operation
/// 2. Draining - listeners stop accepting, in-flight checks finish
/// 3. Terminated - everything stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Terminated,
}

/// Coordinates graceful shutdown across listeners and background tasks
pub struct ShutdownManager {
    state: watch::Sender<ShutdownState>,
    drain_period: Duration,
}

impl ShutdownManager {
    pub fn new(drain_period: Duration) -> Arc<Self> {
        let (state, _) = watch::channel(ShutdownState::Running);
        Arc::new(Self {
            state,
            drain_period,
        })
    }

    /// Get current state
    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    pub fn drain_period(&self) -> Duration {
        self.drain_period
    }

    /// Start draining (called on SIGTERM/SIGINT)
    pub fn start_drain(&self) {
        if self.state() != ShutdownState::Running {
            return;
        }

        info!(
            drain_period_secs = self.drain_period.as_secs(),
            "starting graceful shutdown drain"
        );

        self.state.send_replace(ShutdownState::Draining);
    }

    /// Complete shutdown
    pub fn terminate(&self) {
        if self.state() == ShutdownState::Terminated {
            return;
        }

        info!("shutdown complete");
        self.state.send_replace(ShutdownState::Terminated);
    }

    /// Resolves once the state leaves `Running`.
    pub fn draining(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            // A closed channel means the manager is gone, which is a shutdown too.
            let _ = rx.wait_for(|state| *state != ShutdownState::Running).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_state_machine() {
        let manager = ShutdownManager::new(Duration::from_secs(30));

        assert_eq!(manager.state(), ShutdownState::Running);
        assert_eq!(manager.drain_period(), Duration::from_secs(30));

        manager.start_drain();
        assert_eq!(manager.state(), ShutdownState::Draining);

        // Draining again is a no-op
        manager.start_drain();
        assert_eq!(manager.state(), ShutdownState::Draining);

        manager.terminate();
        assert_eq!(manager.state(), ShutdownState::Terminated);

        // Terminated is final
        manager.start_drain();
        assert_eq!(manager.state(), ShutdownState::Terminated);
    }

    #[tokio::test]
    async fn test_draining_future_resolves() {
        let manager = ShutdownManager::new(Duration::from_secs(1));
        let draining = tokio::spawn(manager.draining());

        tokio::task::yield_now().await;
        assert!(!draining.is_finished());

        manager.start_drain();
        tokio::time::timeout(Duration::from_secs(1), draining)
            .await
            .unwrap()
            .unwrap();
    }
}
