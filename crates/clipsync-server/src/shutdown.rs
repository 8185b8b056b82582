//! Process-wide shutdown signal.
//!
//! One root [`CancellationToken`] is observed by the registry loop, the HTTP
//! server's graceful shutdown and (through child tokens) every backbone
//! subscription.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long to wait for background tasks once shutdown starts.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Owns the root shutdown token.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// The root token. Cancelled by [`shutdown`](Self::shutdown).
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire the shutdown signal. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Fire the signal and wait up to `timeout` for `tasks` to finish.
    /// Returns `false` if some tasks were still running at the deadline.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, timeout: Duration) -> bool {
        self.shutdown();
        info!(task_count = tasks.len(), timeout_secs = timeout.as_secs(), "draining tasks");

        if tokio::time::timeout(timeout, futures::future::join_all(tasks))
            .await
            .is_err()
        {
            warn!(?timeout, "shutdown drain timed out");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_token_not_cancelled() {
        assert!(!ShutdownCoordinator::new().token().is_cancelled());
    }

    #[test]
    fn shutdown_cancels_token_and_descendants() {
        let coord = ShutdownCoordinator::new();
        let root = coord.token();
        let child = root.child_token();
        coord.shutdown();
        coord.shutdown();
        assert!(root.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn drain_waits_for_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let task = tokio::spawn(async move { token.cancelled().await });
        assert!(coord.drain(vec![task], Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_after_timeout() {
        let coord = ShutdownCoordinator::new();
        let stuck = tokio::spawn(std::future::pending::<()>());
        assert!(!coord.drain(vec![stuck], Duration::from_secs(1)).await);
    }
}
