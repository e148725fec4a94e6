//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default timeout before remaining tasks are aborted.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates shutdown across server tasks and in-flight executions.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    /// New coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            task_handles: Mutex::new(Vec::new()),
        }
    }

    /// Register a background task for graceful shutdown.
    pub fn register_task(&self, handle: JoinHandle<()>) {
        self.task_handles.lock().push(handle);
    }

    /// The cancellation token propagated into executions.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been initiated.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel everything, wait up to `timeout` for registered tasks, then
    /// abort stragglers.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.task_handles.lock());
        info!(task_count = handles.len(), "waiting for tasks to complete");

        let abort_handles: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let joined = tokio::time::timeout(timeout, async {
            for handle in handles {
                let _ = handle.await;
            }
        })
        .await;

        if joined.is_err() {
            warn!(timeout_secs = timeout.as_secs(), "shutdown timed out, aborting tasks");
            for handle in &abort_handles {
                handle.abort();
            }
        } else {
            info!("all shutdown tasks completed");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutting_down());
    }

    #[test]
    fn shutdown_sets_flag_and_propagates() {
        let coordinator = ShutdownCoordinator::new();
        let token = coordinator.token();
        coordinator.shutdown();
        assert!(coordinator.is_shutting_down());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_tasks() {
        let coordinator = ShutdownCoordinator::new();
        let token = coordinator.token();
        coordinator.register_task(tokio::spawn(async move {
            token.cancelled().await;
        }));
        coordinator
            .graceful_shutdown(Some(Duration::from_secs(1)))
            .await;
    }

    #[tokio::test]
    async fn graceful_shutdown_aborts_stragglers() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.register_task(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }));
        // Must return promptly despite the sleeping task.
        coordinator
            .graceful_shutdown(Some(Duration::from_millis(50)))
            .await;
    }
}
