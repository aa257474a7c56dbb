//! Shutdown coordination shared by the application and its background tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Shared shutdown state. Cloning shares the same flags.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    /// Set once shutdown starts; background loops stop taking new work
    initiated: Arc<watch::Sender<bool>>,
    /// Set once every component has been stopped
    complete: Arc<AtomicBool>,
}

impl ShutdownState {
    pub fn new() -> Self {
        let (initiated, _) = watch::channel(false);
        Self {
            initiated: Arc::new(initiated),
            complete: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        *self.initiated.borrow()
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Starts shutdown and wakes every [`wait`](Self::wait)er. Idempotent.
    pub fn initiate_shutdown(&self) {
        if self.initiated.send_replace(true) {
            return;
        }
        info!("🛑 Shutdown initiated - no new work will be started");
    }

    pub fn complete_shutdown(&self) {
        self.complete.store(true, Ordering::Release);
        info!("✅ All components stopped - ready for final cleanup");
    }

    /// Resolves once shutdown has been initiated.
    pub async fn wait(&self) {
        let mut rx = self.initiated.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|initiated| *initiated).await;
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_wakes_on_initiate() {
        let state = ShutdownState::new();
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.wait().await })
        };

        assert!(!state.is_shutdown_initiated());
        state.initiate_shutdown();
        state.initiate_shutdown();

        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(state.is_shutdown_initiated());
        assert!(!state.is_shutdown_complete());

        state.complete_shutdown();
        assert!(state.is_shutdown_complete());
    }

    #[tokio::test]
    async fn test_wait_after_initiate_returns_immediately() {
        let state = ShutdownState::new();
        state.initiate_shutdown();
        tokio::time::timeout(Duration::from_secs(1), state.wait())
            .await
            .expect("already initiated");
    }
}
