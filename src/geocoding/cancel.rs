use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Cooperative cancellation signal for a pipeline run.
///
/// Clones share the same flag. Once cancelled, a token stays cancelled.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signal cancellation to every clone of this token
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives inside `self`, so this only returns on cancellation
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `false` if the wait was cut short by cancellation.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancelled() => false,
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
