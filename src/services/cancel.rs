//! Run-granular cancellation.
//!
//! A newer analysis request cancels the token of the run it supersedes.
//! Search workers poll the token between candidates; async waits on external
//! services race [`CancellationToken::cancelled`]. A cancelled run merges no
//! partial results and ends with [`JuryscopeError::Cancelled`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::JuryscopeError;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token has fired.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking the flag so a concurrent cancel
            // cannot slip between the check and the wait.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// `Err(Cancelled)` once the token has fired.
    pub fn check(&self) -> Result<(), JuryscopeError> {
        if self.is_cancelled() {
            Err(JuryscopeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let worker = token.clone();
        assert!(worker.check().is_ok());
        token.cancel();
        assert!(worker.is_cancelled());
        assert!(matches!(worker.check(), Err(JuryscopeError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_fired() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), token.cancelled())
            .await
            .unwrap();
    }
}
