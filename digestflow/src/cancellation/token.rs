//! Cancellation token for cooperative cancellation.

use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::errors::{DigestError, Result};

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
}

/// A cloneable handle for cooperative cancellation.
///
/// Clones share state. Cancellation is idempotent: only the first reason is
/// kept.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// Tasks waiting in [`cancelled`](Self::cancelled) are woken.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.inner.reason.write() = Some(reason.into());
            self.inner.notify.notify_waiters();
        }
    }

    /// Cancels the token once `timeout` has elapsed.
    ///
    /// Must be called from within a Tokio runtime. The timer task exits early
    /// if the token is cancelled for another reason first.
    pub fn cancel_after(&self, timeout: Duration) {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(timeout) => {
                    token.cancel(format!("deadline of {}s exceeded", timeout.as_secs_f64()));
                }
                () = token.cancelled() => {}
            }
        });
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Completes once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Registered before the flag check so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Builds the error reported when work stops because of this token.
    #[must_use]
    pub fn error(&self) -> DigestError {
        DigestError::Cancelled(
            self.reason()
                .unwrap_or_else(|| "cancellation requested".to_string()),
        )
    }

    /// Returns `Err(Cancelled)` if the token has already been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(self.error())
        } else {
            Ok(())
        }
    }

    /// Runs `fut` to completion unless the token is cancelled first.
    ///
    /// On cancellation the future is dropped, which aborts any in-flight
    /// request it owns.
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Result<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            () = self.cancelled() => Err(self.error()),
            out = fut => Ok(out),
        }
    }

    /// Sleeps for `duration`, returning early with `Err(Cancelled)` on cancellation.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run_until_cancelled(tokio::time::sleep(duration)).await
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = CancellationToken::new();
        token.cancel("First reason");
        token.cancel("Second reason");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("First reason".to_string()));
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel("from clone");
        assert!(token.is_cancelled());
        assert!(token.check().unwrap_err().is_cancellation());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::task::yield_now().await;
        token.cancel("wake up");
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_deadline() {
        let token = CancellationToken::new();
        token.cancel_after(Duration::from_secs(30));

        let result = token.sleep(Duration::from_secs(60)).await;
        let err = result.unwrap_err();
        assert!(err.is_cancellation());
        assert!(token.reason().unwrap().contains("deadline"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_cancel() {
        let token = CancellationToken::new();
        assert!(token.sleep(Duration::from_secs(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_until_cancelled_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel("early");
        let result = token.run_until_cancelled(async { 42 }).await;
        assert!(result.is_err());
    }
}
