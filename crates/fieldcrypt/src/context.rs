//! Caller-supplied execution context: cancellation plus an optional deadline.
//!
//! Every key-service call made by the encryptor runs under a [`CallContext`].
//! Cancellation or an expired deadline aborts the in-flight call; the error
//! is returned to the caller and never retried here.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::FieldCryptError;

/// Cancellation token and deadline bounding a unit of work.
#[derive(Clone, Debug)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A fresh context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A fresh context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Wrap an existing token, e.g. one cancelled on client disconnect.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Narrow the deadline to at most `timeout` from now. An earlier
    /// existing deadline is kept.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    /// A child context: cancelled when `self` is, cancellable on its own
    /// without affecting `self`, same deadline.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the context is already done.
    pub fn check(&self) -> Result<(), FieldCryptError> {
        if self.token.is_cancelled() {
            return Err(FieldCryptError::Cancelled);
        }
        if matches!(self.deadline, Some(d) if Instant::now() >= d) {
            return Err(FieldCryptError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run `fut` to completion unless the context is cancelled or its
    /// deadline passes first. The losing future is dropped, aborting the call.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, FieldCryptError>
    where
        F: Future<Output = T>,
    {
        self.check()?;
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(FieldCryptError::Cancelled),
            _ = expired => Err(FieldCryptError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        assert_eq!(ctx.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn cancelled_context_fails_before_running() {
        let ctx = CallContext::background();
        ctx.cancel();
        let ran = std::sync::atomic::AtomicBool::new(false);
        let res = ctx
            .run(async { ran.store(true, std::sync::atomic::Ordering::SeqCst) })
            .await;
        assert!(matches!(res, Err(FieldCryptError::Cancelled)));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn deadline_aborts_slow_call() {
        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        let res = ctx
            .run(tokio::time::sleep(Duration::from_secs(10)))
            .await;
        assert!(matches!(res, Err(FieldCryptError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn cancellation_mid_flight() {
        let ctx = CallContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let res = ctx.run(std::future::pending::<()>()).await;
        assert!(matches!(res, Err(FieldCryptError::Cancelled)));
    }

    #[test]
    fn child_follows_parent_but_not_reverse() {
        let parent = CallContext::background();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn past_deadline_fails_before_running() {
        let ctx = CallContext::with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(matches!(ctx.check(), Err(FieldCryptError::DeadlineExceeded)));
        assert!(matches!(
            ctx.run(async { 1 }).await,
            Err(FieldCryptError::DeadlineExceeded)
        ));
    }

    #[tokio::test]
    async fn external_token_cancels_context() {
        let shutdown = CancellationToken::new();
        let ctx = CallContext::from_token(shutdown.child_token()).timeout(Duration::from_secs(5));
        assert!(ctx.deadline().is_some());
        shutdown.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.run(async { 1 }).await, Err(FieldCryptError::Cancelled)));
    }

    #[tokio::test]
    async fn timeout_keeps_earlier_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_millis(10));
        let first = ctx.deadline().unwrap();
        let ctx = ctx.timeout(Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(first));
    }
}
