pub mod limiter;

pub use limiter::{RateLimiter, TokenBucket};

use crate::core::{Error, Result};
use futures::future::{self, BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cancellation and deadline scope for store calls.
///
/// Contexts are cheap to clone. A child made with [`with_cancel`](Self::with_cancel)
/// or [`with_timeout`](Self::with_timeout) observes everything its parent does
/// plus its own signal.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels the context it was created with, and every child of it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        let mut child = self.clone();
        child.cancel.push(receiver);
        (
            child,
            CancelHandle {
                sender: Arc::new(sender),
            },
        )
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The earlier of this context's deadline and `deadline` wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.clone();
        child.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        child
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.iter().any(|receiver| *receiver.borrow())
    }

    /// Fails if the context is already cancelled or past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(Error::DeadlineExceeded);
        }
        Ok(())
    }

    /// Runs `fut` until it completes, the context is cancelled, or the
    /// deadline passes. An aborted future is dropped.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Error::Cancelled),
            _ = deadline => Err(Error::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }

    /// Completes once any cancel handle in scope fires.
    ///
    /// Never completes if every handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        if self.cancel.is_empty() {
            return future::pending().await;
        }

        let waits: Vec<BoxFuture<'static, ()>> = self
            .cancel
            .iter()
            .cloned()
            .map(|mut receiver| {
                async move {
                    let closed = receiver.wait_for(|cancelled| *cancelled).await.is_err();
                    if closed {
                        future::pending::<()>().await;
                    }
                }
                .boxed()
            })
            .collect();
        future::select_all(waits).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = Context::background();
        assert_eq!(ctx.run(async { 7 }).await.unwrap(), 7);
        assert!(ctx.check().is_ok());
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_future() {
        let (ctx, handle) = Context::background().with_cancel();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(30)))
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        canceller.await.unwrap();
        assert!(matches!(ctx.check(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_child_observes_parent_cancellation() {
        let (parent, handle) = Context::background().with_cancel();
        let child = parent.with_timeout(Duration::from_secs(60));
        handle.cancel();
        assert!(matches!(child.check(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(30)))
            .await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_dropped_handle_never_cancels() {
        let (ctx, handle) = Context::background().with_cancel();
        drop(handle);
        assert_eq!(ctx.run(async { "done" }).await.unwrap(), "done");
    }
}
