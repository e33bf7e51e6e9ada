//! Per-request cancellation and deadline.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::NetError;

/// Cancellable context carried by every network operation.
///
/// Combines a [`CancellationToken`] with an optional timeout. Cancellation
/// takes priority over the deadline: a call whose token is cancelled
/// reports [`NetError::Cancelled`] even if it would also have timed out.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    timeout: Option<Duration>,
}

impl RequestContext {
    /// A context with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that times out after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            timeout: Some(timeout),
        }
    }

    /// Derive a child context with its own timeout.
    ///
    /// Cancelling the parent cancels the child; cancelling the child does
    /// not affect the parent.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        Self {
            token: self.token.child_token(),
            timeout,
        }
    }

    /// Cancel every operation running under this context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The configured timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run a fallible operation under this context.
    ///
    /// Resolves to [`NetError::Cancelled`] if the token fires first, and
    /// [`NetError::Timeout`] if the deadline elapses before the operation
    /// completes. Dropping the returned future aborts the operation.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, NetError>
    where
        F: Future<Output = Result<T, NetError>>,
    {
        let work = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| NetError::Timeout)?,
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(NetError::Cancelled),
            result = work => result,
        }
    }
}
