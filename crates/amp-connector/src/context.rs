//! Operation context
//!
//! Every public operation takes a [`Context`] carrying a cancellation token
//! and an optional deadline.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ConnectorError, ConnectorResult};

/// Cancellation scope for a connector call.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Create a context that is never cancelled unless [`Context::cancel`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context driven by an existing cancellation token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a context that also expires after `timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            token: self.token.clone(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    /// Derive a child context: cancelling the child leaves the parent untouched.
    #[must_use]
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

    /// Whether the context was cancelled or its deadline passed.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with [`ConnectorError::Cancelled`] if the context is done.
    pub fn check(&self) -> ConnectorResult<()> {
        if self.is_cancelled() {
            Err(ConnectorError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Run `fut` unless the context finishes first.
    pub async fn run<F, T>(&self, fut: F) -> ConnectorResult<T>
    where
        F: std::future::Future<Output = ConnectorResult<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            () = self.done() => Err(ConnectorError::Cancelled),
            result = fut => result,
        }
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_propagates_to_children() {
        let parent = Context::new();
        let child = parent.child();
        assert!(child.check().is_ok());

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(matches!(child.check(), Err(ConnectorError::Cancelled)));
    }

    #[test]
    fn test_child_cancel_leaves_parent() {
        let parent = Context::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let ctx = Context::new().with_timeout(Duration::from_millis(10));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ConnectorError::Cancelled)));
    }
}
