//! Cancellation token system
//!
//! Session-scoped cooperative cancellation. Every session owns one token;
//! tool dispatches run under a child token so that cancelling the session
//! aborts any in-flight call promptly.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{AgentChatError, Result};

/// Token for cooperative cancellation of async operations
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    /// Create a new cancellation token
    ///
    /// # Examples
    /// ```
    /// use autogen_agentchat::CancellationToken;
    ///
    /// let token = CancellationToken::new();
    /// assert!(!token.is_cancelled());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cancellation token that is already cancelled
    pub fn already_cancelled() -> Self {
        let token = Self::new();
        token.cancel();
        token
    }

    /// Check if the token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Cancel the token and every child token derived from it
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Wait for the token to be cancelled
    pub async fn wait_for_cancellation(&self) {
        self.inner.cancelled().await;
    }

    /// Return `AgentChatError::Cancelled` if the token is cancelled
    pub fn throw_if_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AgentChatError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Create a child token that is cancelled together with this one.
    /// Cancelling the child does not affect the parent.
    pub fn child_token(&self) -> Self {
        Self {
            inner: self.inner.child_token(),
        }
    }

    /// Run a future, abandoning it if the token is cancelled first
    ///
    /// # Examples
    /// ```
    /// use autogen_agentchat::CancellationToken;
    ///
    /// # tokio_test::block_on(async {
    /// let token = CancellationToken::new();
    /// let value = token.run_with_cancellation(async { 42 }).await.unwrap();
    /// assert_eq!(value, 42);
    /// # });
    /// ```
    pub async fn run_with_cancellation<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.inner.cancelled() => Err(AgentChatError::Cancelled),
            result = future => Ok(result),
        }
    }

    /// Run a future with a deadline. Expiry yields `AgentChatError::Timeout`,
    /// cancellation yields `AgentChatError::Cancelled`.
    pub async fn run_with_timeout<F, T>(&self, duration: Duration, future: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.inner.cancelled() => Err(AgentChatError::Cancelled),
            result = timeout(duration, future) => result.map_err(|_| AgentChatError::Timeout {
                timeout_ms: duration.as_millis() as u64,
            }),
        }
    }
}
