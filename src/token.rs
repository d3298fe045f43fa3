//! Call tokens: a caller-supplied deadline plus a cancellation signal.
//!
//! Every blocking wait on the client path runs through [`CallToken::run`] or
//! [`CallToken::run_or`], which race the operation against cancellation and
//! the deadline in a single `select!`. Whichever is ready first wins; there
//! is no polling interval.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use carrier_rpc::CallToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let token = CallToken::with_timeout(Duration::from_secs(5));
//! let value = token.run(async { 42 }).await.unwrap();
//! assert_eq!(value, 42);
//!
//! token.cancel();
//! assert!(token.run(async { 42 }).await.is_err());
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{RpcError, Result};

/// Deadline and cancellation signal bounding a call.
///
/// Cloning shares the cancellation signal: cancelling any clone cancels all
/// of them.
#[derive(Debug, Clone, Default)]
pub struct CallToken {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallToken {
    /// A token that never expires and is never cancelled unless asked to.
    pub fn background() -> Self {
        Self::default()
    }

    /// A token whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A token with an absolute deadline.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: CancellationToken::new(),
        }
    }

    /// A child token: cancelled when this one is, with the same deadline.
    /// Cancelling the child does not cancel this token.
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            cancel: self.cancel.child_token(),
        }
    }

    /// A child token: cancelled when this one is, with the earlier of this
    /// token's deadline and `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            deadline: Some(self.deadline.map_or(candidate, |d| d.min(candidate))),
            cancel: self.cancel.child_token(),
        }
    }

    /// The deadline, if any.
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this token and all of its clones and children.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run `fut` until it completes, the token is cancelled, or the deadline
    /// passes.
    ///
    /// # Errors
    ///
    /// `Cancelled` or `DeadlineExceeded`.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        self.race(self.deadline, fut).await
    }

    /// Like [`run`](Self::run), but applies `fallback` from now when the
    /// token has no deadline.
    pub async fn run_or<F: Future>(&self, fallback: Duration, fut: F) -> Result<F::Output> {
        let deadline = self.deadline.unwrap_or_else(|| Instant::now() + fallback);
        self.race(Some(deadline), fut).await
    }

    async fn race<F: Future>(&self, deadline: Option<Instant>, fut: F) -> Result<F::Output> {
        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RpcError::Cancelled),
            _ = expired => Err(RpcError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}
