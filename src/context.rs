//! Cancellation context passed through to creator and destroyer callbacks

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Opaque cancellation context handed to the pool's callbacks.
///
/// The pool never inspects it. A creator that dials a remote endpoint can use
/// [`Context::remaining`] as its connect timeout, poll
/// [`Context::is_cancelled`], or await [`Context::cancelled`] from async code.
///
/// Clones share the cancellation token, so cancelling one clone cancels all of
/// them. [`Context::child`] derives a context that is cancelled with its
/// parent but can also be cancelled on its own.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::Context;
/// use std::time::Duration;
///
/// let ctx = Context::with_timeout(Duration::from_secs(5));
/// let shared = ctx.clone();
/// let child = ctx.child();
/// assert!(!shared.is_cancelled());
///
/// ctx.cancel();
/// assert!(shared.is_cancelled());
/// assert!(child.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl Context {
    /// A context with no deadline that is never cancelled unless asked to
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancellation: CancellationToken::new(),
        }
    }

    /// Replace the cancellation token with the provided one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// A context cancelled together with this one, keeping the same deadline.
    /// Cancelling the child leaves the parent untouched.
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            cancellation: self.cancellation.child_token(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, `None` if there is no deadline.
    /// Returns `Duration::ZERO` once the deadline has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// True if the token was cancelled or the deadline has passed
    pub fn is_cancelled(&self) -> bool {
        if self.cancellation.is_cancelled() {
            return true;
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Resolves when the token is cancelled or the deadline passes
    pub async fn cancelled(&self) {
        match self.remaining() {
            Some(remaining) => {
                tokio::select! {
                    _ = self.cancellation.cancelled() => {}
                    _ = tokio::time::sleep(remaining) => {}
                }
            }
            None => self.cancellation.cancelled().await,
        }
    }
}
