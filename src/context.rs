//! Cancellation/deadline handles passed into every operation.
//!
//! A [`Context`] carries a cancel signal and an optional deadline. Handles
//! form a tree: cancelling a parent cancels its children, never the reverse,
//! and a child's deadline is clamped to its parent's. Deadlines are observed
//! lazily — there is no timer task per handle; [`Context::done`] races the
//! cancel signal against a deadline sleep.

use crate::error::ResilienceError;
use std::time::{Duration, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};

/// A scoped carrier for a cancel signal, an optional deadline, and the error
/// to surface when either fires.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Root handle: no deadline, cancelled only by an explicit [`cancel`].
    ///
    /// [`cancel`]: Context::cancel
    pub fn background() -> Self {
        Self { token: CancellationToken::new(), deadline: None }
    }

    /// Derive a child that inherits this handle's deadline. Cancelling the
    /// child does not affect this handle.
    pub fn child(&self) -> Self {
        Self { token: self.token.child_token(), deadline: self.deadline }
    }

    /// Derive a child that expires after `timeout`, clamped to this handle's
    /// own deadline if that is earlier.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child expiring at `deadline`, clamped to this handle's own
    /// deadline if that is earlier.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self { token: self.token.child_token(), deadline: Some(deadline) }
    }

    /// Cancel this handle and all handles derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A guard that cancels this handle when dropped, releasing the
    /// derivation on every exit path of the enclosing scope.
    pub fn guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    /// The deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once [`cancel`] has been called on this handle or an ancestor.
    /// Deadline expiry does not set this.
    ///
    /// [`cancel`]: Context::cancel
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the deadline has passed.
    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// True once the handle is finished for either reason.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.deadline_exceeded()
    }

    /// Resolves when the handle is cancelled or its deadline passes,
    /// whichever happens first. Resolves immediately if already done.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline.into()) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Sleep for `duration`, waking early if the handle finishes first.
    ///
    /// This is the suspension primitive behind every blocking wait in the
    /// crate (retry backoff, rate-limit pacing): interruption returns the
    /// handle's own error so the layer can propagate it unchanged.
    pub async fn sleep<E>(&self, duration: Duration) -> Result<(), ResilienceError<E>> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.done() => Err(self.error().unwrap_or(ResilienceError::Canceled)),
        }
    }

    /// The error this handle carries, if it is done. Explicit cancellation
    /// wins over deadline expiry when both hold.
    pub fn error<E>(&self) -> Option<ResilienceError<E>> {
        if self.token.is_cancelled() {
            Some(ResilienceError::Canceled)
        } else if self.deadline_exceeded() {
            Some(ResilienceError::DeadlineExceeded)
        } else {
            None
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
