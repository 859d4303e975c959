//! Timeout: bounds an operation's wall-clock time via a derived handle.
//!
//! The operation runs as its own task so the deadline can be observed while
//! it is still working. On expiry the wrapper stops waiting and cancels the
//! derived handle; the operation keeps running until it notices, it is never
//! killed.

use crate::context::Context;
use crate::error::ResilienceError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Timeout configuration. A zero duration is replaced with the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Omit the timeout layer from an assembled executor when false.
    pub enabled: bool,
    /// Per-call deadline.
    pub duration: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { enabled: true, duration: Duration::from_secs(30) }
    }
}

/// Wall-clock deadline wrapper.
#[derive(Debug, Clone)]
pub struct Timeout {
    duration: Duration,
    name: String,
}

impl Timeout {
    /// Create a timeout layer. A zero `duration` takes the 30s default and an
    /// empty `name` becomes `"default"`.
    pub fn new(duration: Duration, name: impl Into<String>) -> Self {
        let duration = if duration.is_zero() {
            TimeoutConfig::default().duration
        } else {
            duration
        };
        let mut name = name.into();
        if name.is_empty() {
            name = "default".to_string();
        }
        Self { duration, name }
    }

    /// The configured deadline.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The layer's identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `op` with a handle that expires after [`duration`], clamped to the
    /// parent's deadline. Returns the operation's result if it finishes
    /// first, [`ResilienceError::Timeout`] on expiry, or
    /// [`ResilienceError::Canceled`] if the parent is cancelled outright.
    ///
    /// [`duration`]: Timeout::duration
    pub async fn execute<T, E, Fut, Op>(
        &self,
        ctx: &Context,
        op: Op,
    ) -> Result<T, ResilienceError<E>>
    where
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'static,
        Op: FnOnce(Context) -> Fut + Send,
    {
        let child = ctx.with_timeout(self.duration);
        // Cancels the derived handle on every exit path below.
        let _release = child.guard();

        let mut task = tokio::spawn(op(child.clone()));

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => Err(ResilienceError::Canceled),
            },
            _ = child.done() => {
                if ctx.is_cancelled() {
                    Err(ResilienceError::Canceled)
                } else {
                    tracing::warn!(
                        name = %self.name,
                        duration = ?self.duration,
                        "operation outran its deadline"
                    );
                    Err(ResilienceError::Timeout)
                }
            }
        }
    }
}
