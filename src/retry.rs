//! Retry engine: re-invokes an operation with backoff between attempts.
//!
//! Only operation errors (`Inner`) are retried; sentinels from other layers
//! and cancellation errors return immediately. After the final attempt the
//! raw operation error is returned, not a synthetic "retries exhausted"
//! wrapper, so callers can still match on their own error values.

use crate::backoff::Backoff;
use crate::context::Context;
use crate::error::ResilienceError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Predicate deciding whether an operation error is worth another attempt.
pub type ShouldRetry<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Callback fired with `(attempt, error)` before each retry sleep. The
/// attempt number is that of the upcoming attempt (1-based).
pub type OnRetry<E> = Arc<dyn Fn(usize, &E) + Send + Sync>;

/// Retry configuration. Zero values are replaced with the documented defaults
/// at construction; the backoff parameters feed the exponential strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Omit the retry layer from an assembled executor when false.
    pub enabled: bool,
    /// Identifier for diagnostics.
    pub name: String,
    /// Maximum number of invocations, including the first attempt.
    pub max_attempts: usize,
    /// First backoff delay, pre-jitter.
    pub initial_interval: Duration,
    /// Upper bound on the pre-jitter delay.
    pub max_interval: Duration,
    /// Exponential growth factor.
    pub multiplier: f64,
    /// Jitter half-width as a fraction of the capped base.
    pub randomization_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "default".to_string(),
            max_attempts: 3,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            randomization_factor: 0.5,
        }
    }
}

/// Retry engine, generic over the operation error type.
pub struct Retry<E> {
    config: RetryConfig,
    backoff: Backoff,
    should_retry: Option<ShouldRetry<E>>,
    on_retry: Option<OnRetry<E>>,
}

impl<E> Clone for Retry<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            backoff: self.backoff.clone(),
            should_retry: self.should_retry.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E> std::fmt::Debug for Retry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("config", &self.config)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl<E> Retry<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Create a retry engine from `config`, normalizing zero values to
    /// defaults and deriving an exponential-with-jitter backoff from the
    /// interval parameters.
    pub fn new(mut config: RetryConfig) -> Self {
        let defaults = RetryConfig::default();
        if config.name.is_empty() {
            config.name = defaults.name;
        }
        if config.max_attempts == 0 {
            config.max_attempts = defaults.max_attempts;
        }
        if config.initial_interval.is_zero() {
            config.initial_interval = defaults.initial_interval;
        }
        if config.max_interval.is_zero() {
            config.max_interval = defaults.max_interval;
        }
        if config.multiplier == 0.0 {
            config.multiplier = defaults.multiplier;
        }
        if config.randomization_factor == 0.0 {
            config.randomization_factor = defaults.randomization_factor;
        }

        let backoff = Backoff::exponential(
            config.initial_interval,
            config.max_interval,
            config.multiplier,
            config.randomization_factor,
        );
        Self { config, backoff, should_retry: None, on_retry: None }
    }

    /// Replace the backoff strategy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Attach a predicate; errors it rejects are returned without further
    /// attempts.
    pub fn with_should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Attach a callback fired before each retry sleep.
    pub fn with_on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, &E) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// The engine's identifier.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Invoke `op` up to `max_attempts` times, sleeping the backoff delay
    /// between attempts. Cancellation during a sleep returns the handle's
    /// error immediately, without another attempt.
    pub async fn execute<T, Fut, Op>(&self, ctx: &Context, op: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: Fn(Context) -> Fut + Send + Sync,
    {
        for attempt in 0..self.config.max_attempts {
            match op(ctx.clone()).await {
                Ok(value) => return Ok(value),
                Err(ResilienceError::Inner(err)) => {
                    if let Some(predicate) = &self.should_retry {
                        if !predicate(&err) {
                            return Err(ResilienceError::Inner(err));
                        }
                    }

                    if attempt + 1 >= self.config.max_attempts {
                        tracing::debug!(
                            name = %self.config.name,
                            attempts = self.config.max_attempts,
                            "retry attempts exhausted"
                        );
                        return Err(ResilienceError::Inner(err));
                    }

                    if let Some(callback) = &self.on_retry {
                        callback(attempt + 1, &err);
                    }

                    let delay = self.backoff.next(attempt);
                    ctx.sleep(delay).await?;
                }
                // Sentinels from other layers and cancellation errors are not
                // retryable.
                Err(other) => return Err(other),
            }
        }

        unreachable!("retry loop returns from its final attempt")
    }
}
