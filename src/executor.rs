//! Composition of resilience layers around an operation.
//!
//! The executor wraps an operation in a fixed stack, outermost first:
//!
//! ```text
//! RateLimiter.wait → Bulkhead → Timeout → CircuitBreaker → Retry → op
//! ```
//!
//! Only enabled layers appear. Rate limiting happens via `wait` before the
//! bulkhead so a rate-limited caller never occupies a concurrency slot, and
//! retry sits innermost so each attempt is a fresh call against the circuit
//! breaker's statistics.

use crate::bulkhead::Bulkhead;
use crate::circuit_breaker::CircuitBreaker;
use crate::context::Context;
use crate::error::ResilienceError;
use crate::rate_limit::RateLimiter;
use crate::retry::Retry;
use crate::timeout::Timeout;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, ResilienceError<E>>> + Send>>;
type OpFn<T, E> = Arc<dyn Fn(Context) -> BoxFuture<T, E> + Send + Sync>;

/// Fluent builder recording which layers wrap the operation.
pub struct ExecutorBuilder<E> {
    name: String,
    circuit_breaker: Option<CircuitBreaker>,
    retry: Option<Retry<E>>,
    rate_limiter: Option<RateLimiter>,
    bulkhead: Option<Bulkhead>,
    timeout: Option<Timeout>,
}

impl<E> ExecutorBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Start with no layers and the name `"executor"`.
    pub fn new() -> Self {
        Self {
            name: "executor".to_string(),
            circuit_breaker: None,
            retry: None,
            rate_limiter: None,
            bulkhead: None,
            timeout: None,
        }
    }

    /// Set the executor's name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enable the circuit-breaker layer.
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Enable the retry layer.
    pub fn with_retry(mut self, retry: Retry<E>) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Enable the rate-limiter layer.
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Enable the bulkhead layer.
    pub fn with_bulkhead(mut self, bulkhead: Bulkhead) -> Self {
        self.bulkhead = Some(bulkhead);
        self
    }

    /// Enable the timeout layer.
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Produce the immutable executor.
    pub fn build(self) -> Executor<E> {
        Executor {
            name: self.name,
            circuit_breaker: self.circuit_breaker,
            retry: self.retry,
            rate_limiter: self.rate_limiter,
            bulkhead: self.bulkhead,
            timeout: self.timeout,
        }
    }
}

impl<E> Default for ExecutorBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable stack of enabled layers, reusable across unlimited concurrent
/// calls. Clones share every layer's state.
pub struct Executor<E> {
    name: String,
    circuit_breaker: Option<CircuitBreaker>,
    retry: Option<Retry<E>>,
    rate_limiter: Option<RateLimiter>,
    bulkhead: Option<Bulkhead>,
    timeout: Option<Timeout>,
}

impl<E> Clone for Executor<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            circuit_breaker: self.circuit_breaker.clone(),
            retry: self.retry.clone(),
            rate_limiter: self.rate_limiter.clone(),
            bulkhead: self.bulkhead.clone(),
            timeout: self.timeout.clone(),
        }
    }
}

impl<E> fmt::Debug for Executor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.name)
            .field("circuit_breaker", &self.circuit_breaker.is_some())
            .field("retry", &self.retry.is_some())
            .field("rate_limiter", &self.rate_limiter.is_some())
            .field("bulkhead", &self.bulkhead.is_some())
            .field("timeout", &self.timeout.is_some())
            .finish()
    }
}

impl<E> Executor<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Start building an executor.
    pub fn builder() -> ExecutorBuilder<E> {
        ExecutorBuilder::new()
    }

    /// The executor's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `op` through the enabled layers, discarding the success value.
    pub async fn execute<Fut, Op>(&self, ctx: &Context, op: Op) -> Result<(), ResilienceError<E>>
    where
        Fut: Future<Output = Result<(), ResilienceError<E>>> + Send + 'static,
        Op: Fn(Context) -> Fut + Send + Sync + 'static,
    {
        self.execute_with_result(ctx, op).await
    }

    /// Run `op` through the enabled layers, carrying its success value out.
    /// Layers reason about the error path only; the value is opaque to them.
    pub async fn execute_with_result<T, Fut, Op>(
        &self,
        ctx: &Context,
        op: Op,
    ) -> Result<T, ResilienceError<E>>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'static,
        Op: Fn(Context) -> Fut + Send + Sync + 'static,
    {
        let mut wrapped: OpFn<T, E> =
            Arc::new(move |ctx| -> BoxFuture<T, E> { Box::pin(op(ctx)) });

        // Innermost: each retry attempt re-enters nothing but the raw
        // operation.
        if let Some(retry) = self.retry.clone() {
            let inner = wrapped;
            wrapped = Arc::new(move |ctx: Context| -> BoxFuture<T, E> {
                let retry = retry.clone();
                let inner = Arc::clone(&inner);
                Box::pin(async move { retry.execute(&ctx, move |c| inner(c)).await })
            });
        }

        if let Some(breaker) = self.circuit_breaker.clone() {
            let inner = wrapped;
            wrapped = Arc::new(move |ctx: Context| -> BoxFuture<T, E> {
                let breaker = breaker.clone();
                let inner = Arc::clone(&inner);
                Box::pin(async move { breaker.execute(&ctx, move |c| inner(c)).await })
            });
        }

        if let Some(timeout) = self.timeout.clone() {
            let inner = wrapped;
            wrapped = Arc::new(move |ctx: Context| -> BoxFuture<T, E> {
                let timeout = timeout.clone();
                let inner = Arc::clone(&inner);
                Box::pin(async move { timeout.execute(&ctx, move |c| inner(c)).await })
            });
        }

        if let Some(bulkhead) = self.bulkhead.clone() {
            let inner = wrapped;
            wrapped = Arc::new(move |ctx: Context| -> BoxFuture<T, E> {
                let bulkhead = bulkhead.clone();
                let inner = Arc::clone(&inner);
                Box::pin(async move { bulkhead.execute(&ctx, move |c| inner(c)).await })
            });
        }

        // Outermost: admission control. Performed before the bulkhead so a
        // rate-limited caller holds no concurrency slot while it waits.
        if let Some(limiter) = &self.rate_limiter {
            limiter.wait(ctx).await?;
        }

        wrapped(ctx.clone()).await
    }
}
