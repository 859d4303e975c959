#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Holdfast
//!
//! Composable fault-tolerance primitives for distributed clients and service
//! front-ends: wrap any operation that calls an unreliable collaborator.
//!
//! ## Layers
//!
//! - **Circuit breaker** — Closed/Open/HalfOpen machine driven by rolling
//!   failure statistics, with generation-stamped counts
//! - **Retry** — exponential backoff with jitter and a pluggable
//!   should-retry predicate
//! - **Rate limiter** — token bucket with non-blocking `allow` and
//!   cancellable `wait`
//! - **Bulkhead** — concurrency cap plus a bounded FIFO waiting queue
//! - **Timeout** — wall-clock deadline with cancellation propagation
//! - **Executor** — composes any subset of the above in a fixed order:
//!   `RateLimiter.wait → Bulkhead → Timeout → CircuitBreaker → Retry → op`
//!
//! Every operation receives a [`Context`] carrying the deadline and cancel
//! signal; every blocking wait honors it.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use holdfast::{Backoff, Context, Executor, ResilienceError, Retry, RetryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ResilienceError<std::io::Error>> {
//!     let retry = Retry::new(RetryConfig { max_attempts: 3, ..RetryConfig::default() })
//!         .with_backoff(Backoff::constant(Duration::from_millis(10)));
//!
//!     let executor = Executor::builder().with_name("upstream").with_retry(retry).build();
//!
//!     let attempts = Arc::new(AtomicUsize::new(0));
//!     let seen = attempts.clone();
//!     let ctx = Context::background();
//!     executor
//!         .execute(&ctx, move |_ctx| {
//!             let attempts = seen.clone();
//!             async move {
//!                 if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
//!                     Err(ResilienceError::Inner(std::io::Error::new(
//!                         std::io::ErrorKind::Other,
//!                         "transient failure",
//!                     )))
//!                 } else {
//!                     Ok(())
//!                 }
//!             }
//!         })
//!         .await?;
//!
//!     assert_eq!(attempts.load(Ordering::SeqCst), 3);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod bulkhead;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod rate_limit;
pub mod retry;
pub mod timeout;

// Re-exports
pub use backoff::Backoff;
pub use bulkhead::{Bulkhead, BulkheadConfig, OnBulkheadFull};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Counts, OnStateChange};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::Config;
pub use context::Context;
pub use error::ResilienceError;
pub use executor::{Executor, ExecutorBuilder};
pub use rate_limit::{OnRateLimit, RateLimiter, RateLimiterConfig};
pub use retry::{OnRetry, Retry, RetryConfig, ShouldRetry};
pub use timeout::{Timeout, TimeoutConfig};
