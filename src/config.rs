//! Aggregate configuration and executor assembly.
//!
//! Each layer's section deserializes from the host's key/value source under
//! its own prefix; callbacks are not configuration and attach via the
//! builder methods on each primitive.

use crate::bulkhead::{Bulkhead, BulkheadConfig};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::executor::Executor;
use crate::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::retry::{Retry, RetryConfig};
use crate::timeout::{Timeout, TimeoutConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for a full resilience stack, one section per layer. Every
/// section defaults to enabled with its documented defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Circuit-breaker section.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry section.
    pub retry: RetryConfig,
    /// Rate-limiter section.
    pub rate_limiter: RateLimiterConfig,
    /// Bulkhead section.
    pub bulkhead: BulkheadConfig,
    /// Timeout section.
    pub timeout: TimeoutConfig,
}

impl Config {
    /// Assemble an [`Executor`] honoring every section's `enabled` flag.
    /// Logs one line per enabled layer.
    pub fn executor<E>(&self, name: impl Into<String>) -> Executor<E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let name = name.into();
        let mut builder = Executor::builder().with_name(name.clone());

        if self.circuit_breaker.enabled {
            tracing::info!(
                name = %self.circuit_breaker.name,
                failure_threshold = self.circuit_breaker.failure_threshold,
                "circuit breaker enabled"
            );
            builder =
                builder.with_circuit_breaker(CircuitBreaker::new(self.circuit_breaker.clone()));
        }
        if self.retry.enabled {
            tracing::info!(
                name = %self.retry.name,
                max_attempts = self.retry.max_attempts,
                "retry enabled"
            );
            builder = builder.with_retry(Retry::new(self.retry.clone()));
        }
        if self.rate_limiter.enabled {
            tracing::info!(
                name = %self.rate_limiter.name,
                rate = self.rate_limiter.rate,
                "rate limiter enabled"
            );
            builder = builder.with_rate_limiter(RateLimiter::new(self.rate_limiter.clone()));
        }
        if self.bulkhead.enabled {
            tracing::info!(
                name = %self.bulkhead.name,
                max_concurrent = self.bulkhead.max_concurrent,
                "bulkhead enabled"
            );
            builder = builder.with_bulkhead(Bulkhead::new(self.bulkhead.clone()));
        }
        if self.timeout.enabled {
            tracing::info!(duration = ?self.timeout.duration, "timeout enabled");
            builder = builder.with_timeout(Timeout::new(self.timeout.duration, name));
        }

        builder.build()
    }

    /// Compact per-layer `enabled` flags, safe for logging.
    pub fn summary(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            ("circuit_breaker_enabled", self.circuit_breaker.enabled),
            ("retry_enabled", self.retry.enabled),
            ("rate_limiter_enabled", self.rate_limiter.enabled),
            ("bulkhead_enabled", self.bulkhead.enabled),
            ("timeout_enabled", self.timeout.enabled),
        ])
    }
}
