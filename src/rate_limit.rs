//! Token-bucket rate limiter with lazy refill.
//!
//! The bucket refills on every inspection (`tokens = min(burst, tokens +
//! rate · Δt)`, fractional tokens included); there is no background refill
//! task, so instantiating one limiter per downstream costs nothing at rest.

use crate::clock::{Clock, MonotonicClock};
use crate::context::Context;
use crate::error::ResilienceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Callback fired with the limiter's name when a call is denied a token.
pub type OnRateLimit = Arc<dyn Fn(&str) + Send + Sync>;

/// Rate limiter configuration. Zero values are replaced with the documented
/// defaults at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Omit the limiter from an assembled executor when false.
    pub enabled: bool,
    /// Identifier reported to callbacks and logs.
    pub name: String,
    /// Tokens replenished per second.
    pub rate: f64,
    /// Maximum tokens the bucket holds at rest.
    pub burst: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { enabled: true, name: "default".to_string(), rate: 100.0, burst: 200 }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Duration,
}

/// Token-bucket rate limiter. Cloning shares the bucket.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: Arc<Mutex<Bucket>>,
    clock: Arc<dyn Clock>,
    on_rate_limit: Option<OnRateLimit>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter").field("config", &self.config).finish()
    }
}

impl RateLimiter {
    /// Create a limiter from `config`, normalizing zero values to defaults.
    /// The bucket starts full.
    pub fn new(mut config: RateLimiterConfig) -> Self {
        let defaults = RateLimiterConfig::default();
        if config.name.is_empty() {
            config.name = defaults.name;
        }
        if config.rate == 0.0 {
            config.rate = defaults.rate;
        }
        if config.burst == 0 {
            config.burst = defaults.burst;
        }

        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let bucket = Bucket { tokens: f64::from(config.burst), last_refill: clock.now() };
        Self { config, bucket: Arc::new(Mutex::new(bucket)), clock, on_rate_limit: None }
    }

    /// Swap the time source; restarts the bucket full at the new clock's
    /// reading. For deterministic tests.
    pub fn with_clock<C: Clock + 'static>(self, clock: C) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        {
            let mut bucket = self.bucket.lock().unwrap();
            bucket.tokens = f64::from(self.config.burst);
            bucket.last_refill = clock.now();
        }
        Self { clock, ..self }
    }

    /// Attach a callback fired whenever a token is refused.
    pub fn with_on_rate_limit<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_rate_limit = Some(Arc::new(callback));
        self
    }

    /// The limiter's identifier.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Non-blocking admission: refill, then take one token if available.
    pub fn allow(&self) -> bool {
        let allowed = {
            let mut bucket = self.bucket.lock().unwrap();
            self.refill(&mut bucket);
            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                true
            } else {
                false
            }
        };

        if !allowed {
            tracing::debug!(name = %self.config.name, "rate limit exceeded");
            if let Some(callback) = &self.on_rate_limit {
                callback(&self.config.name);
            }
        }
        allowed
    }

    /// Block until a token is granted or the handle finishes. Sleeps exactly
    /// long enough for the next token to accrue between probes.
    pub async fn wait<E>(&self, ctx: &Context) -> Result<(), ResilienceError<E>> {
        loop {
            if self.allow() {
                return Ok(());
            }

            let wait = self.next_token_wait();
            ctx.sleep(wait).await?;
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = self.clock.now();
        let elapsed = now.saturating_sub(bucket.last_refill);
        bucket.last_refill = now;

        let replenished = bucket.tokens + self.config.rate * elapsed.as_secs_f64();
        bucket.tokens = replenished.min(f64::from(self.config.burst));
    }

    /// Time until one whole token is available, given the current deficit.
    fn next_token_wait(&self) -> Duration {
        let bucket = self.bucket.lock().unwrap();
        let deficit = 1.0 - bucket.tokens;
        if deficit <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(deficit / self.config.rate)
    }
}
