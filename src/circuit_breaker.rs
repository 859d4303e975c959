//! Circuit breaker: a three-state machine driven by rolling failure counts.
//!
//! Closed admits everything and trips to Open when the failure ratio crosses
//! `failure_threshold` (once `min_requests` have been seen). Open refuses
//! admission until `timeout` elapses, then probes via HalfOpen, which admits
//! at most `max_requests` calls; any failure reopens, `max_requests`
//! consecutive successes close.
//!
//! Counts are stamped with a generation so a slow call that finishes after
//! the state machine has moved on reports into the void instead of corrupting
//! the current episode's statistics.

use crate::clock::{Clock, MonotonicClock};
use crate::context::Context;
use crate::error::ResilienceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Callback invoked on every state transition with `(name, from, to)`.
pub type OnStateChange = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// The three circuit states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally; failures are counted.
    Closed,
    /// Requests are refused without invoking the operation.
    Open,
    /// A limited number of probe requests test whether the downstream
    /// recovered.
    HalfOpen,
}

impl CircuitState {
    /// Stable string form for logs and callbacks.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration. Zero values are replaced with the
/// documented defaults at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Omit the breaker from an assembled executor when false.
    pub enabled: bool,
    /// Identifier reported to callbacks and logs.
    pub name: String,
    /// HalfOpen admission cap, and the consecutive-success count that
    /// re-closes the circuit.
    pub max_requests: u32,
    /// Closed-state period after which counts roll to a fresh generation.
    pub interval: Duration,
    /// Open-state duration before the next call may probe.
    pub timeout: Duration,
    /// Failure ratio in `[0, 1]` that trips the circuit.
    pub failure_threshold: f64,
    /// Minimum admitted requests before the ratio is evaluated.
    pub min_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "default".to_string(),
            max_requests: 5,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
            failure_threshold: 0.6,
            min_requests: 10,
        }
    }
}

/// Success/failure statistics for one generation. A snapshot is available
/// via [`CircuitBreaker::counts`] for diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    /// Admitted requests this generation.
    pub requests: u32,
    /// Successful completions this generation.
    pub total_successes: u32,
    /// Failed completions this generation.
    pub total_failures: u32,
    /// Current run of consecutive successes.
    pub consec_successes: u32,
    /// Current run of consecutive failures.
    pub consec_failures: u32,
}

impl Counts {
    fn success(&mut self) {
        self.total_successes += 1;
        self.consec_successes += 1;
        self.consec_failures = 0;
    }

    fn failure(&mut self) {
        self.total_failures += 1;
        self.consec_failures += 1;
        self.consec_successes = 0;
    }
}

#[derive(Debug)]
struct Shared {
    state: CircuitState,
    counts: Counts,
    state_time: Duration,
    generation: u64,
}

/// Three-state circuit breaker. Cloning shares the underlying state machine.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    shared: Arc<Mutex<Shared>>,
    clock: Arc<dyn Clock>,
    on_state_change: Option<OnStateChange>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker from `config`, normalizing zero values to defaults.
    pub fn new(mut config: CircuitBreakerConfig) -> Self {
        let defaults = CircuitBreakerConfig::default();
        if config.name.is_empty() {
            config.name = defaults.name;
        }
        if config.max_requests == 0 {
            config.max_requests = defaults.max_requests;
        }
        if config.interval.is_zero() {
            config.interval = defaults.interval;
        }
        if config.timeout.is_zero() {
            config.timeout = defaults.timeout;
        }
        if config.failure_threshold == 0.0 {
            config.failure_threshold = defaults.failure_threshold;
        }
        if config.min_requests == 0 {
            config.min_requests = defaults.min_requests;
        }

        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let now = clock.now();
        Self {
            config,
            shared: Arc::new(Mutex::new(Shared {
                state: CircuitState::Closed,
                counts: Counts::default(),
                state_time: now,
                generation: 1,
            })),
            clock,
            on_state_change: None,
        }
    }

    /// Swap the time source; resets the state-entry timestamp to the new
    /// clock's reading. For deterministic tests.
    pub fn with_clock<C: Clock + 'static>(self, clock: C) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        self.shared.lock().unwrap().state_time = clock.now();
        Self { clock, ..self }
    }

    /// Attach a state-transition callback. Fired once per transition, after
    /// the internal lock is released, so it may call back into the breaker.
    pub fn with_on_state_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(callback));
        self
    }

    /// The breaker's identifier.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> CircuitState {
        self.shared.lock().unwrap().state
    }

    /// Snapshot of the current generation's statistics. Diagnostic only;
    /// concurrent calls may race it.
    pub fn counts(&self) -> Counts {
        self.shared.lock().unwrap().counts
    }

    /// Force the circuit Closed and begin a fresh generation, whatever the
    /// current state.
    pub fn reset(&self) {
        let fired = {
            let mut shared = self.shared.lock().unwrap();
            let now = self.clock.now();
            let fired = Self::set_state(&mut shared, CircuitState::Closed, now);
            if fired.is_none() {
                Self::roll_generation(&mut shared, now);
            }
            fired
        };
        if let Some((from, to)) = fired {
            self.notify(from, to);
        }
    }

    /// Run `op` if admission succeeds, recording its outcome. Returns
    /// [`ResilienceError::CircuitOpen`] without invoking `op` when the
    /// circuit refuses admission.
    pub async fn execute<T, E, Fut, Op>(
        &self,
        ctx: &Context,
        op: Op,
    ) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnOnce(Context) -> Fut + Send,
    {
        let generation = match self.before_request() {
            Some(generation) => generation,
            None => return Err(ResilienceError::CircuitOpen),
        };

        let result = op(ctx.clone()).await;
        self.after_request(generation, result.is_ok());
        result
    }

    /// Admission check. Returns the generation to report into, or `None` when
    /// the call is refused.
    fn before_request(&self) -> Option<u64> {
        let (admitted, fired) = {
            let mut shared = self.shared.lock().unwrap();
            let now = self.clock.now();

            match shared.state {
                CircuitState::Closed => {
                    if now.saturating_sub(shared.state_time) > self.config.interval {
                        Self::roll_generation(&mut shared, now);
                    }
                    shared.counts.requests += 1;
                    (Some(shared.generation), None)
                }
                CircuitState::Open => {
                    if now.saturating_sub(shared.state_time) > self.config.timeout {
                        let fired = Self::set_state(&mut shared, CircuitState::HalfOpen, now);
                        // The transitioning call is the probe: admitted without
                        // counting against max_requests.
                        (Some(shared.generation), fired)
                    } else {
                        (None, None)
                    }
                }
                CircuitState::HalfOpen => {
                    if shared.counts.requests >= self.config.max_requests {
                        (None, None)
                    } else {
                        shared.counts.requests += 1;
                        (Some(shared.generation), None)
                    }
                }
            }
        };

        if let Some((from, to)) = fired {
            self.notify(from, to);
        }
        admitted
    }

    /// Outcome report. Reports stamped with a superseded generation are
    /// discarded rather than mis-attributed.
    fn after_request(&self, generation: u64, success: bool) {
        let fired = {
            let mut shared = self.shared.lock().unwrap();
            if generation != shared.generation {
                return;
            }
            let now = self.clock.now();

            if success {
                shared.counts.success();
                if shared.state == CircuitState::HalfOpen
                    && shared.counts.consec_successes >= self.config.max_requests
                {
                    Self::set_state(&mut shared, CircuitState::Closed, now)
                } else {
                    None
                }
            } else {
                shared.counts.failure();
                match shared.state {
                    CircuitState::HalfOpen => {
                        Self::set_state(&mut shared, CircuitState::Open, now)
                    }
                    CircuitState::Closed if self.ready_to_trip(&shared.counts) => {
                        Self::set_state(&mut shared, CircuitState::Open, now)
                    }
                    _ => None,
                }
            }
        };

        if let Some((from, to)) = fired {
            self.notify(from, to);
        }
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        if counts.requests < self.config.min_requests {
            return false;
        }
        let ratio = f64::from(counts.total_failures) / f64::from(counts.requests);
        ratio >= self.config.failure_threshold
    }

    fn set_state(
        shared: &mut Shared,
        state: CircuitState,
        now: Duration,
    ) -> Option<(CircuitState, CircuitState)> {
        if shared.state == state {
            return None;
        }
        let prev = shared.state;
        shared.state = state;
        Self::roll_generation(shared, now);
        Some((prev, state))
    }

    fn roll_generation(shared: &mut Shared, now: Duration) {
        shared.counts = Counts::default();
        shared.state_time = now;
        shared.generation += 1;
    }

    fn notify(&self, from: CircuitState, to: CircuitState) {
        match to {
            CircuitState::Open => {
                tracing::error!(name = %self.config.name, %from, %to, "circuit breaker opened")
            }
            CircuitState::HalfOpen => {
                tracing::info!(name = %self.config.name, %from, %to, "circuit breaker half-open")
            }
            CircuitState::Closed => {
                tracing::info!(name = %self.config.name, %from, %to, "circuit breaker closed")
            }
        }
        if let Some(callback) = &self.on_state_change {
            callback(&self.config.name, from, to);
        }
    }
}
