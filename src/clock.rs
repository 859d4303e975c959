//! Time-source abstraction for the circuit breaker and token bucket.
//!
//! Both primitives measure elapsed time, never wall-clock time, so the trait
//! hands out a `Duration` since the clock's own epoch. Wall-clock skew can
//! neither grant phantom tokens nor stall an open circuit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Thread-safe monotonic time source.
///
/// Readings are relative to the implementer's epoch and must never decrease.
/// Readings from independently created clocks are not comparable.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Elapsed time since this clock's epoch.
    fn now(&self) -> Duration;
}

/// Production clock backed by `Instant::now()`.
///
/// Clones share the epoch captured at creation; the reading resets on process
/// restart, which is fine for the in-memory state this crate keeps.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Create a clock whose epoch is the moment of the call.
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Hand-advanced clock for deterministic tests.
///
/// Starts at zero; clones share the reading. Exported so downstream crates
/// can drive time-based behavior in their own tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the reading forward by `delta`. Saturates at `u64::MAX`
    /// nanoseconds; the reading never wraps backwards.
    pub fn advance(&self, delta: Duration) {
        let delta = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        let _ = self.nanos.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
            Some(now.saturating_add(delta))
        });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn monotonic_never_decreases() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn monotonic_clones_share_epoch() {
        let clock = MonotonicClock::new();
        let clone = clock.clone();
        thread::sleep(Duration::from_millis(2));
        let (a, b) = (clock.now(), clone.now());
        let diff = if a > b { a - b } else { b - a };
        assert!(diff < Duration::from_millis(50), "clones diverged by {:?}", diff);
    }

    #[test]
    fn manual_clock_starts_at_zero_and_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);

        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_millis(250));

        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_millis(1250));
    }

    #[test]
    fn manual_clock_saturates_instead_of_wrapping() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_nanos(u64::MAX));
        let pinned = clock.now();

        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), pinned, "saturated reading must not move");
        assert!(clock.now() >= pinned, "reading never decreases");
    }

    #[test]
    fn manual_clock_clones_share_reading() {
        let clock = ManualClock::new();
        let clone = clock.clone();
        clock.advance(Duration::from_secs(5));
        assert_eq!(clone.now(), Duration::from_secs(5));
    }

    #[test]
    fn trait_objects_work_across_threads() {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let mut handles = vec![];
        for _ in 0..4 {
            let clock = clock.clone();
            handles.push(thread::spawn(move || {
                let _ = clock.now();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
