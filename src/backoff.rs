//! Backoff strategies for the retry engine.
//!
//! `next(attempt)` yields the delay slept *after* attempt `attempt` fails, so
//! the first retry waits `next(0)`. The exponential strategy samples its
//! jitter uniformly from `[base − r·base, base + r·base]`; without jitter a
//! fleet of clients retrying the same outage would hammer the downstream in
//! lockstep.

use rand::Rng;
use std::time::Duration;

/// Backoff strategy, polymorphic over `next(attempt) -> Duration`.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Fixed delay between attempts.
    Constant {
        /// The delay returned for every attempt.
        interval: Duration,
    },
    /// `initial + attempt · increment`, capped at `max`.
    Linear {
        /// Delay after the first failed attempt.
        initial: Duration,
        /// Added per subsequent attempt.
        increment: Duration,
        /// Upper bound on the computed delay.
        max: Duration,
    },
    /// `initial · multiplier^attempt`, capped at `max`, then jittered by
    /// `randomization` (a fraction of the capped base).
    Exponential {
        /// Delay after the first failed attempt, pre-jitter.
        initial: Duration,
        /// Upper bound on the pre-jitter delay.
        max: Duration,
        /// Growth factor per attempt.
        multiplier: f64,
        /// Jitter half-width as a fraction of the base, in `[0, 1]`.
        randomization: f64,
    },
}

impl Backoff {
    /// Constant backoff.
    pub fn constant(interval: Duration) -> Self {
        Backoff::Constant { interval }
    }

    /// Linear backoff capped at `max`.
    pub fn linear(initial: Duration, increment: Duration, max: Duration) -> Self {
        Backoff::Linear { initial, increment, max }
    }

    /// Exponential backoff with jitter, capped at `max`.
    pub fn exponential(
        initial: Duration,
        max: Duration,
        multiplier: f64,
        randomization: f64,
    ) -> Self {
        Backoff::Exponential { initial, max, multiplier, randomization }
    }

    /// The delay to sleep after attempt `attempt` (0-based) fails.
    pub fn next(&self, attempt: usize) -> Duration {
        self.next_with_rng(attempt, &mut rand::rng())
    }

    /// As [`next`], with an injected RNG for deterministic tests.
    ///
    /// [`next`]: Backoff::next
    pub fn next_with_rng<R: Rng>(&self, attempt: usize, rng: &mut R) -> Duration {
        match self {
            Backoff::Constant { interval } => *interval,
            Backoff::Linear { initial, increment, max } => {
                let steps = u32::try_from(attempt).unwrap_or(u32::MAX);
                let delay = initial.saturating_add(increment.saturating_mul(steps));
                delay.min(*max)
            }
            Backoff::Exponential { initial, max, multiplier, randomization } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let mut base = initial.as_secs_f64() * multiplier.powi(exponent);
                let cap = max.as_secs_f64();
                if !base.is_finite() || base > cap {
                    base = cap;
                }

                let delta = randomization * base;
                let sampled = if delta > 0.0 {
                    rng.random_range((base - delta).max(0.0)..=(base + delta))
                } else {
                    base
                };
                Duration::from_secs_f64(sampled.max(0.0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn constant_ignores_attempt() {
        let backoff = Backoff::constant(Duration::from_millis(40));
        assert_eq!(backoff.next(0), Duration::from_millis(40));
        assert_eq!(backoff.next(7), Duration::from_millis(40));
    }

    #[test]
    fn linear_grows_by_increment() {
        let backoff = Backoff::linear(
            Duration::from_millis(100),
            Duration::from_millis(50),
            Duration::from_secs(1),
        );
        assert_eq!(backoff.next(0), Duration::from_millis(100));
        assert_eq!(backoff.next(1), Duration::from_millis(150));
        assert_eq!(backoff.next(4), Duration::from_millis(300));
    }

    #[test]
    fn linear_caps_at_max() {
        let backoff = Backoff::linear(
            Duration::from_millis(100),
            Duration::from_millis(500),
            Duration::from_millis(600),
        );
        assert_eq!(backoff.next(1), Duration::from_millis(600));
        assert_eq!(backoff.next(100), Duration::from_millis(600));
    }

    #[test]
    fn linear_saturates_on_huge_attempts() {
        let backoff =
            Backoff::linear(Duration::from_secs(1), Duration::from_secs(u64::MAX / 2), Duration::MAX);
        // Must not panic; the cap bounds the result.
        let _ = backoff.next(1_000_000_000);
    }

    #[test]
    fn exponential_without_jitter_doubles() {
        let backoff =
            Backoff::exponential(Duration::from_millis(100), Duration::from_secs(10), 2.0, 0.0);
        assert_eq!(backoff.next(0), Duration::from_millis(100));
        assert_eq!(backoff.next(1), Duration::from_millis(200));
        assert_eq!(backoff.next(3), Duration::from_millis(800));
    }

    #[test]
    fn exponential_caps_at_max_interval() {
        let backoff =
            Backoff::exponential(Duration::from_millis(100), Duration::from_secs(1), 2.0, 0.0);
        assert_eq!(backoff.next(3), Duration::from_millis(800));
        assert_eq!(backoff.next(4), Duration::from_secs(1));
        assert_eq!(backoff.next(50), Duration::from_secs(1));
    }

    #[test]
    fn exponential_survives_overflowing_attempts() {
        let backoff =
            Backoff::exponential(Duration::from_secs(1), Duration::from_secs(60), 2.0, 0.0);
        assert_eq!(backoff.next(1_000_000_000), Duration::from_secs(60));
    }

    #[test]
    fn exponential_jitter_stays_within_band() {
        let backoff =
            Backoff::exponential(Duration::from_millis(1000), Duration::from_secs(10), 2.0, 0.5);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let delay = backoff.next_with_rng(0, &mut rng);
            assert!(delay >= Duration::from_millis(500), "below jitter band: {:?}", delay);
            assert!(delay <= Duration::from_millis(1500), "above jitter band: {:?}", delay);
        }
    }

    #[test]
    fn exponential_jitter_varies() {
        let backoff =
            Backoff::exponential(Duration::from_millis(1000), Duration::from_secs(10), 2.0, 0.5);
        let mut rng = StdRng::seed_from_u64(7);

        let samples: Vec<_> = (0..50).map(|_| backoff.next_with_rng(0, &mut rng)).collect();
        let first = samples[0];
        assert!(samples.iter().any(|s| *s != first), "jitter produced identical delays");
    }

    #[test]
    fn jitter_band_is_clamped_to_the_cap_not_the_raw_base() {
        // Base is capped to max before jitter applies, so the band centers on max.
        let backoff =
            Backoff::exponential(Duration::from_secs(4), Duration::from_secs(4), 2.0, 0.25);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let delay = backoff.next_with_rng(5, &mut rng);
            assert!(delay >= Duration::from_secs(3));
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn zero_initial_yields_zero() {
        let backoff = Backoff::exponential(Duration::ZERO, Duration::from_secs(1), 2.0, 0.5);
        assert_eq!(backoff.next(3), Duration::ZERO);
    }
}
