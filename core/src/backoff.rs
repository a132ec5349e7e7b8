//! Exponential backoff for push channel reconnects.
//!
//! # Example
//!
//! ```rust
//! use workshop_sync_core::backoff::ReconnectPolicy;
//! use std::time::Duration;
//!
//! let policy = ReconnectPolicy::builder()
//!     .initial_delay(Duration::from_millis(500))
//!     .max_delay(Duration::from_secs(10))
//!     .max_attempts(3)
//!     .jitter_ratio(0.0)
//!     .build();
//!
//! assert_eq!(policy.delay_for_attempt(1, 0.0), Duration::from_millis(500));
//! assert_eq!(policy.delay_for_attempt(2, 0.0), Duration::from_secs(1));
//! ```

use std::time::Duration;

/// Reconnect policy.
///
/// # Default Values
///
/// - `initial_delay`: 1 second
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each attempt)
/// - `max_attempts`: 5
/// - `jitter_ratio`: 0.25 (up to a quarter of the base delay is added)
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt
    pub initial_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
    /// Growth factor between attempts
    pub multiplier: f64,
    /// Reconnect attempts before giving up
    pub max_attempts: u32,
    /// Fraction of the base delay added as random jitter, in `[0, 1)`
    pub jitter_ratio: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
            jitter_ratio: 0.25,
        }
    }
}

impl ReconnectPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub fn builder() -> ReconnectPolicyBuilder {
        ReconnectPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    ///
    /// `base = initial_delay * multiplier^(attempt - 1)`, plus
    /// `base * jitter_ratio * jitter_sample`, capped at `max_delay`.
    ///
    /// With a multiplier of at least 2 and a jitter ratio below 1 the sequence
    /// is non-decreasing whatever the samples are.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32, jitter_sample: f64) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let max_secs = self.max_delay.as_secs_f64();

        let base_secs = (self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent))
            .min(max_secs);
        let jitter_secs = base_secs * self.jitter_ratio.clamp(0.0, 0.999) * jitter_sample.clamp(0.0, 1.0);

        Duration::from_secs_f64((base_secs + jitter_secs).min(max_secs))
    }

    /// Whether another reconnect may be scheduled after `attempts_made`
    #[must_use]
    pub const fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// Builder for [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct ReconnectPolicyBuilder {
    policy: ReconnectPolicy,
}

impl ReconnectPolicyBuilder {
    /// Set delay before the first reconnect.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Set the delay ceiling.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Set the growth factor.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    /// Set the number of reconnect attempts before giving up.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Set the jitter ratio.
    #[must_use]
    pub const fn jitter_ratio(mut self, ratio: f64) -> Self {
        self.policy.jitter_ratio = ratio;
        self
    }

    /// Build the [`ReconnectPolicy`].
    #[must_use]
    pub fn build(self) -> ReconnectPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn doubles_until_the_ceiling() {
        let policy = ReconnectPolicy::builder()
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(10))
            .jitter_ratio(0.0)
            .build();

        let delays: Vec<u64> = (1..=5)
            .map(|attempt| policy.delay_for_attempt(attempt, 0.0).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10]);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = ReconnectPolicy::default();
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }

    proptest! {
        #[test]
        fn delays_are_monotonic_and_capped(samples in proptest::collection::vec(0.0f64..1.0, 5)) {
            let policy = ReconnectPolicy::default();
            let delays: Vec<Duration> = samples
                .iter()
                .zip(1u32..)
                .map(|(sample, attempt)| policy.delay_for_attempt(attempt, *sample))
                .collect();

            for pair in delays.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
            for delay in &delays {
                prop_assert!(*delay <= policy.max_delay);
            }
        }
    }
}
