//! Randomness for reconnect jitter.

use workshop_sync_core::environment::JitterSource;

/// Draws jitter samples from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::random::<f64>()
    }
}
