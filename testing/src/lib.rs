//! # Workshop Sync Testing
//!
//! Testing utilities and helpers for the workshop sync crates.
//!
//! This crate provides:
//! - Deterministic implementations of the environment traits (clock, jitter)
//! - Mock collaborators: workshop server, push transport, query cache
//! - The [`ReducerTest`] Given-When-Then harness and effect assertions
//! - Entity fixtures
//!
//! ## Example
//!
//! ```ignore
//! use workshop_sync_testing::mocks::{MockTransport, MockWorkshopApi, RecordingQueryCache};
//! use workshop_sync_runtime::Store;
//!
//! #[tokio::test]
//! async fn fetch_fills_the_store() {
//!     let api = MockWorkshopApi::new().with_workshop(fixtures::workshop("w1", WorkshopStatus::Planning));
//!     let store = Store::new(SyncState::default(), SyncReducer, test_environment(api));
//!
//!     store.send(SyncAction::FetchWorkshops).await?;
//! }
//! ```

use chrono::{DateTime, Utc};
use workshop_sync_core::environment::{Clock, JitterSource};

mod mock_api;
mod mock_transport;
mod reducer_test;

pub mod fixtures;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, JitterSource, Utc};

    pub use crate::mock_api::{ApiCall, MockWorkshopApi};
    pub use crate::mock_transport::{MockTransport, RecordingQueryCache};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use workshop_sync_testing::mocks::FixedClock;
    /// use workshop_sync_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Jitter source that always returns the same sample
    #[derive(Debug, Clone, Copy)]
    pub struct FixedJitter(pub f64);

    impl JitterSource for FixedJitter {
        fn sample(&self) -> f64 {
            self.0
        }
    }

    /// Jitter source that never adds jitter
    pub const ZERO_JITTER: FixedJitter = FixedJitter(0.0);
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use workshop_sync_core::model::{AttendeeStatus, WorkshopStatus};

    /// Any attendee status
    pub fn attendee_status() -> impl Strategy<Value = AttendeeStatus> {
        proptest::sample::select(AttendeeStatus::ALL.to_vec())
    }

    /// Any workshop status
    pub fn workshop_status() -> impl Strategy<Value = WorkshopStatus> {
        proptest::sample::select(WorkshopStatus::ALL.to_vec())
    }

    /// Up to `max` attendee statuses
    pub fn attendee_statuses(max: usize) -> impl Strategy<Value = Vec<AttendeeStatus>> {
        proptest::collection::vec(attendee_status(), 0..=max)
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, FixedJitter, ZERO_JITTER, test_clock};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn fixed_jitter_repeats_its_sample() {
        assert!(ZERO_JITTER.sample().abs() < f64::EPSILON);
        assert!((FixedJitter(0.5).sample() - 0.5).abs() < f64::EPSILON);
    }
}
