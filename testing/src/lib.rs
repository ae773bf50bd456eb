//! # Booking Testing
//!
//! Testing utilities and helpers for the booking orchestration engine.
//!
//! This crate provides:
//! - Mock implementations of Environment traits (`FixedClock`)
//! - An in-memory `EventStore` for fast, deterministic reducer/store tests
//! - The `ReducerTest` given/when/then harness
//!
//! ## Example
//!
//! ```ignore
//! use booking_testing::test_clock;
//! use booking_runtime::Store;
//!
//! #[tokio::test]
//! async fn test_order_flow() {
//!     let env = test_environment();
//!     let store = OrderStore::new(OrderState::default(), OrderReducer, env);
//!
//!     store.send(OrderAction::PlaceOrder {
//!         customer_id: CustomerId::new(1),
//!         items: vec![],
//!     }).await;
//!
//!     let state = store.state(|s| s.clone()).await;
//!     assert_eq!(state.orders.len(), 1);
//! }
//! ```

use booking_core::environment::Clock;
use chrono::{DateTime, Utc};

pub mod in_memory_event_store;
pub mod reducer_test;

/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use booking_testing::mocks::FixedClock;
    /// use booking_core::environment::Clock;
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
        /// Create a new fixed clock with the given time.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }

        /// Advance the clock by the given number of seconds.
        #[must_use]
        pub fn advance(&self, seconds: i64) -> Self {
            Self {
                time: self.time + chrono::Duration::seconds(seconds),
            }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
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
}

// Re-export commonly used items
pub use in_memory_event_store::InMemoryEventStore;
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::ReducerTest;
