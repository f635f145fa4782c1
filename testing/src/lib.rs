//! # Eventloom Testing
//!
//! Testing utilities and helpers for the Eventloom engine.
//!
//! This crate provides:
//! - In-memory implementations of the storage and bus traits
//! - A recording projection for asserting what subscribers saw
//! - Deterministic time
//! - Fixture aggregates used across the workspace's tests
//!
//! ## Example
//!
//! ```ignore
//! use eventloom_testing::fixtures::{AccountCommand, AccountId, BankAccount};
//! use eventloom_testing::mocks::{InMemoryEventBus, InMemoryEventStore, InMemorySnapshotBackend};
//!
//! #[tokio::test]
//! async fn deposit_then_read() {
//!     let engine = Engine::new(
//!         Arc::new(InMemoryEventStore::new()),
//!         Arc::new(InMemorySnapshotBackend::new()),
//!         Arc::new(InMemoryEventBus::new()),
//!         EngineConfig::default(),
//!     );
//!     engine.start().await.unwrap();
//!
//!     let id = AccountId::generate();
//!     engine.send::<BankAccount>(&CommandEnvelope::new(id, AccountCommand::Deposit { amount: 5 })).await.unwrap();
//! }
//! ```

use chrono::{DateTime, Utc};
use eventloom_core::environment::Clock;

mod event_bus;
mod event_store;
pub mod fixtures;
mod projection_mocks;
mod snapshot_backend;

/// Mock implementations of the engine's collaborators.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    pub use crate::event_bus::InMemoryEventBus;
    pub use crate::event_store::InMemoryEventStore;
    pub use crate::projection_mocks::RecordingProjection;
    pub use crate::snapshot_backend::InMemorySnapshotBackend;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible. The time can
    /// be moved explicitly to exercise snapshot expiry.
    ///
    /// # Example
    ///
    /// ```
    /// use eventloom_testing::mocks::FixedClock;
    /// use eventloom_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug)]
    pub struct FixedClock {
        time: std::sync::Mutex<DateTime<Utc>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: std::sync::Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
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
}

/// Test helpers and utilities.
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a `tracing` subscriber for test output.
    ///
    /// Honours `RUST_LOG`, defaulting to debug output from the runtime and
    /// projections crates. Safe to call from
    /// every test; only the first call installs anything.
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("eventloom_runtime=debug,eventloom_projections=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use mocks::{
    FixedClock, InMemoryEventBus, InMemoryEventStore, InMemorySnapshotBackend,
    RecordingProjection, test_clock,
};
