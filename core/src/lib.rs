//! # Eventloom Core
//!
//! Core traits and types for the Eventloom event-sourcing engine.
//!
//! Eventloom reconstructs the current state of long-lived entities
//! ("aggregates") from an append-only log of immutable events, enforces
//! optimistic concurrency on writes, materializes snapshots to bound replay
//! cost, and replays the global log to feed read-model projections.
//!
//! ## Core Concepts
//!
//! - **Version / identity**: [`stream::Version`], [`stream::StreamId`],
//!   [`stream::TenantId`] and the correlation ids in [`identity`]
//! - **State mutator**: event-type keyed pure transitions ([`mutator`])
//! - **Aggregate**: consistency boundary turning commands into events ([`aggregate`])
//! - **Event store**: append-only log with optimistic concurrency ([`event_store`])
//! - **Snapshots**: cached state plus a creation policy ([`snapshot`])
//! - **Type registry**: compact type tags for global replay ([`type_registry`])
//! - **Event bus / projections**: fan-out to read models ([`event_bus`], [`projection`])
//!
//! The runtime pieces (state loader, snapshot store, completion tracker and
//! engine) live in `eventloom-runtime`.
//!
//! ## Architecture Principles
//!
//! - Command handling is pure computation over in-memory state
//! - The event log is the single source of truth
//! - Expected "not found" conditions are values, not errors
//! - Dependencies are passed explicitly; there is no global engine

pub mod aggregate;
pub mod codec;
pub mod command;
pub mod event;
pub mod event_bus;
pub mod event_store;
pub mod identity;
pub mod macros;
pub mod mutator;
pub mod projection;
pub mod snapshot;
pub mod stream;
pub mod type_registry;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

// Used by `uuid_identifier!` expansions in downstream crates.
#[doc(hidden)]
pub use serde;
#[doc(hidden)]
pub use uuid;

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// explicitly.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use eventloom_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = chrono::Utc::now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Copy, Clone, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
