//! # Eventloom Runtime
//!
//! Runtime implementation of the eventloom event-sourcing engine.
//!
//! This crate wires the traits of `eventloom-core` into a working write
//! path and the read path that backs it.
//!
//! ## Core Components
//!
//! - **Engine**: composition root; hydrates, handles, appends, snapshots and publishes
//! - **Aggregate State Loader**: snapshot plus replay, the canonical read path
//! - **Snapshot Store**: policy-driven, failure-absorbing snapshot persistence
//! - **Completion Tracker**: lets callers await the fan-out of one command
//!
//! ## Example
//!
//! ```ignore
//! use eventloom_runtime::{Engine, EngineConfig};
//!
//! let engine = Engine::new(event_store, snapshot_backend, event_bus, EngineConfig::default());
//! engine.start().await?;
//!
//! // Send a command
//! let result = engine.send::<BankAccount>(&command).await?;
//!
//! // Read state
//! let state = engine.get_state::<BankAccount>(&tenant, &account_id).await?;
//! ```

use eventloom_core::codec::Codec;
use eventloom_core::snapshot::SnapshotCreationPolicy;
use serde::Deserialize;
use std::time::Duration;

/// Command sequence completion tracking
pub mod completion;

/// The engine and its start flag
pub mod engine;

/// Aggregate state loading (snapshot + replay)
pub mod loader;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

/// Policy-driven snapshot store
pub mod snapshot_store;

/// Error types for the engine
pub mod error {
    use crate::completion::CompletionError;
    use eventloom_core::aggregate::AggregateError;
    use eventloom_core::event_bus::EventBusError;
    use eventloom_core::event_store::EventStoreError;
    use eventloom_core::identity::SequenceId;
    use std::time::Duration;
    use thiserror::Error;

    /// Errors that can occur during engine operations.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum EngineError {
        /// The engine has not finished `start()`.
        #[error("Engine has not been started")]
        NotStarted,

        /// The event store failed, or the append lost a concurrent write.
        ///
        /// Check [`EngineError::is_retryable`] before re-sending.
        #[error(transparent)]
        Store(#[from] EventStoreError),

        /// The aggregate could not be hydrated or could not explain an event.
        ///
        /// The log and the code disagree; retrying will not help.
        #[error(transparent)]
        Aggregate(#[from] AggregateError),

        /// The events were committed but could not be published.
        #[error("Events committed but not published: {0}")]
        Bus(#[from] EventBusError),

        /// Subscribers did not finish the command's events in time.
        ///
        /// The events are committed; only their downstream handling is late.
        #[error("Sequence {sequence_id} was not fully handled within {timeout:?}")]
        PublicationTimeout {
            /// Sequence that was awaited.
            sequence_id: SequenceId,
            /// How long the caller waited.
            timeout: Duration,
        },
    }

    impl EngineError {
        /// Whether re-hydrating and re-sending the command may succeed.
        ///
        /// True only for optimistic concurrency conflicts.
        #[must_use]
        pub const fn is_retryable(&self) -> bool {
            matches!(self, Self::Store(error) if error.is_conflict())
        }

        /// Whether this is a publication timeout.
        #[must_use]
        pub const fn is_timeout(&self) -> bool {
            matches!(self, Self::PublicationTimeout { .. })
        }
    }

    impl From<CompletionError> for EngineError {
        fn from(error: CompletionError) -> Self {
            match error {
                CompletionError::PublicationTimeout {
                    sequence_id,
                    timeout,
                } => Self::PublicationTimeout {
                    sequence_id,
                    timeout,
                },
            }
        }
    }
}

pub use completion::{CompletionError, CompletionTracker, SequenceStatus};
pub use engine::{Engine, EngineStatus};
pub use error::EngineError;
pub use loader::AggregateStateLoader;
pub use retry::RetryPolicy;
pub use snapshot_store::{SaveOutcome, SnapshotStore};

/// Configuration for [`Engine`] instances.
///
/// Deserializable so composition roots can load it from a file; missing
/// fields take their defaults.
///
/// # Example
///
/// ```
/// use eventloom_core::snapshot::SnapshotCreationPolicy;
/// use eventloom_runtime::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::default()
///     .with_snapshot_policy(SnapshotCreationPolicy::threshold(50))
///     .with_publication_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.rebuild_batch_size, 500);
/// assert!(config.use_snapshots);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// When snapshots are persisted and how long they stay valid
    pub snapshot_policy: SnapshotCreationPolicy,
    /// Codec for event payloads and snapshot state
    pub codec: Codec,
    /// Default batch size for views rebuilds
    pub rebuild_batch_size: usize,
    /// Default wait for `send_and_wait`
    pub publication_timeout: Duration,
    /// Whether the read path consults and writes snapshots
    pub use_snapshots: bool,
    /// Default policy for caller-side retries
    pub retry_policy: RetryPolicy,
}

impl EngineConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub const fn new(
        snapshot_policy: SnapshotCreationPolicy,
        codec: Codec,
        rebuild_batch_size: usize,
        publication_timeout: Duration,
        use_snapshots: bool,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            snapshot_policy,
            codec,
            rebuild_batch_size,
            publication_timeout,
            use_snapshots,
            retry_policy,
        }
    }

    /// Set the snapshot creation policy
    #[must_use]
    pub const fn with_snapshot_policy(mut self, policy: SnapshotCreationPolicy) -> Self {
        self.snapshot_policy = policy;
        self
    }

    /// Set the payload codec
    #[must_use]
    pub const fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the default rebuild batch size
    #[must_use]
    pub const fn with_rebuild_batch_size(mut self, batch_size: usize) -> Self {
        self.rebuild_batch_size = batch_size;
        self
    }

    /// Set the default publication timeout
    #[must_use]
    pub const fn with_publication_timeout(mut self, timeout: Duration) -> Self {
        self.publication_timeout = timeout;
        self
    }

    /// Enable or disable snapshots
    #[must_use]
    pub const fn with_snapshots(mut self, enabled: bool) -> Self {
        self.use_snapshots = enabled;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_policy: SnapshotCreationPolicy::default(),
            codec: Codec::default(),
            rebuild_batch_size: 500,
            publication_timeout: Duration::from_secs(30),
            use_snapshots: true,
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventloom_core::event_store::EventStoreError;
    use eventloom_core::identity::SequenceId;
    use eventloom_core::stream::{StreamId, Version};

    mod config_tests {
        use super::*;

        #[test]
        fn defaults() {
            let config = EngineConfig::default();
            assert_eq!(config.codec, Codec::Bincode);
            assert_eq!(config.rebuild_batch_size, 500);
            assert_eq!(config.publication_timeout, Duration::from_secs(30));
            assert!(config.use_snapshots);
            assert_eq!(config.snapshot_policy, SnapshotCreationPolicy::every_commit());
        }

        #[test]
        #[allow(clippy::expect_used)] // Panics: Test will fail if deserialization fails
        fn partial_config_deserializes() {
            let config: EngineConfig = serde_json::from_str(
                r#"{"codec":"json","use_snapshots":false,"snapshot_policy":{"behaviour":"threshold_commit","commit_threshold":25}}"#,
            )
            .expect("valid config");
            assert_eq!(config.codec, Codec::Json);
            assert!(!config.use_snapshots);
            assert_eq!(config.snapshot_policy, SnapshotCreationPolicy::threshold(25));
            assert_eq!(config.rebuild_batch_size, 500);
        }

        #[test]
        fn builders_override_fields() {
            let config = EngineConfig::default()
                .with_codec(Codec::Json)
                .with_rebuild_batch_size(64)
                .with_snapshots(false);
            assert_eq!(config.codec, Codec::Json);
            assert_eq!(config.rebuild_batch_size, 64);
            assert!(!config.use_snapshots);
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn only_conflicts_are_retryable() {
            let conflict = EngineError::Store(EventStoreError::ConcurrencyConflict {
                stream_id: StreamId::new("seq-1"),
                expected: Version::new(0),
                actual: Version::new(3),
            });
            assert!(conflict.is_retryable());
            assert!(!conflict.is_timeout());

            assert!(!EngineError::Store(EventStoreError::Backend("down".into())).is_retryable());
            assert!(!EngineError::NotStarted.is_retryable());
        }

        #[test]
        fn completion_timeout_maps_to_engine_timeout() {
            let sequence_id = SequenceId::generate();
            let error: EngineError = CompletionError::PublicationTimeout {
                sequence_id,
                timeout: Duration::from_millis(5),
            }
            .into();
            assert!(error.is_timeout());
            assert!(!error.is_retryable());
        }
    }
}
