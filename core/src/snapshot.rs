//! Snapshots: cached `(state, version)` pairs that shorten replay.
//!
//! The event log stays the source of truth. A snapshot is only ever an
//! optimization, so absence is a normal value ([`Snapshot::has_snapshot`]
//! false) and losing one degrades performance, never correctness.
//!
//! This module holds the storage-facing pieces: the creation policy, the
//! stored record and the [`SnapshotBackend`] trait. The policy-driven
//! `SnapshotStore` lives in `eventloom-runtime`.

use crate::stream::{StreamId, TenantId, Version};
use crate::type_registry::TypeTag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during snapshot operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// The backend failed.
    #[error("Snapshot backend error: {0}")]
    Backend(String),

    /// The stored state could not be encoded or decoded.
    #[error("Snapshot codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    /// The stored state belongs to a different aggregate type.
    #[error("Snapshot of {stream_id} holds {found}, expected {expected}")]
    TypeMismatch {
        /// Stream of the snapshot.
        stream_id: StreamId,
        /// Tag of the aggregate being loaded.
        expected: TypeTag,
        /// Tag stored with the snapshot.
        found: TypeTag,
    },
}

/// When the snapshot store persists a snapshot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotBehaviour {
    /// After every commit above the minimum version.
    #[default]
    EveryCommit,
    /// Only when the version is a multiple of the commit threshold.
    ThresholdCommit,
}

/// Governs whether a snapshot is persisted and how long it stays valid.
///
/// # Example
///
/// ```
/// use eventloom_core::snapshot::SnapshotCreationPolicy;
/// use eventloom_core::stream::Version;
///
/// let policy = SnapshotCreationPolicy::threshold(10);
/// let persisted: Vec<u64> = (1..=25)
///     .filter(|v| policy.should_persist(Version::new(*v)))
///     .collect();
/// assert_eq!(persisted, vec![10, 20]);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotCreationPolicy {
    /// Persistence behaviour.
    pub behaviour: SnapshotBehaviour,
    /// Threshold for [`SnapshotBehaviour::ThresholdCommit`].
    pub commit_threshold: u64,
    /// Versions at or below this are never persisted.
    pub min_aggregate_version: Version,
    /// Snapshots older than this are ignored on load.
    pub expire_after: Option<Duration>,
}

impl Default for SnapshotCreationPolicy {
    fn default() -> Self {
        Self {
            behaviour: SnapshotBehaviour::EveryCommit,
            commit_threshold: 10,
            min_aggregate_version: Version::NOT_CREATED,
            expire_after: None,
        }
    }
}

impl SnapshotCreationPolicy {
    /// Persist after every commit.
    #[must_use]
    pub fn every_commit() -> Self {
        Self::default()
    }

    /// Persist when the version is a multiple of `commit_threshold`.
    #[must_use]
    pub fn threshold(commit_threshold: u64) -> Self {
        Self {
            behaviour: SnapshotBehaviour::ThresholdCommit,
            commit_threshold,
            ..Self::default()
        }
    }

    /// Never persist at or below `version`.
    #[must_use]
    pub const fn with_min_version(mut self, version: Version) -> Self {
        self.min_aggregate_version = version;
        self
    }

    /// Ignore snapshots older than `ttl` on load.
    #[must_use]
    pub const fn with_expire_after(mut self, ttl: Duration) -> Self {
        self.expire_after = Some(ttl);
        self
    }

    /// Whether a snapshot at `version` should be persisted.
    ///
    /// `ThresholdCommit` checks `version % threshold == 0`, so a commit that
    /// jumps over a multiple (8 to 12 with threshold 10) skips a snapshot.
    /// A zero threshold never persists.
    #[must_use]
    pub const fn should_persist(&self, version: Version) -> bool {
        if version.value() <= self.min_aggregate_version.value() {
            return false;
        }
        match self.behaviour {
            SnapshotBehaviour::EveryCommit => true,
            SnapshotBehaviour::ThresholdCommit => {
                self.commit_threshold != 0 && version.value() % self.commit_threshold == 0
            },
        }
    }

    /// Whether a snapshot taken at `taken_at` has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, taken_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.expire_after.is_some_and(|ttl| {
            let age = now.signed_duration_since(taken_at);
            chrono::Duration::from_std(ttl).is_ok_and(|ttl| age > ttl)
        })
    }
}

/// A loaded snapshot, or its absence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot<S> {
    /// Stream of the snapshot.
    pub stream_id: StreamId,
    /// Cached state; `None` when no snapshot exists.
    pub state: Option<S>,
    /// Version the state was computed at; `NOT_CREATED` when absent.
    pub version: Version,
}

impl<S> Snapshot<S> {
    /// No snapshot exists for the stream.
    #[must_use]
    pub const fn absent(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            state: None,
            version: Version::NOT_CREATED,
        }
    }

    /// A snapshot of `state` at `version`.
    #[must_use]
    pub const fn of(stream_id: StreamId, state: S, version: Version) -> Self {
        Self {
            stream_id,
            state: Some(state),
            version,
        }
    }

    /// Whether a snapshot exists. Distinct from a snapshot at version 0.
    pub const fn has_snapshot(&self) -> bool {
        self.state.is_some()
    }
}

/// A snapshot as persisted by a backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    /// Stream of the snapshot.
    pub stream_id: StreamId,
    /// Version the state was computed at.
    pub version: Version,
    /// Aggregate type that owns the state.
    pub state_type: TypeTag,
    /// Codec-encoded state.
    pub data: Vec<u8>,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

/// Boxed future returned by [`SnapshotBackend`] methods.
pub type SnapshotFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SnapshotError>> + Send + 'a>>;

/// Storage for snapshots, keyed by `(tenant, stream)`.
///
/// Saving supersedes any earlier snapshot of the stream; records are never
/// edited in place.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the runtime can hold an
/// `Arc<dyn SnapshotBackend>`.
pub trait SnapshotBackend: Send + Sync {
    /// Load the latest snapshot of a stream, if any.
    ///
    /// # Errors
    ///
    /// - `Backend`: storage query failed. A missing snapshot is `Ok(None)`.
    fn load(&self, tenant: TenantId, stream_id: StreamId) -> SnapshotFuture<'_, Option<StoredSnapshot>>;

    /// Persist a snapshot, replacing the previous one.
    ///
    /// # Errors
    ///
    /// - `Backend`: storage write failed
    fn save(&self, tenant: TenantId, snapshot: StoredSnapshot) -> SnapshotFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    mod policy_tests {
        use super::*;

        #[test]
        fn every_commit_respects_min_version() {
            let policy = SnapshotCreationPolicy::every_commit().with_min_version(Version::new(3));
            assert!(!policy.should_persist(Version::new(3)));
            assert!(policy.should_persist(Version::new(4)));
            assert!(policy.should_persist(Version::new(17)));
        }

        #[test]
        fn threshold_persists_on_multiples_only() {
            let policy = SnapshotCreationPolicy::threshold(10);
            let persisted: Vec<u64> = (1..=25)
                .filter(|v| policy.should_persist(Version::new(*v)))
                .collect();
            assert_eq!(persisted, vec![10, 20]);
        }

        #[test]
        fn threshold_with_min_version() {
            let policy = SnapshotCreationPolicy::threshold(10).with_min_version(Version::new(10));
            assert!(!policy.should_persist(Version::new(10)));
            assert!(policy.should_persist(Version::new(20)));
        }

        #[test]
        fn zero_threshold_never_persists() {
            let policy = SnapshotCreationPolicy::threshold(0);
            assert!(!(1..50).any(|v| policy.should_persist(Version::new(v))));
        }

        #[test]
        fn version_zero_is_never_persisted() {
            assert!(!SnapshotCreationPolicy::every_commit().should_persist(Version::NOT_CREATED));
        }

        #[test]
        fn expiry() {
            let now = Utc::now();
            let policy = SnapshotCreationPolicy::default();
            assert!(!policy.is_expired(now - chrono::Duration::days(365), now));

            let policy = policy.with_expire_after(Duration::from_secs(60));
            assert!(!policy.is_expired(now - chrono::Duration::seconds(30), now));
            assert!(policy.is_expired(now - chrono::Duration::seconds(90), now));
        }

        #[test]
        #[allow(clippy::expect_used)] // Panics: Test will fail if deserialization fails
        fn deserializes_with_defaults() {
            let policy: SnapshotCreationPolicy =
                serde_json::from_str(r#"{"behaviour":"threshold_commit","commit_threshold":5}"#)
                    .expect("valid policy");
            assert_eq!(policy.behaviour, SnapshotBehaviour::ThresholdCommit);
            assert_eq!(policy.commit_threshold, 5);
            assert_eq!(policy.min_aggregate_version, Version::NOT_CREATED);
            assert_eq!(policy.expire_after, None);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn threshold_persists_exactly_the_multiples(
                threshold in 1_u64..50,
                min in 0_u64..100,
                version in 1_u64..10_000,
            ) {
                let policy = SnapshotCreationPolicy::threshold(threshold)
                    .with_min_version(Version::new(min));
                prop_assert_eq!(
                    policy.should_persist(Version::new(version)),
                    version > min && version % threshold == 0
                );
            }
        }
    }

    #[test]
    fn absent_snapshot_differs_from_version_zero() {
        let absent: Snapshot<u32> = Snapshot::absent(StreamId::new("cart-1"));
        let at_zero = Snapshot::of(StreamId::new("cart-1"), 0_u32, Version::NOT_CREATED);
        assert!(!absent.has_snapshot());
        assert!(at_zero.has_snapshot());
        assert_eq!(absent.version, at_zero.version);
    }
}
