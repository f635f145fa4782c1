//! Policy-driven snapshot store.
//!
//! Wraps a [`SnapshotBackend`] with the [`SnapshotCreationPolicy`], the
//! payload [`Codec`] and a clock. Both directions are forgiving:
//!
//! - `load` reports any missing, expired, unreadable or foreign snapshot as
//!   absent, so the caller falls back to a full replay
//! - `save` never fails; backend and codec errors are logged and counted
//!
//! The event log stays authoritative, so neither path can produce wrong state.

use crate::metrics::SnapshotMetrics;
use eventloom_core::aggregate::AggregateRoot;
use eventloom_core::codec::Codec;
use eventloom_core::environment::{Clock, SystemClock};
use eventloom_core::snapshot::{Snapshot, SnapshotBackend, SnapshotCreationPolicy, StoredSnapshot};
use eventloom_core::stream::{StreamId, TenantId};
use std::sync::Arc;

/// What [`SnapshotStore::save`] did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The snapshot was persisted.
    Saved,
    /// The policy declined the version.
    Skipped,
    /// There was no state to save.
    NoState,
    /// Encoding or the backend failed; the failure was logged.
    Failed,
}

/// Snapshot store shared by the state loader and the engine.
#[derive(Clone)]
pub struct SnapshotStore {
    backend: Arc<dyn SnapshotBackend>,
    policy: SnapshotCreationPolicy,
    codec: Codec,
    clock: Arc<dyn Clock>,
}

impl SnapshotStore {
    /// Create a store over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn SnapshotBackend>, policy: SnapshotCreationPolicy, codec: Codec) -> Self {
        Self {
            backend,
            policy,
            codec,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for snapshot timestamps and expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The creation policy in force.
    #[must_use]
    pub const fn policy(&self) -> &SnapshotCreationPolicy {
        &self.policy
    }

    /// Load the latest usable snapshot of a stream of aggregate `A`.
    ///
    /// Never fails: anything unusable yields [`Snapshot::absent`].
    pub async fn load<A: AggregateRoot>(&self, tenant: &TenantId, stream_id: &StreamId) -> Snapshot<A::State> {
        let stored = match self.backend.load(tenant.clone(), stream_id.clone()).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return Snapshot::absent(stream_id.clone()),
            Err(error) => {
                SnapshotMetrics::record_failure();
                tracing::warn!(%tenant, %stream_id, %error, "Snapshot load failed, replaying from start");
                return Snapshot::absent(stream_id.clone());
            },
        };

        if stored.state_type != A::TYPE_TAG {
            SnapshotMetrics::record_failure();
            tracing::warn!(
                %stream_id,
                expected = %A::TYPE_TAG,
                found = %stored.state_type,
                "Snapshot belongs to another aggregate type, ignoring"
            );
            return Snapshot::absent(stream_id.clone());
        }

        if self.policy.is_expired(stored.taken_at, self.clock.now()) {
            tracing::debug!(%stream_id, taken_at = %stored.taken_at, "Snapshot expired, ignoring");
            return Snapshot::absent(stream_id.clone());
        }

        match self.codec.decode::<A::State>(&stored.data) {
            Ok(state) => {
                tracing::debug!(%stream_id, version = %stored.version, "Snapshot loaded");
                Snapshot::of(stream_id.clone(), state, stored.version)
            },
            Err(error) => {
                SnapshotMetrics::record_failure();
                tracing::warn!(%stream_id, %error, "Snapshot unreadable, replaying from start");
                Snapshot::absent(stream_id.clone())
            },
        }
    }

    /// Persist `snapshot` if the policy allows it.
    ///
    /// Best effort: failures are logged and reported as
    /// [`SaveOutcome::Failed`], never as errors.
    pub async fn save<A: AggregateRoot>(&self, tenant: &TenantId, snapshot: &Snapshot<A::State>) -> SaveOutcome {
        let Some(state) = snapshot.state.as_ref() else {
            tracing::debug!(stream_id = %snapshot.stream_id, "No state to snapshot");
            return SaveOutcome::NoState;
        };

        if !self.policy.should_persist(snapshot.version) {
            SnapshotMetrics::record_skipped();
            tracing::trace!(stream_id = %snapshot.stream_id, version = %snapshot.version, "Snapshot skipped by policy");
            return SaveOutcome::Skipped;
        }

        let data = match self.codec.encode(state) {
            Ok(data) => data,
            Err(error) => {
                SnapshotMetrics::record_failure();
                tracing::warn!(stream_id = %snapshot.stream_id, %error, "Snapshot encoding failed");
                return SaveOutcome::Failed;
            },
        };

        let stored = StoredSnapshot {
            stream_id: snapshot.stream_id.clone(),
            version: snapshot.version,
            state_type: A::TYPE_TAG,
            data,
            taken_at: self.clock.now(),
        };

        match self.backend.save(tenant.clone(), stored).await {
            Ok(()) => {
                SnapshotMetrics::record_saved();
                tracing::debug!(stream_id = %snapshot.stream_id, version = %snapshot.version, "Snapshot saved");
                SaveOutcome::Saved
            },
            Err(error) => {
                SnapshotMetrics::record_failure();
                tracing::warn!(stream_id = %snapshot.stream_id, %error, "Snapshot save failed");
                SaveOutcome::Failed
            },
        }
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("policy", &self.policy)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}
