//! Aggregate state loader: snapshot plus replay.
//!
//! The canonical read path for aggregate state:
//!
//! 1. optionally load a snapshot, defaulting to the mutator's default state
//!    at [`Version::NOT_CREATED`]
//! 2. load every event strictly after the snapshot's version up to the end
//!    of the stream
//! 3. seed a fresh mutator with the snapshot state and transition it through
//!    the events in version order
//!
//! The result is identical with and without snapshots.

use crate::error::EngineError;
use crate::snapshot_store::SnapshotStore;
use eventloom_core::aggregate::{Aggregate, AggregateError, AggregateRoot, bound_mutator};
use eventloom_core::codec::Codec;
use eventloom_core::event_store::{EventStore, load_events};
use eventloom_core::mutator::StateMutator;
use eventloom_core::stream::{TenantId, Version, VersionRange};
use std::sync::Arc;

/// Loads the current state of aggregates of type `A`.
pub struct AggregateStateLoader<A: AggregateRoot> {
    events: Arc<dyn EventStore>,
    snapshots: SnapshotStore,
    codec: Codec,
    prototype: StateMutator<A::State, A::Event>,
}

impl<A: AggregateRoot> AggregateStateLoader<A> {
    /// Create a loader for aggregate type `A`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::InvalidAggregateTypeBinding`] if `A` has no
    /// usable mutator.
    pub fn new(events: Arc<dyn EventStore>, snapshots: SnapshotStore, codec: Codec) -> Result<Self, AggregateError> {
        Ok(Self {
            events,
            snapshots,
            codec,
            prototype: bound_mutator::<A>()?,
        })
    }

    /// Hydrate an aggregate instance, ready to handle a command.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Store`]: the event store failed or a row did not translate
    /// - [`EngineError::Aggregate`]: a row was out of order or unhandled
    pub async fn load(&self, tenant: &TenantId, id: &A::Id, use_snapshot: bool) -> Result<Aggregate<A>, EngineError> {
        let stream_id = A::stream_id(id);
        let mut aggregate = Aggregate::<A>::hydrating(tenant.clone(), id.clone(), self.prototype.clone());

        let mut from = Version::NOT_CREATED;
        if use_snapshot {
            let snapshot = self.snapshots.load::<A>(tenant, &stream_id).await;
            if let Some(state) = snapshot.state {
                aggregate.restore(state, snapshot.version)?;
                from = snapshot.version;
            }
        }

        let stream = load_events::<A>(
            self.events.as_ref(),
            tenant.clone(),
            stream_id.clone(),
            VersionRange::after(from),
            self.codec,
        )
        .await?;

        for envelope in &stream.events {
            aggregate.replay(envelope)?;
        }
        aggregate.mark_ready();

        tracing::trace!(
            %stream_id,
            snapshot_version = %from,
            replayed = stream.events.len(),
            version = %aggregate.current_version(),
            "Aggregate hydrated"
        );
        Ok(aggregate)
    }

    /// Current state of aggregate `id`.
    ///
    /// # Errors
    ///
    /// See [`AggregateStateLoader::load`].
    pub async fn get_state(&self, tenant: &TenantId, id: &A::Id, use_snapshot: bool) -> Result<A::State, EngineError> {
        Ok(self.load(tenant, id, use_snapshot).await?.into_state())
    }
}

impl<A: AggregateRoot> Clone for AggregateStateLoader<A> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
            snapshots: self.snapshots.clone(),
            codec: self.codec,
            prototype: self.prototype.clone(),
        }
    }
}

impl<A: AggregateRoot> std::fmt::Debug for AggregateStateLoader<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateStateLoader")
            .field("aggregate", &A::AGGREGATE_TYPE)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}
