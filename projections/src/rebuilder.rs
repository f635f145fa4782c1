//! The views rebuilder.

use eventloom_core::codec::Codec;
use eventloom_core::event_bus::{EventBus, EventBusError};
use eventloom_core::event_store::{EventStore, EventStoreError, ReadOptions};
use eventloom_core::projection::{Projection, ProjectionError};
use eventloom_core::stream::{GlobalPosition, TenantId};
use eventloom_core::type_registry::{AnyEnvelope, TypeRegistry, TypeRegistryError};
use eventloom_runtime::engine::{Engine, EngineStatus};
use eventloom_runtime::metrics::RebuildMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;

/// Capacity of the progress channel. Slow subscribers miss old notifications.
const PROGRESS_BUFFER: usize = 64;

/// Errors that stop a rebuild.
///
/// Every variant is fatal for the current run. Batches published before the
/// failure stay published; progress notifications tell where to resume.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RebuildError {
    /// The engine has not finished `start()`.
    #[error("Views rebuild requested before the engine was started")]
    EngineNotStarted,

    /// Batch size zero.
    #[error("Rebuild batch size must be greater than zero")]
    InvalidBatchSize,

    /// Reading the global log failed.
    #[error("Reading the global log failed: {0}")]
    Store(#[from] EventStoreError),

    /// A row had no type binding or did not decode. The log and the code
    /// disagree, so the row is never skipped.
    #[error("Untranslatable event in the global log: {0}")]
    Translation(#[from] TypeRegistryError),

    /// The event bus refused a batch.
    #[error("Publishing a rebuild batch failed: {0}")]
    Publish(#[from] EventBusError),

    /// A projection could not be reset before replay.
    #[error("Projection {projection} could not be reset: {source}")]
    Reset {
        /// Name of the projection.
        projection: String,
        /// Underlying failure.
        #[source]
        source: ProjectionError,
    },
}

/// Notification raised after every published batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RebuildProgress {
    /// Tenant being rebuilt.
    pub tenant: TenantId,
    /// 1-based number of this batch within the run.
    pub batch: usize,
    /// Events in this batch.
    pub batch_size: usize,
    /// Events published so far in this run.
    pub events_processed: usize,
    /// Cursor before the batch (exclusive).
    pub start: GlobalPosition,
    /// Position of the batch's last event; the next batch starts after it.
    pub end: GlobalPosition,
    /// Time spent reading, decoding and publishing the batch.
    pub elapsed: Duration,
}

/// Outcome of a completed run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Non-empty batches published.
    pub batches: usize,
    /// Events published.
    pub events: usize,
    /// Position of the last published event, or the starting cursor if
    /// nothing followed it.
    pub final_position: GlobalPosition,
    /// Wall time of the run.
    pub elapsed: Duration,
}

/// Replays a tenant's global log into the event bus.
///
/// Single-flight: two rebuilds of the same views must not run concurrently.
/// Callers serialize them.
pub struct ViewsRebuilder {
    events: Arc<dyn EventStore>,
    bus: Arc<dyn EventBus>,
    registry: Arc<TypeRegistry>,
    codec: Codec,
    status: EngineStatus,
    projections: Vec<Arc<dyn Projection>>,
    progress: broadcast::Sender<RebuildProgress>,
}

impl ViewsRebuilder {
    /// Create a rebuilder over explicit collaborators.
    ///
    /// `status` gates every run: rebuilds fail until it reports started.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        bus: Arc<dyn EventBus>,
        registry: Arc<TypeRegistry>,
        codec: Codec,
        status: EngineStatus,
    ) -> Self {
        let (progress, _) = broadcast::channel(PROGRESS_BUFFER);
        Self {
            events,
            bus,
            registry,
            codec,
            status,
            projections: Vec::new(),
            progress,
        }
    }

    /// Create a rebuilder sharing `engine`'s store, bus, codec and start flag.
    #[must_use]
    pub fn for_engine(engine: &Engine, registry: Arc<TypeRegistry>) -> Self {
        Self::new(
            engine.event_store(),
            engine.event_bus(),
            registry,
            engine.config().codec,
            engine.status(),
        )
    }

    /// Reset these projections before a rebuild that starts at
    /// [`GlobalPosition::BEGIN`]. Resumed runs never reset.
    #[must_use]
    pub fn with_reset(mut self, projections: Vec<Arc<dyn Projection>>) -> Self {
        self.projections = projections;
        self
    }

    /// Subscribe to progress notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RebuildProgress> {
        self.progress.subscribe()
    }

    /// Rebuild the single-tenant partition from the beginning.
    ///
    /// # Errors
    ///
    /// See [`ViewsRebuilder::rebuild_from`].
    pub async fn rebuild(&self, batch_size: usize) -> Result<RebuildSummary, RebuildError> {
        self.rebuild_from(&TenantId::empty(), GlobalPosition::BEGIN, batch_size)
            .await
    }

    /// Rebuild one tenant from the beginning.
    ///
    /// # Errors
    ///
    /// See [`ViewsRebuilder::rebuild_from`].
    pub async fn rebuild_tenant(&self, tenant: &TenantId, batch_size: usize) -> Result<RebuildSummary, RebuildError> {
        self.rebuild_from(tenant, GlobalPosition::BEGIN, batch_size)
            .await
    }

    /// Republish every event of `tenant` strictly after `from`.
    ///
    /// Reads batches of at most `batch_size` rows until a read comes back
    /// empty. Each batch is fully decoded before any of it is published.
    ///
    /// # Errors
    ///
    /// - [`RebuildError::EngineNotStarted`]: the engine has not started
    /// - [`RebuildError::InvalidBatchSize`]: `batch_size` is zero
    /// - [`RebuildError::Reset`]: a projection could not be reset
    /// - [`RebuildError::Store`]: a log read failed
    /// - [`RebuildError::Translation`]: a row could not be decoded
    /// - [`RebuildError::Publish`]: the bus refused a batch
    pub async fn rebuild_from(
        &self,
        tenant: &TenantId,
        from: GlobalPosition,
        batch_size: usize,
    ) -> Result<RebuildSummary, RebuildError> {
        if !self.status.is_started() {
            return Err(RebuildError::EngineNotStarted);
        }
        if batch_size == 0 {
            return Err(RebuildError::InvalidBatchSize);
        }

        tracing::info!(%tenant, %from, batch_size, "Views rebuild started");
        if from == GlobalPosition::BEGIN {
            self.reset_projections().await?;
        }

        let started = Instant::now();
        let mut cursor = from;
        let mut batches = 0;
        let mut events = 0;

        loop {
            let batch_started = Instant::now();
            let slice = self
                .events
                .load_global_log(
                    tenant.clone(),
                    ReadOptions::forward_after(cursor).with_max_count(batch_size),
                )
                .await?;

            let Some(end) = slice.last_position else {
                break;
            };

            let envelopes = slice
                .events
                .iter()
                .map(|row| self.registry.decode(row, self.codec))
                .collect::<Result<Vec<AnyEnvelope>, _>>()?;
            let published = envelopes.len();
            self.bus.publish(envelopes).await?;

            batches += 1;
            events += published;
            let progress = RebuildProgress {
                tenant: tenant.clone(),
                batch: batches,
                batch_size: published,
                events_processed: events,
                start: cursor,
                end,
                elapsed: batch_started.elapsed(),
            };
            cursor = end;

            RebuildMetrics::record_batch(published);
            tracing::info!(
                %tenant,
                batch = progress.batch,
                batch_size = progress.batch_size,
                events_processed = progress.events_processed,
                start = %progress.start,
                end = %progress.end,
                elapsed_ms = progress.elapsed.as_millis(),
                "Rebuild batch published"
            );
            // No subscribers is fine.
            let _ = self.progress.send(progress);
        }

        let summary = RebuildSummary {
            batches,
            events,
            final_position: cursor,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            %tenant,
            batches = summary.batches,
            events = summary.events,
            final_position = %summary.final_position,
            elapsed_ms = summary.elapsed.as_millis(),
            "Views rebuild completed"
        );
        Ok(summary)
    }

    async fn reset_projections(&self) -> Result<(), RebuildError> {
        for projection in &self.projections {
            projection
                .reset()
                .await
                .map_err(|source| RebuildError::Reset {
                    projection: projection.name().to_string(),
                    source,
                })?;
            tracing::debug!(projection = projection.name(), "Projection reset");
        }
        Ok(())
    }
}

impl std::fmt::Debug for ViewsRebuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewsRebuilder")
            .field("registry", &self.registry)
            .field("codec", &self.codec)
            .field("started", &self.status.is_started())
            .field("projections", &self.projections.len())
            .finish_non_exhaustive()
    }
}
