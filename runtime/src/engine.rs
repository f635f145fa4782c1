//! The engine: composition root for the write path.
//!
//! An [`Engine`] owns the event store, the snapshot store, the event bus and
//! the completion tracker, and runs commands through them:
//!
//! ```text
//! Command → hydrate (snapshot + replay) → handle → append (expected version)
//!         → snapshot (best effort) → mark started → publish → completion
//! ```
//!
//! Engines are passed explicitly. There is no process-wide default engine.
//!
//! # Example
//!
//! ```ignore
//! let engine = Engine::new(event_store, snapshot_backend, event_bus, EngineConfig::default());
//! engine.start().await?;
//!
//! let command = CommandEnvelope::new(account_id, AccountCommand::Deposit { amount: 50 });
//! let result = engine.send_and_wait::<BankAccount>(&command, None).await?;
//! assert!(result.has_changes());
//! ```

use crate::EngineConfig;
use crate::completion::CompletionTracker;
use crate::error::EngineError;
use crate::loader::AggregateStateLoader;
use crate::metrics::{CommandMetrics, EventStoreMetrics};
use crate::retry::{RetryPolicy, retry_if};
use crate::snapshot_store::SnapshotStore;
use eventloom_core::aggregate::AggregateRoot;
use eventloom_core::command::{CommandEnvelope, CommandExecutionResult};
use eventloom_core::environment::Clock;
use eventloom_core::event::EventEnvelope;
use eventloom_core::event_bus::EventBus;
use eventloom_core::event_store::{EventStore, append_envelopes};
use eventloom_core::snapshot::{Snapshot, SnapshotBackend};
use eventloom_core::stream::{StreamId, TenantId, Version};
use eventloom_core::type_registry::AnyEnvelope;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared "has the engine finished initialization" flag.
///
/// Cloned into components, such as the views rebuilder, that must refuse to
/// run before [`Engine::start`] completes.
#[derive(Clone, Debug, Default)]
pub struct EngineStatus(Arc<AtomicBool>);

impl EngineStatus {
    /// A status that has not started.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether initialization has completed.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn mark_started(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Event-sourcing engine.
pub struct Engine {
    events: Arc<dyn EventStore>,
    snapshots: SnapshotStore,
    bus: Arc<dyn EventBus>,
    completion: Arc<CompletionTracker>,
    config: EngineConfig,
    status: EngineStatus,
}

impl Engine {
    /// Create an engine. Call [`Engine::start`] before sending commands.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotBackend>,
        bus: Arc<dyn EventBus>,
        config: EngineConfig,
    ) -> Self {
        Self {
            snapshots: SnapshotStore::new(snapshots, config.snapshot_policy, config.codec),
            events,
            bus,
            completion: Arc::new(CompletionTracker::new()),
            config,
            status: EngineStatus::new(),
        }
    }

    /// Share `tracker` with the event bus that reports completions.
    #[must_use]
    pub fn with_completion_tracker(mut self, tracker: Arc<CompletionTracker>) -> Self {
        self.completion = tracker;
        self
    }

    /// Use `clock` for snapshot timestamps and expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.snapshots = self.snapshots.with_clock(clock);
        self
    }

    /// Initialize the event store schema and mark the engine started.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if schema initialization fails.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.events.initialize_schema().await?;
        self.status.mark_started();
        tracing::info!(
            codec = self.config.codec.name(),
            snapshots = self.config.use_snapshots,
            "Engine started"
        );
        Ok(())
    }

    /// Shared start flag.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        self.status.clone()
    }

    /// The event store.
    #[must_use]
    pub fn event_store(&self) -> Arc<dyn EventStore> {
        Arc::clone(&self.events)
    }

    /// The event bus.
    #[must_use]
    pub fn event_bus(&self) -> Arc<dyn EventBus> {
        Arc::clone(&self.bus)
    }

    /// The snapshot store.
    #[must_use]
    pub const fn snapshot_store(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// The completion tracker.
    #[must_use]
    pub fn completion_tracker(&self) -> Arc<CompletionTracker> {
        Arc::clone(&self.completion)
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn ensure_started(&self) -> Result<(), EngineError> {
        if self.status.is_started() {
            Ok(())
        } else {
            Err(EngineError::NotStarted)
        }
    }

    /// State loader for aggregate type `A`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Aggregate`] if `A`'s type binding is invalid.
    pub fn loader<A: AggregateRoot>(&self) -> Result<AggregateStateLoader<A>, EngineError> {
        Ok(AggregateStateLoader::new(
            Arc::clone(&self.events),
            self.snapshots.clone(),
            self.config.codec,
        )?)
    }

    /// Current state of aggregate `id`.
    ///
    /// # Errors
    ///
    /// See [`AggregateStateLoader::load`].
    pub async fn get_state<A: AggregateRoot>(&self, tenant: &TenantId, id: &A::Id) -> Result<A::State, EngineError> {
        self.ensure_started()?;
        self.loader::<A>()?
            .get_state(tenant, id, self.config.use_snapshots)
            .await
    }

    /// Handle one command.
    ///
    /// Concurrency conflicts are returned to the caller, never retried here.
    /// The returned result carries the stream version after the append.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotStarted`]: [`Engine::start`] has not completed
    /// - [`EngineError::Store`]: the append lost a race, or the store failed
    /// - [`EngineError::Aggregate`]: the log could not be replayed
    /// - [`EngineError::Bus`]: the events were committed but publication failed
    pub async fn send<A: AggregateRoot>(
        &self,
        command: &CommandEnvelope<A::Id, A::Command>,
    ) -> Result<CommandExecutionResult, EngineError> {
        self.ensure_started()?;
        let tenant = command.tenant_id();
        let mut aggregate = self
            .loader::<A>()?
            .load(tenant, command.aggregate_id(), self.config.use_snapshots)
            .await?;

        let result = aggregate.execute(command)?;
        if !result.has_changes() {
            let outcome = if result.accepted() { "unchanged" } else { "rejected" };
            CommandMetrics::record(outcome);
            tracing::debug!(
                stream_id = %aggregate.stream_id(),
                command_id = %command.command_id(),
                outcome,
                "Command produced no events"
            );
            return Ok(result);
        }

        let stream_id = aggregate.stream_id().clone();
        let expected = aggregate.expected_version();
        let events = aggregate.take_uncommitted();

        let started = Instant::now();
        let appended = append_envelopes::<A>(
            self.events.as_ref(),
            tenant.clone(),
            stream_id.clone(),
            expected,
            &events,
            self.config.codec,
        )
        .await;

        let new_version = match appended {
            Ok(appended) => appended.new_version,
            Err(error) => {
                if error.is_conflict() {
                    EventStoreMetrics::record_conflict();
                    CommandMetrics::record("conflict");
                    tracing::warn!(%stream_id, %expected, %error, "Append lost a concurrent write");
                } else {
                    CommandMetrics::record("failed");
                    tracing::error!(%stream_id, %error, "Append failed");
                }
                return Err(error.into());
            },
        };
        EventStoreMetrics::record_append(events.len(), started.elapsed());
        CommandMetrics::record("changed");
        tracing::debug!(%stream_id, version = %new_version, events = events.len(), "Events appended");

        if self.config.use_snapshots {
            self.save_snapshot::<A>(tenant, stream_id, aggregate.into_state(), new_version)
                .await;
        }

        self.publish::<A>(events.into_vec()).await?;
        Ok(result.at_version(new_version))
    }

    async fn save_snapshot<A: AggregateRoot>(
        &self,
        tenant: &TenantId,
        stream_id: StreamId,
        state: A::State,
        version: Version,
    ) {
        let snapshot = Snapshot::of(stream_id, state, version);
        self.snapshots.save::<A>(tenant, &snapshot).await;
    }

    async fn publish<A: AggregateRoot>(&self, events: Vec<EventEnvelope<A::Id, A::Event>>) -> Result<(), EngineError> {
        let ids: Vec<_> = events
            .iter()
            .map(|event| (event.sequence_id(), event.event_id()))
            .collect();

        // Every event of the batch is outstanding before any can complete.
        for (sequence_id, event_id) in &ids {
            self.completion.mark_started(*sequence_id, *event_id);
        }

        let batch: Vec<AnyEnvelope> = events
            .into_iter()
            .map(|event| AnyEnvelope::erase::<A>(event, None))
            .collect();

        if let Err(error) = self.bus.publish(batch).await {
            tracing::error!(%error, "Publication failed after commit");
            for (sequence_id, event_id) in ids {
                self.completion.mark_completed(sequence_id, event_id);
            }
            return Err(error.into());
        }
        Ok(())
    }

    /// Handle one command and wait until its sequence has been fully handled
    /// by subscribers.
    ///
    /// `timeout` defaults to the configured publication timeout.
    ///
    /// # Errors
    ///
    /// Everything [`Engine::send`] returns, plus
    /// [`EngineError::PublicationTimeout`].
    pub async fn send_and_wait<A: AggregateRoot>(
        &self,
        command: &CommandEnvelope<A::Id, A::Command>,
        timeout: Option<Duration>,
    ) -> Result<CommandExecutionResult, EngineError> {
        let result = self.send::<A>(command).await?;
        if result.has_changes() {
            self.completion
                .await_completion(
                    command.sequence_id(),
                    timeout.unwrap_or(self.config.publication_timeout),
                )
                .await?;
        }
        Ok(result)
    }

    /// Handle one command, re-hydrating and retrying on concurrency
    /// conflicts according to `policy`.
    ///
    /// # Errors
    ///
    /// Everything [`Engine::send`] returns; a conflict only once the policy's
    /// retries are exhausted.
    pub async fn send_with_retry<A: AggregateRoot>(
        &self,
        command: &CommandEnvelope<A::Id, A::Command>,
        policy: &RetryPolicy,
    ) -> Result<CommandExecutionResult, EngineError> {
        retry_if(policy, || self.send::<A>(command), EngineError::is_retryable).await
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("started", &self.status.is_started())
            .field("config", &self.config)
            .field("completion", &self.completion)
            .finish_non_exhaustive()
    }
}
