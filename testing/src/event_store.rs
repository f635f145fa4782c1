//! In-memory event store.

use eventloom_core::event::{RecordedEvent, SerializedEvent};
use eventloom_core::event_store::{
    AppendResult, EventStore, EventStoreError, GlobalLogSlice, ReadDirection, ReadOptions,
    RecordedStream, StoreFuture,
};
use eventloom_core::stream::{GlobalPosition, StreamId, TenantId, Version, VersionRange};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct TenantLog {
    streams: HashMap<StreamId, Vec<RecordedEvent>>,
    log: Vec<RecordedEvent>,
}

impl TenantLog {
    fn stream_version(&self, stream_id: &StreamId) -> Version {
        self.streams
            .get(stream_id)
            .and_then(|events| events.last())
            .map_or(Version::NOT_CREATED, |event| event.version)
    }
}

/// In-memory event store for fast, deterministic testing.
///
/// One lock guards every tenant, so the expected-version check and the
/// append are a single atomic step. Global positions are dense per tenant
/// and start at 1.
///
/// # Example
///
/// ```
/// use eventloom_core::event_store::EventStore;
/// use eventloom_core::stream::{StreamId, TenantId, VersionRange};
/// use eventloom_testing::InMemoryEventStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = InMemoryEventStore::new();
/// let stream = store
///     .load_stream(TenantId::empty(), StreamId::new("seq-1"), VersionRange::all())
///     .await
///     .unwrap();
/// assert!(stream.events.is_empty());
/// # }
/// ```
#[derive(Default)]
pub struct InMemoryEventStore {
    tenants: Mutex<HashMap<TenantId, TenantLog>>,
    unavailable: AtomicBool,
    schema_initializations: AtomicUsize,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tenants(&self) -> MutexGuard<'_, HashMap<TenantId, TenantLog>> {
        self.tenants.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), EventStoreError> {
        if self.unavailable.load(Ordering::Acquire) {
            Err(EventStoreError::Backend("in-memory store is unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    /// Make every operation fail with a backend error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// How many times `initialize_schema` was called.
    #[must_use]
    pub fn schema_initializations(&self) -> usize {
        self.schema_initializations.load(Ordering::Acquire)
    }

    /// Every row of a tenant's log, in position order.
    #[must_use]
    pub fn global_log(&self, tenant: &TenantId) -> Vec<RecordedEvent> {
        self.tenants()
            .get(tenant)
            .map(|log| log.log.clone())
            .unwrap_or_default()
    }

    /// Current version of a stream.
    #[must_use]
    pub fn stream_version(&self, tenant: &TenantId, stream_id: &StreamId) -> Version {
        self.tenants()
            .get(tenant)
            .map_or(Version::NOT_CREATED, |log| log.stream_version(stream_id))
    }

    /// Total number of rows across every tenant.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tenants().values().map(|log| log.log.len()).sum()
    }

    /// Whether no tenant holds any row.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventStore for InMemoryEventStore {
    fn initialize_schema(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_available()?;
            self.schema_initializations.fetch_add(1, Ordering::AcqRel);
            Ok(())
        })
    }

    fn stream_exists(&self, tenant: TenantId, stream_id: StreamId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self
                .tenants()
                .get(&tenant)
                .and_then(|log| log.streams.get(&stream_id))
                .is_some_and(|events| !events.is_empty()))
        })
    }

    fn append(
        &self,
        tenant: TenantId,
        stream_id: StreamId,
        expected_version: Version,
        events: Vec<SerializedEvent>,
    ) -> StoreFuture<'_, AppendResult> {
        Box::pin(async move {
            if events.is_empty() {
                return Err(EventStoreError::InvalidArgument(format!(
                    "no events to append to {stream_id}"
                )));
            }
            self.check_available()?;

            let mut tenants = self.tenants();
            let log = tenants.entry(tenant).or_default();

            let actual = log.stream_version(&stream_id);
            if actual != expected_version {
                return Err(EventStoreError::ConcurrencyConflict {
                    stream_id,
                    expected: expected_version,
                    actual,
                });
            }

            let mut version = expected_version;
            let mut position = log.log.last().map_or(GlobalPosition::BEGIN, |row| row.position);
            let mut rows = Vec::with_capacity(events.len());
            for event in events {
                version = version.next();
                position = position.next();
                rows.push(RecordedEvent {
                    stream_id: stream_id.clone(),
                    version,
                    position,
                    event,
                });
            }

            log.log.extend(rows.iter().cloned());
            log.streams.entry(stream_id.clone()).or_default().extend(rows);

            tracing::trace!(%stream_id, %version, %position, "In-memory append committed");
            Ok(AppendResult::committed(version))
        })
    }

    fn load_stream(
        &self,
        tenant: TenantId,
        stream_id: StreamId,
        range: VersionRange,
    ) -> StoreFuture<'_, RecordedStream> {
        Box::pin(async move {
            self.check_available()?;
            let tenants = self.tenants();
            let stored = tenants
                .get(&tenant)
                .and_then(|log| log.streams.get(&stream_id))
                .map_or(&[][..], Vec::as_slice);

            let events: Vec<RecordedEvent> = stored
                .iter()
                .filter(|row| range.contains(row.version))
                .cloned()
                .collect();
            let version = events.last().map_or(range.after, |row| row.version);
            let last_stored = stored.last().map_or(Version::NOT_CREATED, |row| row.version);

            Ok(RecordedStream {
                stream_id,
                events,
                version,
                reached_end: version >= last_stored,
            })
        })
    }

    fn load_global_log(&self, tenant: TenantId, options: ReadOptions) -> StoreFuture<'_, GlobalLogSlice> {
        Box::pin(async move {
            if options.max_count == Some(0) {
                return Err(EventStoreError::InvalidArgument(
                    "max_count must be greater than zero".to_string(),
                ));
            }
            self.check_available()?;

            let tenants = self.tenants();
            let Some(log) = tenants.get(&tenant) else {
                return Ok(GlobalLogSlice {
                    reached_end: true,
                    ..GlobalLogSlice::default()
                });
            };

            let admitted = |row: &&RecordedEvent| options.admits(row.position, &row.stream_id);
            let mut matching: Vec<RecordedEvent> = match options.direction {
                ReadDirection::Forward => log.log.iter().filter(admitted).cloned().collect(),
                ReadDirection::Backward => log.log.iter().rev().filter(admitted).cloned().collect(),
            };

            let limit = options.max_count.unwrap_or(usize::MAX);
            let reached_end = matching.len() <= limit;
            matching.truncate(limit);

            Ok(GlobalLogSlice {
                last_position: matching.last().map(|row| row.position),
                events: matching,
                reached_end,
            })
        })
    }
}

impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("events", &self.len())
            .field("unavailable", &self.unavailable.load(Ordering::Relaxed))
            .finish()
    }
}
