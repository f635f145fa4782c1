//! Event store trait and related types for event sourcing.
//!
//! An event store is an append-only log partitioned by tenant and stream:
//!
//! - append a batch of events to one stream, atomically, if the stream is
//!   still at the expected version (optimistic concurrency)
//! - load a version range of one stream
//! - read the tenant's global log, across streams, in position order
//!
//! Backends deal only in raw rows ([`SerializedEvent`], [`RecordedEvent`]).
//! The typed helpers [`append_envelopes`] and [`load_events`] translate to
//! and from [`EventEnvelope`]s for a given aggregate type.
//!
//! # Implementations
//!
//! - `InMemoryEventStore` (in `eventloom-testing` crate): Fast, deterministic testing
//!
//! # Example
//!
//! ```no_run
//! use eventloom_core::event_store::{EventStore, EventStoreError};
//! use eventloom_core::stream::{StreamId, TenantId, Version, VersionRange};
//!
//! async fn example(store: &dyn EventStore) -> Result<(), EventStoreError> {
//!     let tenant = TenantId::empty();
//!     let stream_id = StreamId::new("cart-123");
//!
//!     // Append events with optimistic concurrency
//!     let events = vec![/* ... */];
//!     let result = store
//!         .append(tenant.clone(), stream_id.clone(), Version::NOT_CREATED, events)
//!         .await?;
//!
//!     // Load everything after version 0
//!     let stream = store.load_stream(tenant, stream_id, VersionRange::all()).await?;
//!     assert_eq!(stream.version, result.new_version);
//!     Ok(())
//! }
//! ```

use crate::aggregate::AggregateRoot;
use crate::codec::{Codec, CodecError};
use crate::event::{EventEnvelope, EventTranslationError, RecordedEvent, SerializedEvent};
use crate::stream::{GlobalPosition, StreamId, TenantId, Version, VersionRange};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`EventStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventStoreError>> + Send + 'a>>;

/// Errors that can occur during event store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: expected version doesn't match current version.
    ///
    /// Another writer committed to the stream after it was read. The caller
    /// may re-hydrate and retry; the store never retries on its own.
    #[error("Concurrency conflict on {stream_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream ID where the conflict occurred.
        stream_id: StreamId,
        /// The version we expected the stream to be at.
        expected: Version,
        /// The actual current version of the stream.
        actual: Version,
    },

    /// A precondition on the arguments failed; nothing was sent to the backend.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend failed.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] CodecError),

    /// A stored row could not be translated to the requested aggregate type.
    #[error("Translation error: {0}")]
    Translation(#[from] EventTranslationError),
}

impl EventStoreError {
    /// Whether this is an optimistic concurrency conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Result of a successful append.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AppendResult {
    /// Whether the batch was committed.
    pub accepted: bool,
    /// Stream version after the append.
    pub new_version: Version,
}

impl AppendResult {
    /// Batch committed at `new_version`.
    #[must_use]
    pub const fn committed(new_version: Version) -> Self {
        Self {
            accepted: true,
            new_version,
        }
    }
}

/// Raw rows of one stream range, as returned by a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedStream {
    /// Stream that was read.
    pub stream_id: StreamId,
    /// Rows in ascending version order.
    pub events: Vec<RecordedEvent>,
    /// Highest version covered by the read: the last row's version, or the
    /// range's lower bound when no row matched.
    pub version: Version,
    /// Whether no rows exist after the last returned one.
    pub reached_end: bool,
}

/// Typed events of one stream range.
#[derive(Clone, Debug, PartialEq)]
pub struct EventsStream<Id, E> {
    /// Stream that was read.
    pub stream_id: StreamId,
    /// Envelopes in ascending version order.
    pub events: Vec<EventEnvelope<Id, E>>,
    /// Highest version covered by the read.
    pub version: Version,
    /// Whether the read reached the physical end of the stream.
    pub reached_end: bool,
}

impl<Id, E> EventsStream<Id, E> {
    /// Whether the range held no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events in the range.
    pub fn len(&self) -> usize {
        self.events.len()
    }
}

/// Direction of a global log read.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ReadDirection {
    /// Ascending positions.
    #[default]
    Forward,
    /// Descending positions.
    Backward,
}

/// Options for reading a tenant's global log.
///
/// `from` is where the read starts in its direction and `to` where it
/// stops. `None` means the start (or end) of the log for that direction.
///
/// # Example
///
/// ```
/// use eventloom_core::event_store::ReadOptions;
/// use eventloom_core::stream::{GlobalPosition, StreamId};
///
/// // Next 100 cart events after position 500.
/// let options = ReadOptions::forward_after(GlobalPosition::new(500))
///     .with_stream_prefix("cart-")
///     .with_max_count(100);
///
/// assert!(options.admits(GlobalPosition::new(501), &StreamId::new("cart-1")));
/// assert!(!options.admits(GlobalPosition::new(500), &StreamId::new("cart-1")));
/// assert!(!options.admits(GlobalPosition::new(501), &StreamId::new("account-1")));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Read direction.
    pub direction: ReadDirection,
    /// Start bound.
    pub from: Option<GlobalPosition>,
    /// Whether `from` itself is included.
    pub from_inclusive: bool,
    /// Stop bound.
    pub to: Option<GlobalPosition>,
    /// Whether `to` itself is included.
    pub to_inclusive: bool,
    /// Only streams whose id starts with this prefix.
    pub stream_prefix: Option<String>,
    /// Maximum number of rows to return.
    pub max_count: Option<usize>,
}

impl ReadOptions {
    /// Forward read of the whole log.
    #[must_use]
    pub fn forward() -> Self {
        Self::default()
    }

    /// Forward read strictly after `position`.
    #[must_use]
    pub fn forward_after(position: GlobalPosition) -> Self {
        Self {
            from: Some(position),
            ..Self::default()
        }
    }

    /// Backward read from the end of the log.
    #[must_use]
    pub fn backward() -> Self {
        Self {
            direction: ReadDirection::Backward,
            ..Self::default()
        }
    }

    /// Include the `from` bound.
    #[must_use]
    pub fn inclusive_from(mut self) -> Self {
        self.from_inclusive = true;
        self
    }

    /// Stop at `to`, inclusive or not.
    #[must_use]
    pub fn until(mut self, to: GlobalPosition, inclusive: bool) -> Self {
        self.to = Some(to);
        self.to_inclusive = inclusive;
        self
    }

    /// Restrict to streams starting with `prefix`.
    #[must_use]
    pub fn with_stream_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.stream_prefix = Some(prefix.into());
        self
    }

    /// Return at most `max_count` rows.
    #[must_use]
    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = Some(max_count);
        self
    }

    /// Whether a row at `position` in `stream_id` matches the bounds and
    /// prefix filter. `max_count` is not considered.
    #[must_use]
    pub fn admits(&self, position: GlobalPosition, stream_id: &StreamId) -> bool {
        let (after_start, before_stop) = match self.direction {
            ReadDirection::Forward => (
                self.from
                    .is_none_or(|from| if self.from_inclusive { position >= from } else { position > from }),
                self.to
                    .is_none_or(|to| if self.to_inclusive { position <= to } else { position < to }),
            ),
            ReadDirection::Backward => (
                self.from
                    .is_none_or(|from| if self.from_inclusive { position <= from } else { position < from }),
                self.to
                    .is_none_or(|to| if self.to_inclusive { position >= to } else { position > to }),
            ),
        };
        let prefixed = self
            .stream_prefix
            .as_deref()
            .is_none_or(|prefix| stream_id.has_prefix(prefix));
        after_start && before_stop && prefixed
    }
}

/// A page of the global log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalLogSlice {
    /// Rows in the requested direction.
    pub events: Vec<RecordedEvent>,
    /// Position of the last returned row.
    pub last_position: Option<GlobalPosition>,
    /// Whether no further rows match the options.
    pub reached_end: bool,
}

/// Event store abstraction for storing and retrieving event streams.
///
/// All operations are scoped by tenant; the empty tenant is the
/// single-tenant partition.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be safely used in async contexts
/// and shared across threads.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn EventStore>`), which is how the
/// engine and the views rebuilder hold it.
pub trait EventStore: Send + Sync {
    /// Create whatever storage structures the backend needs. Idempotent.
    ///
    /// # Errors
    ///
    /// - `Backend`: storage could not be prepared
    fn initialize_schema(&self) -> StoreFuture<'_, ()>;

    /// Whether the stream has at least one event.
    ///
    /// # Errors
    ///
    /// - `Backend`: storage query failed
    fn stream_exists(&self, tenant: TenantId, stream_id: StreamId) -> StoreFuture<'_, bool>;

    /// Append events to a stream with optimistic concurrency control.
    ///
    /// Atomic: all events commit or none do. The stream must be at
    /// `expected_version` at the moment of commit; events receive consecutive
    /// versions starting at `expected_version + 1`. Of two concurrent callers
    /// with the same expected version exactly one wins.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: the stream moved; carries both versions
    /// - `InvalidArgument`: `events` is empty
    /// - `Backend`: storage failed
    fn append(
        &self,
        tenant: TenantId,
        stream_id: StreamId,
        expected_version: Version,
        events: Vec<SerializedEvent>,
    ) -> StoreFuture<'_, AppendResult>;

    /// Load the events of one stream with version in `range`, ascending.
    ///
    /// A stream with no events yields an empty result, not an error.
    ///
    /// # Errors
    ///
    /// - `Backend`: storage query failed
    fn load_stream(
        &self,
        tenant: TenantId,
        stream_id: StreamId,
        range: VersionRange,
    ) -> StoreFuture<'_, RecordedStream>;

    /// Read the tenant's global log.
    ///
    /// Positions increase monotonically across all streams of the tenant and
    /// are independent from stream versions.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: `max_count` is zero
    /// - `Backend`: storage query failed
    fn load_global_log(&self, tenant: TenantId, options: ReadOptions) -> StoreFuture<'_, GlobalLogSlice>;
}

/// Append the uncommitted envelopes of aggregate `A`.
///
/// Checks preconditions before any I/O: the batch is non-empty and its
/// versions run consecutively from `expected_version + 1`.
///
/// # Errors
///
/// - `InvalidArgument`: a precondition failed
/// - `Serialization`: a payload could not be encoded
/// - any error of [`EventStore::append`]
pub async fn append_envelopes<A: AggregateRoot>(
    store: &dyn EventStore,
    tenant: TenantId,
    stream_id: StreamId,
    expected_version: Version,
    envelopes: &[EventEnvelope<A::Id, A::Event>],
    codec: Codec,
) -> Result<AppendResult, EventStoreError> {
    if envelopes.is_empty() {
        return Err(EventStoreError::InvalidArgument(format!(
            "no events to append to {stream_id}"
        )));
    }
    let mut serialized = Vec::with_capacity(envelopes.len());
    for (offset, envelope) in (1_u64..).zip(envelopes) {
        if envelope.version() != expected_version + offset {
            return Err(EventStoreError::InvalidArgument(format!(
                "event {} of {stream_id} is at {}, expected {}",
                offset,
                envelope.version(),
                expected_version + offset
            )));
        }
        serialized.push(envelope.to_serialized(codec, A::TYPE_TAG)?);
    }
    store.append(tenant, stream_id, expected_version, serialized).await
}

/// Load and translate a stream range of aggregate `A`.
///
/// # Errors
///
/// - `Translation`: a row does not belong to `A`'s event shapes
/// - any error of [`EventStore::load_stream`]
pub async fn load_events<A: AggregateRoot>(
    store: &dyn EventStore,
    tenant: TenantId,
    stream_id: StreamId,
    range: VersionRange,
    codec: Codec,
) -> Result<EventsStream<A::Id, A::Event>, EventStoreError> {
    let recorded = store.load_stream(tenant, stream_id, range).await?;
    let events = recorded
        .events
        .iter()
        .map(|row| EventEnvelope::from_recorded(row, codec))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EventsStream {
        stream_id: recorded.stream_id,
        events,
        version: recorded.version,
        reached_end: recorded.reached_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_bounds() {
        let stream = StreamId::new("cart-1");
        let options = ReadOptions::forward_after(GlobalPosition::new(2)).until(GlobalPosition::new(5), false);
        let admitted: Vec<u64> = (0..8)
            .filter(|p| options.admits(GlobalPosition::new(*p), &stream))
            .collect();
        assert_eq!(admitted, vec![3, 4]);

        let inclusive = ReadOptions::forward_after(GlobalPosition::new(2))
            .inclusive_from()
            .until(GlobalPosition::new(5), true);
        let admitted: Vec<u64> = (0..8)
            .filter(|p| inclusive.admits(GlobalPosition::new(*p), &stream))
            .collect();
        assert_eq!(admitted, vec![2, 3, 4, 5]);
    }

    #[test]
    fn backward_bounds() {
        let stream = StreamId::new("cart-1");
        let mut options = ReadOptions::backward().until(GlobalPosition::new(3), true);
        options.from = Some(GlobalPosition::new(6));
        let admitted: Vec<u64> = (0..8)
            .filter(|p| options.admits(GlobalPosition::new(*p), &stream))
            .collect();
        assert_eq!(admitted, vec![3, 4, 5]);
    }

    #[test]
    fn prefix_filter() {
        let options = ReadOptions::forward().with_stream_prefix("account-");
        assert!(options.admits(GlobalPosition::new(1), &StreamId::new("account-9")));
        assert!(!options.admits(GlobalPosition::new(1), &StreamId::new("cart-9")));
    }

    #[test]
    fn conflict_is_detectable() {
        let conflict = EventStoreError::ConcurrencyConflict {
            stream_id: StreamId::new("seq-1"),
            expected: Version::new(0),
            actual: Version::new(3),
        };
        assert!(conflict.is_conflict());
        assert!(conflict.to_string().contains("expected version 0, found 3"));
        assert!(!EventStoreError::Backend("down".into()).is_conflict());
    }
}
