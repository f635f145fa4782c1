//! Events and their envelopes.
//!
//! Events are immutable facts. They travel through the engine in two forms:
//!
//! - **Raw** ([`SerializedEvent`], [`RecordedEvent`]): an event-type name, the
//!   codec-encoded payload and [`EventMetadata`]. This is what storage
//!   backends persist and return.
//! - **Typed** ([`EventEnvelope`]): the decoded domain event together with its
//!   parsed aggregate identifier and stream version. Only the event-store
//!   layer creates envelopes, by translating raw rows; nothing mutates them
//!   afterwards.
//!
//! # Example
//!
//! ```
//! use eventloom_core::event::Event;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! enum CartEvent {
//!     ItemAdded { sku: String, quantity: u32 },
//!     CartCleared,
//! }
//!
//! impl Event for CartEvent {
//!     fn event_type(&self) -> &'static str {
//!         match self {
//!             CartEvent::ItemAdded { .. } => "ItemAdded.v1",
//!             CartEvent::CartCleared => "CartCleared.v1",
//!         }
//!     }
//! }
//! ```

use crate::codec::{Codec, CodecError};
use crate::identity::{AggregateId, CommandId, EventId, ParseIdError, PrincipalId, SequenceId};
use crate::stream::{GlobalPosition, StreamId, TenantId, Version};
use crate::type_registry::TypeTag;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A domain event that can be stored and replayed.
///
/// # Event Naming Convention
///
/// `event_type()` names the event's *shape*: the key under which state
/// mutators register transitions and under which the log stores the event.
/// Include a version suffix so schemas can evolve:
///
/// - `"ItemAdded.v1"`
/// - `"FundsWithdrawn.v2"` (after schema change)
///
/// # Thread Safety
///
/// Events must be `Send + Sync + 'static` so envelopes can be shared across
/// tasks by reference.
pub trait Event: Send + Sync + 'static {
    /// Returns the event type identifier for this event.
    fn event_type(&self) -> &'static str;
}

/// Errors raised while translating a raw log row into a typed envelope.
///
/// Every variant means the log and the code that explains it disagree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventTranslationError {
    /// The stored aggregate identifier did not parse.
    #[error(transparent)]
    AggregateId(#[from] ParseIdError),

    /// The stored payload did not decode.
    #[error(transparent)]
    Payload(#[from] CodecError),

    /// The payload decoded, but into a different event shape than the row claims.
    #[error("event at {stream_id}@{version} is stored as {stored} but decodes as {decoded}")]
    ShapeMismatch {
        /// Stream the row belongs to.
        stream_id: StreamId,
        /// Version of the row.
        version: Version,
        /// Event type recorded in the row.
        stored: String,
        /// Event type reported by the decoded payload.
        decoded: &'static str,
    },
}

/// Metadata stamped on every event at write time.
///
/// Copied from the command that produced the event, plus the aggregate type
/// tag used to route the event back to its decoder during a global replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Compact tag of the aggregate type that owns the stream.
    pub aggregate_type: TypeTag,
    /// Aggregate identifier in its string form.
    pub aggregate_id: String,
    /// Tenant that owns the stream.
    pub tenant_id: TenantId,
    /// Unique event identifier.
    pub event_id: EventId,
    /// Command that produced this event.
    pub command_id: CommandId,
    /// Top-level sequence the command belongs to.
    pub sequence_id: SequenceId,
    /// Who issued the command.
    pub principal_id: PrincipalId,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
}

/// An encoded event ready to be appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., `"ItemAdded.v1"`).
    pub event_type: String,

    /// The codec-encoded payload.
    pub data: Vec<u8>,

    /// Write-time metadata.
    pub metadata: EventMetadata,
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}

/// A raw row as returned by an event-store backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Stream the event belongs to.
    pub stream_id: StreamId,
    /// Version the event occupies in its stream.
    pub version: Version,
    /// Position of the event in the tenant's global log.
    pub position: GlobalPosition,
    /// The stored event.
    pub event: SerializedEvent,
}

/// One committed event, decoded.
///
/// # Type Parameters
///
/// - `Id`: the aggregate's identifier type
/// - `E`: the aggregate's event type
#[derive(Clone, Debug, PartialEq)]
pub struct EventEnvelope<Id, E> {
    aggregate_id: Id,
    stream_id: StreamId,
    tenant_id: TenantId,
    event_id: EventId,
    command_id: CommandId,
    sequence_id: SequenceId,
    principal_id: PrincipalId,
    payload: E,
    timestamp: DateTime<Utc>,
    version: Version,
}

impl<Id, E> EventEnvelope<Id, E> {
    /// Aggregate the event belongs to.
    pub const fn aggregate_id(&self) -> &Id {
        &self.aggregate_id
    }

    /// Stream the event belongs to.
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Tenant that owns the stream.
    pub const fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Unique event identifier.
    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Command that produced the event.
    pub const fn command_id(&self) -> CommandId {
        self.command_id
    }

    /// Top-level sequence the event belongs to.
    pub const fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }

    /// Who issued the command.
    pub const fn principal_id(&self) -> &PrincipalId {
        &self.principal_id
    }

    /// The domain event.
    pub const fn payload(&self) -> &E {
        &self.payload
    }

    /// When the event was produced.
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Version the event occupies in its stream.
    pub const fn version(&self) -> Version {
        self.version
    }
}

/// Parts of an envelope that come from the command being handled.
#[derive(Clone, Debug)]
pub(crate) struct EnvelopeStamp {
    pub(crate) stream_id: StreamId,
    pub(crate) tenant_id: TenantId,
    pub(crate) command_id: CommandId,
    pub(crate) sequence_id: SequenceId,
    pub(crate) principal_id: PrincipalId,
    pub(crate) timestamp: DateTime<Utc>,
}

impl<Id: AggregateId, E: Event> EventEnvelope<Id, E> {
    /// Build a new envelope for an event being applied to an aggregate.
    pub(crate) fn stamped(aggregate_id: Id, stamp: EnvelopeStamp, payload: E, version: Version) -> Self {
        Self {
            aggregate_id,
            stream_id: stamp.stream_id,
            tenant_id: stamp.tenant_id,
            event_id: EventId::generate(),
            command_id: stamp.command_id,
            sequence_id: stamp.sequence_id,
            principal_id: stamp.principal_id,
            payload,
            timestamp: stamp.timestamp,
            version,
        }
    }

    /// Event type of the payload.
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    /// Encode this envelope for appending.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the payload cannot be encoded.
    pub fn to_serialized(
        &self,
        codec: Codec,
        aggregate_type: TypeTag,
    ) -> Result<SerializedEvent, CodecError>
    where
        E: Serialize,
    {
        Ok(SerializedEvent {
            event_type: self.payload.event_type().to_string(),
            data: codec.encode(&self.payload)?,
            metadata: EventMetadata {
                aggregate_type,
                aggregate_id: self.aggregate_id.to_string(),
                tenant_id: self.tenant_id.clone(),
                event_id: self.event_id,
                command_id: self.command_id,
                sequence_id: self.sequence_id,
                principal_id: self.principal_id.clone(),
                timestamp: self.timestamp,
            },
        })
    }

    /// Translate a raw row back into a typed envelope.
    ///
    /// # Errors
    ///
    /// - [`EventTranslationError::AggregateId`]: the stored id does not parse
    /// - [`EventTranslationError::Payload`]: the payload does not decode
    /// - [`EventTranslationError::ShapeMismatch`]: the decoded event type
    ///   differs from the one recorded in the row
    pub fn from_recorded(recorded: &RecordedEvent, codec: Codec) -> Result<Self, EventTranslationError>
    where
        E: DeserializeOwned,
    {
        let metadata = &recorded.event.metadata;
        let aggregate_id = Id::parse_id(&metadata.aggregate_id)?;
        let payload: E = codec.decode(&recorded.event.data)?;

        if payload.event_type() != recorded.event.event_type {
            return Err(EventTranslationError::ShapeMismatch {
                stream_id: recorded.stream_id.clone(),
                version: recorded.version,
                stored: recorded.event.event_type.clone(),
                decoded: payload.event_type(),
            });
        }

        Ok(Self {
            aggregate_id,
            stream_id: recorded.stream_id.clone(),
            tenant_id: metadata.tenant_id.clone(),
            event_id: metadata.event_id,
            command_id: metadata.command_id,
            sequence_id: metadata.sequence_id,
            principal_id: metadata.principal_id.clone(),
            payload,
            timestamp: metadata.timestamp,
            version: recorded.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    enum TestEvent {
        Created { id: String, value: i32 },
        Updated { id: String, new_value: i32 },
    }

    impl Event for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::Created { .. } => "TestEvent.Created.v1",
                TestEvent::Updated { .. } => "TestEvent.Updated.v1",
            }
        }
    }

    fn stamp() -> EnvelopeStamp {
        EnvelopeStamp {
            stream_id: StreamId::new("test-7"),
            tenant_id: TenantId::new("acme"),
            command_id: CommandId::generate(),
            sequence_id: SequenceId::generate(),
            principal_id: PrincipalId::new("ada"),
            timestamp: Utc::now(),
        }
    }

    fn recorded(envelope: &EventEnvelope<u64, TestEvent>, codec: Codec) -> RecordedEvent {
        RecordedEvent {
            stream_id: envelope.stream_id().clone(),
            version: envelope.version(),
            position: GlobalPosition::new(11),
            #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
            event: envelope
                .to_serialized(codec, TypeTag::new(3))
                .expect("serialization should succeed"),
        }
    }

    #[test]
    fn stamped_envelope_copies_command_metadata() {
        let s = stamp();
        let envelope = EventEnvelope::stamped(
            7_u64,
            s.clone(),
            TestEvent::Created {
                id: "a".into(),
                value: 1,
            },
            Version::new(1),
        );
        assert_eq!(envelope.command_id(), s.command_id);
        assert_eq!(envelope.sequence_id(), s.sequence_id);
        assert_eq!(envelope.tenant_id(), &s.tenant_id);
        assert_eq!(envelope.version(), Version::new(1));
        assert_eq!(envelope.event_type(), "TestEvent.Created.v1");
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if translation fails
    fn serialized_rows_translate_back() {
        let envelope = EventEnvelope::stamped(
            7_u64,
            stamp(),
            TestEvent::Updated {
                id: "a".into(),
                new_value: 9,
            },
            Version::new(4),
        );
        for codec in [Codec::Bincode, Codec::Json] {
            let row = recorded(&envelope, codec);
            assert_eq!(row.event.metadata.aggregate_id, "7");
            assert_eq!(row.event.metadata.aggregate_type, TypeTag::new(3));

            let back = EventEnvelope::<u64, TestEvent>::from_recorded(&row, codec)
                .expect("translation should succeed");
            assert_eq!(back, envelope);
        }
    }

    #[test]
    fn translation_rejects_bad_aggregate_id() {
        let envelope = EventEnvelope::stamped(
            7_u64,
            stamp(),
            TestEvent::Created {
                id: "a".into(),
                value: 1,
            },
            Version::new(1),
        );
        let mut row = recorded(&envelope, Codec::Json);
        row.event.metadata.aggregate_id = "not-a-number".to_string();

        let result = EventEnvelope::<u64, TestEvent>::from_recorded(&row, Codec::Json);
        assert!(matches!(result, Err(EventTranslationError::AggregateId(_))));
    }

    #[test]
    fn translation_rejects_shape_mismatch() {
        let envelope = EventEnvelope::stamped(
            7_u64,
            stamp(),
            TestEvent::Created {
                id: "a".into(),
                value: 1,
            },
            Version::new(1),
        );
        let mut row = recorded(&envelope, Codec::Json);
        row.event.event_type = "TestEvent.Updated.v1".to_string();

        let result = EventEnvelope::<u64, TestEvent>::from_recorded(&row, Codec::Json);
        assert!(matches!(
            result,
            Err(EventTranslationError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn translation_rejects_corrupt_payload() {
        let envelope = EventEnvelope::stamped(
            7_u64,
            stamp(),
            TestEvent::Created {
                id: "a".into(),
                value: 1,
            },
            Version::new(1),
        );
        let mut row = recorded(&envelope, Codec::Json);
        row.event.data = b"{{{".to_vec();

        let result = EventEnvelope::<u64, TestEvent>::from_recorded(&row, Codec::Json);
        assert!(matches!(result, Err(EventTranslationError::Payload(_))));
    }

    #[test]
    fn serialized_event_display() {
        let envelope = EventEnvelope::stamped(
            7_u64,
            stamp(),
            TestEvent::Created {
                id: "a".into(),
                value: 1,
            },
            Version::new(1),
        );
        let row = recorded(&envelope, Codec::Json);
        let display = format!("{}", row.event);
        assert!(display.contains("TestEvent.Created.v1"));
        assert!(display.contains("bytes"));
    }
}
