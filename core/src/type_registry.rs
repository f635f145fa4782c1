//! Mapping between aggregate types and the compact tags stored in the log.
//!
//! Every event row carries the [`TypeTag`] of the aggregate that produced it.
//! When the global log is replayed nothing is statically known about the
//! concrete aggregate types, so the [`TypeRegistry`] resolves the tag back to
//! a decoder that parses the aggregate identifier and the payload into an
//! [`EventEnvelope`], erased as an [`AnyEnvelope`].
//!
//! Bindings are registered once at startup; lookups never allocate a decoder.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = TypeRegistry::new();
//! registry.register::<Cart>()?;
//! registry.register::<BankAccount>()?;
//!
//! let envelope = registry.decode(&recorded, Codec::Bincode)?;
//! if let Some(cart_event) = envelope.downcast_ref::<CartId, CartEvent>() {
//!     // ...
//! }
//! ```

use crate::aggregate::AggregateRoot;
use crate::codec::Codec;
use crate::event::{EventEnvelope, EventTranslationError, RecordedEvent};
use crate::identity::{CommandId, EventId, SequenceId};
use crate::stream::{GlobalPosition, StreamId, TenantId, Version};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Compact, stable identifier of an aggregate type.
///
/// Tags are chosen by the aggregate author (see
/// [`AggregateRoot::TYPE_TAG`]) and must never change once events have been
/// written with them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeTag(u32);

impl TypeTag {
    /// Create a type tag.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the raw tag value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors raised by the type registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeRegistryError {
    /// A stored tag or a requested type has no binding.
    #[error("no aggregate type is bound to {0}")]
    MissingTypeBinding(String),

    /// The same name or tag was registered twice.
    #[error("aggregate type {name} ({tag}) is already registered")]
    DuplicateBinding {
        /// Aggregate type name.
        name: &'static str,
        /// Tag that collided.
        tag: TypeTag,
    },

    /// A row could not be translated by its bound decoder.
    #[error("malformed event in {stream_id} at position {position}: {source}")]
    MalformedEvent {
        /// Stream the row belongs to.
        stream_id: StreamId,
        /// Global position of the row.
        position: GlobalPosition,
        /// Underlying translation failure.
        #[source]
        source: EventTranslationError,
    },
}

/// A typed envelope with its concrete types erased.
///
/// Carries the header fields every subscriber may need for routing, plus the
/// typed [`EventEnvelope`] behind an `Arc<dyn Any>`. Cloning is cheap.
#[derive(Clone)]
pub struct AnyEnvelope {
    aggregate_type: TypeTag,
    aggregate_name: &'static str,
    stream_id: StreamId,
    tenant_id: TenantId,
    version: Version,
    position: Option<GlobalPosition>,
    event_type: &'static str,
    event_id: EventId,
    command_id: CommandId,
    sequence_id: SequenceId,
    inner: Arc<dyn Any + Send + Sync>,
}

impl AnyEnvelope {
    /// Erase a typed envelope produced by aggregate `A`.
    ///
    /// `position` is the row's global position when known (replays), or
    /// `None` for events published straight after an append.
    #[must_use]
    pub fn erase<A: AggregateRoot>(
        envelope: EventEnvelope<A::Id, A::Event>,
        position: Option<GlobalPosition>,
    ) -> Self {
        Self {
            aggregate_type: A::TYPE_TAG,
            aggregate_name: A::AGGREGATE_TYPE,
            stream_id: envelope.stream_id().clone(),
            tenant_id: envelope.tenant_id().clone(),
            version: envelope.version(),
            position,
            event_type: envelope.event_type(),
            event_id: envelope.event_id(),
            command_id: envelope.command_id(),
            sequence_id: envelope.sequence_id(),
            inner: Arc::new(envelope),
        }
    }

    /// Borrow the typed envelope if it has the requested types.
    #[must_use]
    pub fn downcast_ref<Id: 'static, E: 'static>(&self) -> Option<&EventEnvelope<Id, E>> {
        self.inner.downcast_ref()
    }

    /// Tag of the aggregate type that produced the event.
    #[must_use]
    pub const fn aggregate_type(&self) -> TypeTag {
        self.aggregate_type
    }

    /// Name of the aggregate type that produced the event.
    #[must_use]
    pub const fn aggregate_name(&self) -> &'static str {
        self.aggregate_name
    }

    /// Stream the event belongs to.
    #[must_use]
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Tenant that owns the stream.
    #[must_use]
    pub const fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Version the event occupies in its stream.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Global log position, if the event came from a log read.
    #[must_use]
    pub const fn position(&self) -> Option<GlobalPosition> {
        self.position
    }

    /// Event type of the payload.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        self.event_type
    }

    /// Unique event identifier.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Command that produced the event.
    #[must_use]
    pub const fn command_id(&self) -> CommandId {
        self.command_id
    }

    /// Top-level sequence the event belongs to.
    #[must_use]
    pub const fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }
}

impl fmt::Debug for AnyEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyEnvelope")
            .field("aggregate", &self.aggregate_name)
            .field("stream_id", &self.stream_id)
            .field("version", &self.version)
            .field("position", &self.position)
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}

type Decoder = fn(&RecordedEvent, Codec) -> Result<AnyEnvelope, EventTranslationError>;

fn decode_erased<A: AggregateRoot>(
    recorded: &RecordedEvent,
    codec: Codec,
) -> Result<AnyEnvelope, EventTranslationError> {
    let envelope = EventEnvelope::<A::Id, A::Event>::from_recorded(recorded, codec)?;
    Ok(AnyEnvelope::erase::<A>(envelope, Some(recorded.position)))
}

#[derive(Clone, Copy)]
struct Binding {
    name: &'static str,
    decode: Decoder,
}

/// Registry of aggregate type bindings.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    by_tag: HashMap<TypeTag, Binding>,
    by_name: HashMap<&'static str, TypeTag>,
}

impl TypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind aggregate type `A` to its tag.
    ///
    /// # Errors
    ///
    /// Returns [`TypeRegistryError::DuplicateBinding`] if the name or the tag
    /// is already bound.
    pub fn register<A: AggregateRoot>(&mut self) -> Result<&mut Self, TypeRegistryError> {
        if self.by_name.contains_key(A::AGGREGATE_TYPE) || self.by_tag.contains_key(&A::TYPE_TAG) {
            return Err(TypeRegistryError::DuplicateBinding {
                name: A::AGGREGATE_TYPE,
                tag: A::TYPE_TAG,
            });
        }
        self.by_tag.insert(
            A::TYPE_TAG,
            Binding {
                name: A::AGGREGATE_TYPE,
                decode: decode_erased::<A>,
            },
        );
        self.by_name.insert(A::AGGREGATE_TYPE, A::TYPE_TAG);
        tracing::debug!(aggregate = A::AGGREGATE_TYPE, tag = %A::TYPE_TAG, "Registered aggregate type");
        Ok(self)
    }

    /// Resolve the tag bound to aggregate type `A`.
    ///
    /// # Errors
    ///
    /// Returns [`TypeRegistryError::MissingTypeBinding`] if `A` was never registered.
    pub fn id_for_type<A: AggregateRoot>(&self) -> Result<TypeTag, TypeRegistryError> {
        self.id_for_name(A::AGGREGATE_TYPE)
    }

    /// Resolve the tag bound to an aggregate type name.
    ///
    /// # Errors
    ///
    /// Returns [`TypeRegistryError::MissingTypeBinding`] if no type has that name.
    pub fn id_for_name(&self, name: &str) -> Result<TypeTag, TypeRegistryError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| TypeRegistryError::MissingTypeBinding(name.to_string()))
    }

    /// Resolve the aggregate type name bound to a tag.
    ///
    /// # Errors
    ///
    /// Returns [`TypeRegistryError::MissingTypeBinding`] if the tag is unknown.
    pub fn type_for_id(&self, tag: TypeTag) -> Result<&'static str, TypeRegistryError> {
        self.by_tag
            .get(&tag)
            .map(|binding| binding.name)
            .ok_or_else(|| TypeRegistryError::MissingTypeBinding(tag.to_string()))
    }

    /// Translate a raw row into an erased typed envelope.
    ///
    /// # Errors
    ///
    /// - [`TypeRegistryError::MissingTypeBinding`]: the row's tag is unknown
    /// - [`TypeRegistryError::MalformedEvent`]: the bound decoder rejected the row
    pub fn decode(&self, recorded: &RecordedEvent, codec: Codec) -> Result<AnyEnvelope, TypeRegistryError> {
        let tag = recorded.event.metadata.aggregate_type;
        let binding = self
            .by_tag
            .get(&tag)
            .ok_or_else(|| TypeRegistryError::MissingTypeBinding(tag.to_string()))?;

        (binding.decode)(recorded, codec).map_err(|source| TypeRegistryError::MalformedEvent {
            stream_id: recorded.stream_id.clone(),
            position: recorded.position,
            source,
        })
    }

    /// Number of registered aggregate types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    /// Whether no aggregate types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.by_name.iter()).finish()
    }
}
