//! Event bus abstraction for publishing committed events to read models.
//!
//! After a successful append the engine publishes the new events, erased as
//! [`AnyEnvelope`]s, so projection handlers can consume them without static
//! knowledge of every aggregate type. The views rebuilder publishes replayed
//! events through the same trait.
//!
//! Writing an event and every interested subscriber having handled it are
//! different moments. Implementations report handled events to the
//! completion tracker so callers can wait for the latter.
//!
//! # Example
//!
//! ```ignore
//! use eventloom_core::event_bus::EventBus;
//! use futures::StreamExt;
//!
//! async fn example(event_bus: &dyn EventBus) {
//!     let mut stream = event_bus.subscribe().await?;
//!     while let Some(envelope) = stream.next().await {
//!         println!("{} {}@{}", envelope.event_type(), envelope.stream_id(), envelope.version());
//!     }
//! }
//! ```

use crate::projection::ProjectionError;
use crate::type_registry::AnyEnvelope;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a batch
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Failed to subscribe
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    /// A projection handler failed while the bus dispatched to it
    #[error("Projection {projection} failed: {source}")]
    Projection {
        /// Name of the failing projection.
        projection: String,
        /// Underlying failure.
        #[source]
        source: ProjectionError,
    },

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of envelopes from a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = AnyEnvelope> + Send>>;

/// Boxed future returned by [`EventBus`] methods.
pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventBusError>> + Send + 'a>>;

/// Event bus abstraction for fan-out to read models.
///
/// # Delivery
///
/// A published batch keeps its order. Batches from different streams may
/// interleave.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn EventBus>`).
pub trait EventBus: Send + Sync {
    /// Publish a batch of envelopes.
    ///
    /// # Errors
    ///
    /// - `PublishFailed`: the batch could not be handed to the bus
    /// - `Projection`: a synchronous subscriber rejected an envelope
    fn publish(&self, events: Vec<AnyEnvelope>) -> BusFuture<'_, ()>;

    /// Subscribe to every envelope published after this call.
    ///
    /// # Errors
    ///
    /// - `SubscriptionFailed`: the subscription could not be created
    fn subscribe(&self) -> BusFuture<'_, EventStream>;
}
