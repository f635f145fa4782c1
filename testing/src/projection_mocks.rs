//! Recording projection for asserting what subscribers received.

use eventloom_core::projection::{Projection, ProjectionError, ProjectionFuture};
use eventloom_core::stream::{GlobalPosition, StreamId, Version};
use eventloom_core::type_registry::AnyEnvelope;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Projection that records every envelope it handles.
///
/// # Example
///
/// ```
/// use eventloom_testing::RecordingProjection;
///
/// let projection = RecordingProjection::new("audit");
/// assert!(projection.is_empty());
/// assert_eq!(projection.resets(), 0);
/// ```
#[derive(Debug)]
pub struct RecordingProjection {
    name: String,
    envelopes: Mutex<Vec<AnyEnvelope>>,
    fail_on: Mutex<Option<&'static str>>,
    resets: AtomicUsize,
}

impl RecordingProjection {
    /// Create an empty projection.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            envelopes: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
            resets: AtomicUsize::new(0),
        }
    }

    fn envelopes(&self) -> MutexGuard<'_, Vec<AnyEnvelope>> {
        self.envelopes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject every envelope of `event_type` from now on.
    pub fn fail_on(&self, event_type: &'static str) {
        *self.fail_on.lock().unwrap_or_else(PoisonError::into_inner) = Some(event_type);
    }

    /// Every envelope handled since the last reset.
    #[must_use]
    pub fn received(&self) -> Vec<AnyEnvelope> {
        self.envelopes().clone()
    }

    /// `(stream, version)` of every envelope handled, in order.
    #[must_use]
    pub fn stream_versions(&self) -> Vec<(StreamId, Version)> {
        self.envelopes()
            .iter()
            .map(|envelope| (envelope.stream_id().clone(), envelope.version()))
            .collect()
    }

    /// Global positions of every envelope handled, in order.
    #[must_use]
    pub fn positions(&self) -> Vec<Option<GlobalPosition>> {
        self.envelopes()
            .iter()
            .map(AnyEnvelope::position)
            .collect()
    }

    /// How many times the projection was reset.
    #[must_use]
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::Acquire)
    }

    /// Number of envelopes handled since the last reset.
    #[must_use]
    pub fn len(&self) -> usize {
        self.envelopes().len()
    }

    /// Whether nothing was handled since the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.envelopes().is_empty()
    }
}

impl Projection for RecordingProjection {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle<'a>(&'a self, envelope: &'a AnyEnvelope) -> ProjectionFuture<'a> {
        Box::pin(async move {
            let fail_on = *self.fail_on.lock().unwrap_or_else(PoisonError::into_inner);
            if fail_on == Some(envelope.event_type()) {
                return Err(ProjectionError::EventProcessing(format!(
                    "{} refuses {}",
                    self.name,
                    envelope.event_type()
                )));
            }
            self.envelopes().push(envelope.clone());
            Ok(())
        })
    }

    fn reset(&self) -> ProjectionFuture<'_> {
        Box::pin(async move {
            self.envelopes().clear();
            self.resets.fetch_add(1, Ordering::AcqRel);
            Ok(())
        })
    }
}
