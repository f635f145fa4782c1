//! In-memory event bus.

use eventloom_core::event_bus::{BusFuture, EventBus, EventBusError, EventStream};
use eventloom_core::projection::Projection;
use eventloom_core::type_registry::AnyEnvelope;
use eventloom_runtime::completion::CompletionTracker;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Capacity of the broadcast channel feeding subscriptions.
const SUBSCRIPTION_BUFFER: usize = 1024;

/// In-memory event bus.
///
/// `publish` dispatches each envelope, in order, to every registered
/// projection before returning, then forwards it to subscription streams
/// and reports it handled to the completion tracker, if one is attached.
///
/// # Example
///
/// ```
/// use eventloom_testing::{InMemoryEventBus, RecordingProjection};
/// use eventloom_runtime::completion::CompletionTracker;
/// use std::sync::Arc;
///
/// let tracker = Arc::new(CompletionTracker::new());
/// let audit = Arc::new(RecordingProjection::new("audit"));
/// let bus = InMemoryEventBus::new()
///     .with_completion_tracker(Arc::clone(&tracker))
///     .with_projection(audit.clone());
/// assert_eq!(bus.published_count(), 0);
/// ```
pub struct InMemoryEventBus {
    projections: RwLock<Vec<Arc<dyn Projection>>>,
    published: Mutex<Vec<AnyEnvelope>>,
    batches: AtomicUsize,
    sender: broadcast::Sender<AnyEnvelope>,
    completion: Option<Arc<CompletionTracker>>,
    fail_publish: AtomicBool,
}

impl InMemoryEventBus {
    /// Create a bus with no projections and no completion tracker.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIPTION_BUFFER);
        Self {
            projections: RwLock::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            batches: AtomicUsize::new(0),
            sender,
            completion: None,
            fail_publish: AtomicBool::new(false),
        }
    }

    /// Report handled envelopes to `tracker`.
    #[must_use]
    pub fn with_completion_tracker(mut self, tracker: Arc<CompletionTracker>) -> Self {
        self.completion = Some(tracker);
        self
    }

    /// Register a projection.
    #[must_use]
    pub fn with_projection(self, projection: Arc<dyn Projection>) -> Self {
        self.register(projection);
        self
    }

    /// Register a projection on a shared bus.
    pub fn register(&self, projection: Arc<dyn Projection>) {
        self.projections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(projection);
    }

    /// Make `publish` fail until reset.
    pub fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::Release);
    }

    /// Every envelope published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<AnyEnvelope> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of envelopes published so far.
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of `publish` calls that succeeded.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::Acquire)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, events: Vec<AnyEnvelope>) -> BusFuture<'_, ()> {
        Box::pin(async move {
            if self.fail_publish.load(Ordering::Acquire) {
                return Err(EventBusError::PublishFailed(
                    "in-memory bus refuses publication".to_string(),
                ));
            }

            let projections = self
                .projections
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();

            for envelope in events {
                for projection in &projections {
                    projection
                        .handle(&envelope)
                        .await
                        .map_err(|source| EventBusError::Projection {
                            projection: projection.name().to_string(),
                            source,
                        })?;
                }

                if let Some(tracker) = &self.completion {
                    tracker.mark_completed(envelope.sequence_id(), envelope.event_id());
                }
                // No subscribers is not an error.
                let _ = self.sender.send(envelope.clone());
                self.published
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(envelope);
            }

            self.batches.fetch_add(1, Ordering::AcqRel);
            Ok(())
        })
    }

    fn subscribe(&self) -> BusFuture<'_, EventStream> {
        Box::pin(async move {
            let mut receiver = self.sender.subscribe();
            let stream = async_stream::stream! {
                loop {
                    match receiver.recv().await {
                        Ok(envelope) => yield envelope,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Subscriber lagged, envelopes dropped");
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("published", &self.published_count())
            .field("batches", &self.batch_count())
            .field("tracks_completion", &self.completion.is_some())
            .finish_non_exhaustive()
    }
}
