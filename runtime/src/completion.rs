//! Command sequence completion tracking.
//!
//! One command can fan out into several published events, each handled by
//! subscribers the engine knows nothing about. Appending an event is not the
//! same as every read model having seen it. The [`CompletionTracker`] is the
//! explicit synchronization point for callers that need read-after-write
//! consistency.
//!
//! Per sequence id the tracker holds the set of outstanding event ids. A
//! sequence is `Pending` while that set is non-empty and `Done` otherwise;
//! a sequence the tracker has never seen (or has already released) counts as
//! `Done`.
//!
//! # Example
//!
//! ```
//! use eventloom_core::identity::{EventId, SequenceId};
//! use eventloom_runtime::completion::CompletionTracker;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let tracker = Arc::new(CompletionTracker::new());
//! let sequence = SequenceId::generate();
//! let event = EventId::generate();
//!
//! tracker.mark_started(sequence, event);
//!
//! let subscriber = Arc::clone(&tracker);
//! tokio::spawn(async move { subscriber.mark_completed(sequence, event) });
//!
//! tracker
//!     .await_completion(sequence, Duration::from_secs(1))
//!     .await
//!     .unwrap();
//! # }
//! ```

use crate::metrics::CompletionMetrics;
use eventloom_core::identity::{EventId, SequenceId};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors from waiting on a sequence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The sequence did not settle in time.
    #[error("sequence {sequence_id} did not complete within {timeout:?}")]
    PublicationTimeout {
        /// Sequence that was awaited.
        sequence_id: SequenceId,
        /// How long the caller waited.
        timeout: Duration,
    },
}

/// State of one sequence.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SequenceStatus {
    /// At least one event is still outstanding.
    Pending,
    /// Every event has been handled.
    Done,
}

#[derive(Default)]
struct Pending {
    outstanding: HashSet<EventId>,
    waiters: Vec<(u64, oneshot::Sender<()>)>,
}

/// Tracks outstanding published events per command sequence.
///
/// Thread-safe: `mark_started` and `mark_completed` may be called from any
/// publisher or subscriber task while other tasks await completion. The
/// registry lock is never held across an await point.
#[derive(Default)]
pub struct CompletionTracker {
    sequences: Mutex<HashMap<SequenceId, Pending>>,
    next_waiter: AtomicU64,
}

impl CompletionTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sequences(&self) -> std::sync::MutexGuard<'_, HashMap<SequenceId, Pending>> {
        self.sequences
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register one outstanding unit of work for `sequence_id`.
    pub fn mark_started(&self, sequence_id: SequenceId, event_id: EventId) {
        self.sequences()
            .entry(sequence_id)
            .or_default()
            .outstanding
            .insert(event_id);
        tracing::trace!(%sequence_id, %event_id, "Publication started");
    }

    /// Remove one outstanding unit of work. When none remain the sequence is
    /// done and every waiter is released.
    pub fn mark_completed(&self, sequence_id: SequenceId, event_id: EventId) {
        let released = {
            let mut sequences = self.sequences();
            let Some(pending) = sequences.get_mut(&sequence_id) else {
                tracing::trace!(%sequence_id, %event_id, "Completion for unknown sequence ignored");
                return;
            };
            pending.outstanding.remove(&event_id);
            if pending.outstanding.is_empty() {
                sequences.remove(&sequence_id)
            } else {
                None
            }
        };

        if let Some(done) = released {
            tracing::debug!(%sequence_id, waiters = done.waiters.len(), "Sequence completed");
            for (_, waiter) in done.waiters {
                // Receiver gone means the waiter timed out concurrently.
                let _ = waiter.send(());
            }
        }
    }

    /// Current status of a sequence.
    #[must_use]
    pub fn status(&self, sequence_id: SequenceId) -> SequenceStatus {
        if self.sequences().contains_key(&sequence_id) {
            SequenceStatus::Pending
        } else {
            SequenceStatus::Done
        }
    }

    /// Number of sequences with outstanding work.
    #[must_use]
    pub fn pending_sequences(&self) -> usize {
        self.sequences().len()
    }

    /// Suspend until `sequence_id` is done or `timeout` elapses.
    ///
    /// Returns immediately for a sequence that is already done.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::PublicationTimeout`] on timeout. The waiter
    /// registration is removed before returning.
    pub async fn await_completion(
        &self,
        sequence_id: SequenceId,
        timeout: Duration,
    ) -> Result<(), CompletionError> {
        let waiter_id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        let receiver = {
            let mut sequences = self.sequences();
            let Some(pending) = sequences.get_mut(&sequence_id) else {
                return Ok(());
            };
            let (sender, receiver) = oneshot::channel();
            pending.waiters.push((waiter_id, sender));
            receiver
        };

        if let Ok(Ok(())) = tokio::time::timeout(timeout, receiver).await {
            return Ok(());
        }

        // Completion and timeout race: whoever takes the waiter out under the
        // lock resolves it.
        let still_waiting = {
            let mut sequences = self.sequences();
            sequences.get_mut(&sequence_id).is_some_and(|pending| {
                let before = pending.waiters.len();
                pending.waiters.retain(|(id, _)| *id != waiter_id);
                pending.waiters.len() != before
            })
        };

        if still_waiting {
            CompletionMetrics::record_timeout();
            tracing::warn!(%sequence_id, ?timeout, "Publication timed out");
            Err(CompletionError::PublicationTimeout {
                sequence_id,
                timeout,
            })
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for CompletionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionTracker")
            .field("pending_sequences", &self.pending_sequences())
            .finish()
    }
}
