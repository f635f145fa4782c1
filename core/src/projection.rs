//! Projections: read models built from published events.
//!
//! # Overview
//!
//! Projections are the **query side of CQRS**. The write side turns commands
//! into events; projections turn those events into denormalized views. A
//! projection can be dropped and rebuilt from the global log at any time,
//! which is what the views rebuilder does.
//!
//! ```text
//!   Engine ──append──▶ Event Store ◀──read── Views Rebuilder
//!     │                                           │
//!     └──publish──▶  Event Bus  ◀──publish────────┘
//!                        │
//!                        ▼
//!                   Projections
//! ```
//!
//! Projections receive [`AnyEnvelope`]s and downcast the ones they care
//! about.
//!
//! ## Example
//!
//! ```ignore
//! struct BalanceView {
//!     balances: Mutex<HashMap<AccountId, u64>>,
//! }
//!
//! impl Projection for BalanceView {
//!     fn name(&self) -> &str {
//!         "balances"
//!     }
//!
//!     fn handle<'a>(&'a self, envelope: &'a AnyEnvelope) -> ProjectionFuture<'a> {
//!         Box::pin(async move {
//!             if let Some(event) = envelope.downcast_ref::<AccountId, AccountEvent>() {
//!                 // update the view
//!             }
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use crate::type_registry::AnyEnvelope;
use std::future::Future;
use std::pin::Pin;

/// Error type for projection operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Event processing error
    #[error("Event processing error: {0}")]
    EventProcessing(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Boxed future returned by [`Projection`] methods.
pub type ProjectionFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A projection builds and maintains a read model from events.
///
/// # Philosophy
///
/// - **Eventually Consistent**: Projections lag behind the log
/// - **Rebuildable**: Can be reset and rebuilt from the log at any time
/// - **Selective**: Ignore envelopes of aggregate types they don't model
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `impl Future`
/// so buses can hold heterogeneous projections as `Arc<dyn Projection>`.
pub trait Projection: Send + Sync {
    /// Get the unique name of this projection.
    fn name(&self) -> &str;

    /// Apply one envelope to the read model.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the read model could not be updated.
    fn handle<'a>(&'a self, envelope: &'a AnyEnvelope) -> ProjectionFuture<'a>;

    /// Drop the read model's data before a rebuild.
    ///
    /// The default does nothing, for projections that are idempotent under
    /// replay.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the data could not be cleared.
    fn reset(&self) -> ProjectionFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}
