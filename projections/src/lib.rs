//! Views rebuilding for Eventloom.
//!
//! # Overview
//!
//! Read models are disposable: any projection can be dropped and rebuilt by
//! replaying the global log. This crate provides the [`ViewsRebuilder`], a
//! stateless driver that walks a tenant's log in fixed-size batches, decodes
//! every row through the [`TypeRegistry`](eventloom_core::type_registry::TypeRegistry)
//! and republishes it on the event bus.
//!
//! ```text
//! Event Store (global log) ──batch──▶ ViewsRebuilder ──publish──▶ Event Bus ──▶ Projections
//!                                         │
//!                                         └──progress──▶ subscribers, tracing, metrics
//! ```
//!
//! # Resuming
//!
//! The only state is the cursor. A rebuild that stopped (or failed) after
//! position `p` resumes with `rebuild_from(tenant, p, batch_size)` and
//! republishes only what follows `p`.
//!
//! # Example
//!
//! ```ignore
//! use eventloom_projections::ViewsRebuilder;
//!
//! let mut registry = TypeRegistry::new();
//! registry.register::<BankAccount>()?;
//!
//! let rebuilder = ViewsRebuilder::for_engine(&engine, Arc::new(registry))
//!     .with_reset(vec![balances.clone()]);
//!
//! let mut progress = rebuilder.subscribe();
//! let summary = rebuilder.rebuild(engine.config().rebuild_batch_size).await?;
//! println!("replayed {} events in {} batches", summary.events, summary.batches);
//! ```

pub mod rebuilder;

// Re-export main types for convenience
pub use rebuilder::{RebuildError, RebuildProgress, RebuildSummary, ViewsRebuilder};
