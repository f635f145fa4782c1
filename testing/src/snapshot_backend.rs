//! In-memory snapshot backend.

use eventloom_core::snapshot::{SnapshotBackend, SnapshotError, SnapshotFuture, StoredSnapshot};
use eventloom_core::stream::{StreamId, TenantId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// In-memory snapshot backend keyed by `(tenant, stream)`.
///
/// Saving replaces the previous record. Loads and saves can be made to fail
/// independently, to exercise the snapshot store's fallback paths.
#[derive(Debug, Default)]
pub struct InMemorySnapshotBackend {
    snapshots: Mutex<HashMap<(TenantId, StreamId), StoredSnapshot>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl InMemorySnapshotBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshots(&self) -> MutexGuard<'_, HashMap<(TenantId, StreamId), StoredSnapshot>> {
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make loads fail with a backend error.
    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Release);
    }

    /// Make saves fail with a backend error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Release);
    }

    /// The stored record of a stream, if any.
    #[must_use]
    pub fn get(&self, tenant: &TenantId, stream_id: &StreamId) -> Option<StoredSnapshot> {
        self.snapshots()
            .get(&(tenant.clone(), stream_id.clone()))
            .cloned()
    }

    /// Plant a record directly, bypassing the snapshot store.
    pub fn insert(&self, tenant: TenantId, snapshot: StoredSnapshot) {
        self.snapshots()
            .insert((tenant, snapshot.stream_id.clone()), snapshot);
    }

    /// Number of successful saves so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Acquire)
    }

    /// Number of streams with a snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots().len()
    }

    /// Whether no snapshot is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots().is_empty()
    }
}

impl SnapshotBackend for InMemorySnapshotBackend {
    fn load(&self, tenant: TenantId, stream_id: StreamId) -> SnapshotFuture<'_, Option<StoredSnapshot>> {
        Box::pin(async move {
            if self.fail_loads.load(Ordering::Acquire) {
                return Err(SnapshotError::Backend("snapshot load refused".to_string()));
            }
            Ok(self.get(&tenant, &stream_id))
        })
    }

    fn save(&self, tenant: TenantId, snapshot: StoredSnapshot) -> SnapshotFuture<'_, ()> {
        Box::pin(async move {
            if self.fail_saves.load(Ordering::Acquire) {
                return Err(SnapshotError::Backend("snapshot save refused".to_string()));
            }
            self.insert(tenant, snapshot);
            self.saves.fetch_add(1, Ordering::AcqRel);
            Ok(())
        })
    }
}
