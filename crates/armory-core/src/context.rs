//! # Resolution Context
//!
//! A short-lived, per-operation identity map: `(entry_type, id)` → the one
//! live entry constructed for that key during the operation.
//!
//! - Each key owns a single-flight slot (`OnceCell`). The first resolver runs
//!   the store fetch; every concurrent resolver of the same key awaits that
//!   same fetch instead of issuing its own.
//! - The slot is filled with the entry *shell* before its nested load starts,
//!   so a cyclic reference back to the key finds the in-progress object.
//! - A counter of loads in flight lets top-level callers wait until the whole
//!   operation has settled.
//!
//! The context controls deduplication only, never lifetime: dropping it
//! releases its strong handles, and entries live on as long as anyone else
//! holds them.

use crate::entry::LiveRef;
use crate::EntryKey;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OnceCell, watch};

/// Single-flight slot for one key. `None` records a confirmed miss.
pub(crate) type Slot = Arc<OnceCell<Option<LiveRef>>>;

struct ContextInner {
    slots: Mutex<BTreeMap<EntryKey, Slot>>,
    inflight: watch::Sender<usize>,
}

/// Per-operation dedup cache.
///
/// Cheap to clone; clones share the same identity map. Create one per
/// top-level operation (one load, one import, one sync) and drop it after.
#[derive(Clone)]
pub struct ResolutionContext {
    inner: Arc<ContextInner>,
}

impl Default for ResolutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("slots", &self.inner.slots.lock().len())
            .field("inflight", &self.inflight())
            .finish()
    }
}

impl ResolutionContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        let (inflight, _) = watch::channel(0);
        Self {
            inner: Arc::new(ContextInner {
                slots: Mutex::new(BTreeMap::new()),
                inflight,
            }),
        }
    }

    /// Get or create the single-flight slot for a key.
    pub(crate) fn slot(&self, key: &EntryKey) -> Slot {
        let mut slots = self.inner.slots.lock();
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Register an entry that was constructed outside resolution
    /// (`create_live`), so later resolutions in this context return it.
    pub(crate) fn seed(&self, entry: LiveRef) {
        let key = entry.key().clone();
        let slot = Arc::new(OnceCell::new_with(Some(Some(entry))));
        self.inner.slots.lock().insert(key, slot);
    }

    /// The entry registered for a key, if one has been constructed.
    ///
    /// May return an entry that is still loading.
    #[must_use]
    pub fn get(&self, key: &EntryKey) -> Option<LiveRef> {
        self.inner
            .slots
            .lock()
            .get(key)
            .and_then(|slot| slot.get().cloned().flatten())
    }

    /// Check if an entry has been constructed for a key.
    #[must_use]
    pub fn contains(&self, key: &EntryKey) -> bool {
        self.get(key).is_some()
    }

    /// Every entry constructed so far, in key order.
    #[must_use]
    pub fn entries(&self) -> Vec<LiveRef> {
        self.inner
            .slots
            .lock()
            .values()
            .filter_map(|slot| slot.get().cloned().flatten())
            .collect()
    }

    /// Number of entries constructed so far (confirmed misses excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Check if nothing has been constructed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if two handles share one identity map.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // LOAD ACCOUNTING
    // =========================================================================

    /// Number of entry loads currently in flight.
    #[must_use]
    pub fn inflight(&self) -> usize {
        *self.inner.inflight.borrow()
    }

    /// Mark a load as started. The returned guard marks it finished on drop,
    /// including when the load future is cancelled.
    pub(crate) fn begin_load(&self) -> LoadGuard {
        self.inner.inflight.send_modify(|n| *n = n.saturating_add(1));
        LoadGuard {
            inflight: self.inner.inflight.clone(),
        }
    }

    /// Wait until no load is in flight in this context.
    pub async fn settled(&self) {
        let mut rx = self.inner.inflight.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Decrements the in-flight counter when a load finishes.
pub(crate) struct LoadGuard {
    inflight: watch::Sender<usize>,
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.inflight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

// =============================================================================
// TESTS
// =============================================================================
