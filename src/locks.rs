//! Per-collection mutual exclusion
//!
//! Every build and every eviction of a collection runs while holding that
//! collection's named mutex. Mutexes are created lazily on first use and never
//! removed, so acquiring the lock of a collection that does not exist is
//! always safe.

use crate::types::CollectionName;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One named lock plus a flag observers can read without contending on it
#[derive(Default)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    held: Arc<AtomicBool>,
}

/// Registry of named collection locks (cheap to clone, shared state)
#[derive(Clone, Default)]
pub struct CollectionLocks {
    inner: Arc<Mutex<HashMap<CollectionName, Slot>>>,
}

/// Exclusive hold on one collection; released on drop
#[derive(Debug)]
pub struct CollectionGuard {
    name: CollectionName,
    held: Arc<AtomicBool>,
    _guard: OwnedMutexGuard<()>,
}

impl CollectionGuard {
    fn new(name: &CollectionName, held: Arc<AtomicBool>, guard: OwnedMutexGuard<()>) -> Self {
        held.store(true, Ordering::Release);
        tracing::trace!(collection = %name, "collection lock acquired");
        Self {
            name: name.clone(),
            held,
            _guard: guard,
        }
    }

    /// Collection this guard protects
    pub fn name(&self) -> &CollectionName {
        &self.name
    }
}

impl Drop for CollectionGuard {
    fn drop(&mut self) {
        // Cleared while the mutex is still held, so the next holder sets it after us
        self.held.store(false, Ordering::Release);
    }
}

impl CollectionLocks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, name: &CollectionName) -> (Arc<AsyncMutex<()>>, Arc<AtomicBool>) {
        // The map only ever grows; a poisoned map is still consistent
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let slot = map.entry(name.clone()).or_default();
        (Arc::clone(&slot.mutex), Arc::clone(&slot.held))
    }

    /// Wait until the collection lock is free, then take it
    pub async fn lock(&self, name: &CollectionName) -> CollectionGuard {
        let (mutex, held) = self.handle(name);
        let guard = mutex.lock_owned().await;
        CollectionGuard::new(name, held, guard)
    }

    /// Take the collection lock only if nobody holds it
    pub fn try_lock(&self, name: &CollectionName) -> Option<CollectionGuard> {
        let (mutex, held) = self.handle(name);
        let guard = mutex.try_lock_owned().ok()?;
        Some(CollectionGuard::new(name, held, guard))
    }

    /// Whether the collection lock is currently held
    ///
    /// Only observes the lock; never acquires it and never creates an entry.
    pub fn is_locked(&self, name: &CollectionName) -> bool {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(name)
            .is_some_and(|slot| slot.held.load(Ordering::Acquire))
    }

    /// Number of lock entries created so far
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no lock was ever requested
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
