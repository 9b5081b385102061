//! Reference-counted, non-owning resource handle and the shared-reader /
//! exclusive-writer table that hands them out.
//!
//! The resource manager's caching and pool-accounting internals are out of
//! scope here; what's specified is its locking discipline (`get` is shared,
//! registration/load/unload are exclusive) and the handle shape every
//! borrower gets back, grounded in the atomic strong-count pattern used for
//! back-references elsewhere in this crate (see [`crate::sequence`]).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::status::Status;

/// A reference-counted, non-owning handle to a `T` held by some owner. The
/// owner publishes an atomic strong count; handles bump it on clone and
/// decrement it on drop. An owner that wants the "destroy while referenced
/// is a precondition violation" behavior asserts the count is zero at its
/// own teardown — in practice `Arc` already makes that state unreachable,
/// so this type exists for cases needing a visible strong-count (e.g.
/// pool accounting) rather than pure ownership.
pub struct RefCounted<T> {
    value: Arc<T>,
    strong: Arc<AtomicU64>,
}

impl<T> RefCounted<T> {
    pub fn new(value: T) -> Self {
        let strong = Arc::new(AtomicU64::new(0));
        RefCounted {
            value: Arc::new(value),
            strong,
        }
    }

    pub fn handle(&self) -> ResourceHandle<T> {
        self.strong.fetch_add(1, Ordering::AcqRel);
        ResourceHandle {
            value: Arc::clone(&self.value),
            strong: Arc::clone(&self.strong),
        }
    }

    pub fn strong_count(&self) -> u64 {
        self.strong.load(Ordering::Acquire)
    }

    /// Spin-waits until no outstanding handles remain, matching the
    /// resource manager's unload discipline.
    pub fn wait_for_drain(&self) {
        while self.strong_count() > 0 {
            std::hint::spin_loop();
        }
    }
}

pub struct ResourceHandle<T> {
    value: Arc<T>,
    strong: Arc<AtomicU64>,
}

impl<T> std::ops::Deref for ResourceHandle<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        self.strong.fetch_add(1, Ordering::AcqRel);
        ResourceHandle {
            value: Arc::clone(&self.value),
            strong: Arc::clone(&self.strong),
        }
    }
}

impl<T> Drop for ResourceHandle<T> {
    fn drop(&mut self) {
        self.strong.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Loads a `T` given an opaque key (resource id or URI). Implemented by
/// callers; the resource table only governs locking, not loading policy.
pub trait Loader<K, T> {
    fn load(&self, key: &K) -> Result<T, Status>;
}

/// Shared-reader / exclusive-writer table mapping keys to ref-counted
/// resources. `get` takes a read lock; `register`/`unload` take a write
/// lock, matching `ResourceManager::Get` vs `MapIDToURI`/pool mutation.
pub struct ResourceTable<K, T> {
    entries: RwLock<HashMap<K, RefCounted<T>>>,
}

impl<K: std::hash::Hash + Eq + Clone, T> ResourceTable<K, T> {
    pub fn new() -> Self {
        ResourceTable {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<ResourceHandle<T>> {
        let entries = self.entries.read().expect("resource table lock poisoned");
        entries.get(key).map(|entry| entry.handle())
    }

    pub fn get_or_load<L: Loader<K, T>>(&self, key: &K, loader: &L) -> Result<ResourceHandle<T>, Status> {
        if let Some(handle) = self.get(key) {
            return Ok(handle);
        }
        let value = loader.load(key)?;
        let mut entries = self.entries.write().expect("resource table lock poisoned");
        let entry = entries.entry(key.clone()).or_insert_with(|| RefCounted::new(value));
        Ok(entry.handle())
    }

    /// Removes `key` from the table. Fails with `failed_precondition` if
    /// live handles remain, matching the resource manager's "unload only
    /// when no strong refs exist" rule rather than silently invalidating
    /// handles callers still hold.
    pub fn unload(&self, key: &K) -> Result<(), Status> {
        let mut entries = self.entries.write().expect("resource table lock poisoned");
        if let Some(entry) = entries.get(key) {
            if entry.strong_count() > 0 {
                return Err(Status::failed_precondition("cannot unload a resource with live handles"));
            }
        }
        entries.remove(key);
        Ok(())
    }
}

impl<K: std::hash::Hash + Eq + Clone, T> Default for ResourceTable<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstLoader(u32);
    impl Loader<u64, u32> for ConstLoader {
        fn load(&self, _key: &u64) -> Result<u32, Status> {
            Ok(self.0)
        }
    }

    #[test]
    fn get_or_load_caches_across_calls() {
        let table: ResourceTable<u64, u32> = ResourceTable::new();
        let loader = ConstLoader(42);
        let a = table.get_or_load(&1, &loader).unwrap();
        let b = table.get_or_load(&1, &loader).unwrap();
        assert_eq!(*a, 42);
        assert_eq!(*b, 42);
    }

    #[test]
    fn unload_refuses_while_handle_alive() {
        let table: ResourceTable<u64, u32> = ResourceTable::new();
        let loader = ConstLoader(7);
        let handle = table.get_or_load(&1, &loader).unwrap();
        assert!(table.unload(&1).is_err());
        drop(handle);
        assert!(table.unload(&1).is_ok());
    }

    #[test]
    fn strong_count_tracks_live_handles() {
        let resource = RefCounted::new(5u32);
        assert_eq!(resource.strong_count(), 0);
        let h1 = resource.handle();
        let h2 = h1.clone();
        assert_eq!(resource.strong_count(), 2);
        drop(h1);
        assert_eq!(resource.strong_count(), 1);
        drop(h2);
        assert_eq!(resource.strong_count(), 0);
    }
}
