//! Identity caches and the registry that clears them.
//!
//! Every materialization factory owns one [`ObjectCache`]. All caches are
//! created through a [`CacheRegistry`], which is the single invalidation
//! point: [`CacheRegistry::clear`] empties every registered cache and starts
//! a new generation.
//!
//! A registry belongs to one session and is never shared across threads;
//! the interior mutability here is `RefCell`/`Cell`, not locks.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use tracing::debug;

// ============================================================================
// Clearable
// ============================================================================

/// A cache that can be emptied by its registry.
pub trait Clearable {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Number of live entries.
    fn len(&self) -> usize;

    /// Drop every entry.
    fn clear(&self);

    /// True if the cache holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// ObjectCache
// ============================================================================

struct CacheStore<K, V> {
    name: &'static str,
    entries: RefCell<HashMap<K, V>>,
}

impl<K: Eq + Hash, V> Clearable for CacheStore<K, V> {
    fn name(&self) -> &str {
        self.name
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

/// Handle to one registered cache.
///
/// Handles are cheap to clone and all clones see the same entries.
pub struct ObjectCache<K, V> {
    store: Rc<CacheStore<K, V>>,
}

impl<K, V> Clone for ObjectCache<K, V> {
    fn clone(&self) -> Self {
        ObjectCache {
            store: Rc::clone(&self.store),
        }
    }
}

impl<K: Eq + Hash, V: Clone> ObjectCache<K, V> {
    /// Look up a cached value.
    pub fn get(&self, key: &K) -> Option<V> {
        self.store.entries.borrow().get(key).cloned()
    }

    /// Insert a value, returning the one that is now cached.
    ///
    /// An existing entry wins over `value`.
    pub fn insert(&self, key: K, value: V) -> V {
        self.store
            .entries
            .borrow_mut()
            .entry(key)
            .or_insert(value)
            .clone()
    }

    /// Return the cached value or compute and cache it.
    ///
    /// No borrow is held while `make` runs, so `make` may use this cache
    /// (or any other) for other keys.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = make();
        self.insert(key, value)
    }

    /// True if `key` is cached.
    pub fn contains(&self, key: &K) -> bool {
        self.store.entries.borrow().contains_key(key)
    }

    /// Cache name.
    pub fn name(&self) -> &'static str {
        self.store.name
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.store.entries.borrow().len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> fmt::Debug for ObjectCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCache")
            .field("name", &self.store.name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// CacheRegistry
// ============================================================================

/// Session-scoped list of live caches.
pub struct CacheRegistry {
    caches: RefCell<Vec<Rc<dyn Clearable>>>,
    generation: Cell<u32>,
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheRegistry {
    /// Create an empty registry at generation 0.
    pub fn new() -> Self {
        CacheRegistry {
            caches: RefCell::new(Vec::new()),
            generation: Cell::new(0),
        }
    }

    /// Create and register a new cache.
    pub fn register<K, V>(&self, name: &'static str) -> ObjectCache<K, V>
    where
        K: Eq + Hash + 'static,
        V: 'static,
    {
        let store = Rc::new(CacheStore {
            name,
            entries: RefCell::new(HashMap::new()),
        });
        self.caches
            .borrow_mut()
            .push(Rc::clone(&store) as Rc<dyn Clearable>);
        ObjectCache { store }
    }

    /// Current cache generation.
    pub fn generation(&self) -> u32 {
        self.generation.get()
    }

    /// Number of registered caches.
    pub fn cache_count(&self) -> usize {
        self.caches.borrow().len()
    }

    /// Total entries across all caches.
    pub fn entry_count(&self) -> usize {
        self.caches.borrow().iter().map(|c| c.len()).sum()
    }

    /// Clear every registered cache and advance the generation.
    ///
    /// Values handed out before this call belong to the previous generation
    /// and must not be dereferenced afterwards.
    pub fn clear(&self) {
        let dropped = self.entry_count();
        for cache in self.caches.borrow().iter() {
            cache.clear();
        }
        let next = self.generation.get().wrapping_add(1);
        self.generation.set(next);
        debug!(generation = next, dropped, "cleared object caches");
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .caches
            .borrow()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        f.debug_struct("CacheRegistry")
            .field("generation", &self.generation.get())
            .field("caches", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdKey;

    mod object_cache_tests {
        use super::*;

        #[test]
        fn get_or_insert_computes_once() {
            let registry = CacheRegistry::new();
            let cache: ObjectCache<&'static str, u32> = registry.register("numbers");
            let mut calls = 0;
            let first = cache.get_or_insert_with("a", || {
                calls += 1;
                10
            });
            let second = cache.get_or_insert_with("a", || {
                calls += 1;
                20
            });
            assert_eq!(first, 10);
            assert_eq!(second, 10);
            assert_eq!(calls, 1);
        }

        #[test]
        fn existing_entry_wins_on_insert() {
            let registry = CacheRegistry::new();
            let cache: ObjectCache<u32, u32> = registry.register("ints");
            assert_eq!(cache.insert(1, 5), 5);
            assert_eq!(cache.insert(1, 6), 5);
        }

        #[test]
        fn reentrant_use_does_not_panic() {
            let registry = CacheRegistry::new();
            let cache: ObjectCache<u32, u32> = registry.register("reentrant");
            let inner = cache.clone();
            let value = cache.get_or_insert_with(1, || inner.get_or_insert_with(2, || 7) + 1);
            assert_eq!(value, 8);
            assert_eq!(cache.len(), 2);
        }

        #[test]
        fn identity_keyed_cache() {
            let registry = CacheRegistry::new();
            let cache: ObjectCache<IdKey<String>, usize> = registry.register("facts");
            let a = Rc::new("Foo".to_string());
            let b = Rc::new("Foo".to_string());
            cache.insert(IdKey::new(&a), 0);
            assert!(cache.contains(&IdKey::new(&a)));
            assert!(!cache.contains(&IdKey::new(&b)));
        }
    }

    mod registry_tests {
        use super::*;

        #[test]
        fn clear_empties_every_cache() {
            let registry = CacheRegistry::new();
            let a: ObjectCache<u32, u32> = registry.register("a");
            let b: ObjectCache<String, u32> = registry.register("b");
            a.insert(1, 1);
            b.insert("x".to_string(), 2);
            assert_eq!(registry.cache_count(), 2);
            assert_eq!(registry.entry_count(), 2);

            registry.clear();

            assert!(a.is_empty());
            assert!(b.is_empty());
            assert_eq!(registry.entry_count(), 0);
        }

        #[test]
        fn clear_advances_generation() {
            let registry = CacheRegistry::new();
            assert_eq!(registry.generation(), 0);
            registry.clear();
            registry.clear();
            assert_eq!(registry.generation(), 2);
        }

        #[test]
        fn cleared_cache_recomputes() {
            let registry = CacheRegistry::new();
            let cache: ObjectCache<u32, u32> = registry.register("c");
            cache.get_or_insert_with(1, || 1);
            registry.clear();
            assert_eq!(cache.get_or_insert_with(1, || 2), 2);
        }
    }
}
