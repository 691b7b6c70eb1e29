//! Identity keys for caches.
//!
//! Raw facts are shared `Rc` values handed over by backends. Two raw facts
//! may be structurally equal and still be different facts, so caches key on
//! pointer identity rather than on value equality:
//!
//! - [`IdKey`] wraps one `Rc` and hashes/compares by address
//! - [`ContextKey`] pairs a fact with the context it was reached from, for
//!   facts that may be shared between several enclosing nodes
//!
//! A key holds a strong reference to its fact. While the key sits in a cache
//! the address cannot be freed and handed to an unrelated fact.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

// ============================================================================
// IdKey
// ============================================================================

/// Reference-identity key over a shared value.
pub struct IdKey<T: ?Sized>(Rc<T>);

impl<T: ?Sized> IdKey<T> {
    /// Wrap a shared value.
    pub fn new(value: &Rc<T>) -> Self {
        IdKey(Rc::clone(value))
    }

    /// Get the wrapped value.
    pub fn get(&self) -> &Rc<T> {
        &self.0
    }

    /// Address used for hashing and equality.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl<T: ?Sized> Clone for IdKey<T> {
    fn clone(&self) -> Self {
        IdKey(Rc::clone(&self.0))
    }
}

impl<T: ?Sized> PartialEq for IdKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl<T: ?Sized> Eq for IdKey<T> {}

impl<T: ?Sized> Hash for IdKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for IdKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdKey({:#x})", self.addr())
    }
}

// ============================================================================
// ContextKey
// ============================================================================

/// Composite identity: a raw fact as reached from one context.
///
/// The context is a plain value (an enclosing node, a position), the fact is
/// compared by identity.
pub struct ContextKey<C, T: ?Sized> {
    context: C,
    fact: IdKey<T>,
}

impl<C, T: ?Sized> ContextKey<C, T> {
    /// Create a key for `fact` seen from `context`.
    pub fn new(context: C, fact: &Rc<T>) -> Self {
        ContextKey {
            context,
            fact: IdKey::new(fact),
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn fact(&self) -> &Rc<T> {
        self.fact.get()
    }
}

impl<C: Clone, T: ?Sized> Clone for ContextKey<C, T> {
    fn clone(&self) -> Self {
        ContextKey {
            context: self.context.clone(),
            fact: self.fact.clone(),
        }
    }
}

impl<C: PartialEq, T: ?Sized> PartialEq for ContextKey<C, T> {
    fn eq(&self, other: &Self) -> bool {
        self.context == other.context && self.fact == other.fact
    }
}

impl<C: Eq, T: ?Sized> Eq for ContextKey<C, T> {}

impl<C: Hash, T: ?Sized> Hash for ContextKey<C, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.context.hash(state);
        self.fact.hash(state);
    }
}

impl<C: fmt::Debug, T: ?Sized> fmt::Debug for ContextKey<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextKey")
            .field("context", &self.context)
            .field("fact", &self.fact)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, PartialEq)]
    struct Fact(&'static str);

    mod id_key_tests {
        use super::*;

        #[test]
        fn equal_values_are_distinct_keys() {
            let a = Rc::new(Fact("foo"));
            let b = Rc::new(Fact("foo"));
            assert_eq!(*a, *b);
            assert_ne!(IdKey::new(&a), IdKey::new(&b));
        }

        #[test]
        fn clones_of_one_rc_are_the_same_key() {
            let a = Rc::new(Fact("foo"));
            let alias = Rc::clone(&a);
            assert_eq!(IdKey::new(&a), IdKey::new(&alias));
        }

        #[test]
        fn works_as_map_key() {
            let a = Rc::new(Fact("a"));
            let b = Rc::new(Fact("a"));
            let mut map = HashMap::new();
            map.insert(IdKey::new(&a), 1);
            map.insert(IdKey::new(&b), 2);
            assert_eq!(map.len(), 2);
            assert_eq!(map.get(&IdKey::new(&a)), Some(&1));
        }

        #[test]
        fn key_keeps_fact_alive() {
            let a = Rc::new(Fact("kept"));
            let key = IdKey::new(&a);
            drop(a);
            assert_eq!(key.get().0, "kept");
        }
    }

    mod context_key_tests {
        use super::*;

        #[test]
        fn same_fact_in_different_contexts_differs() {
            let shared = Rc::new(Fact("String"));
            let k1 = ContextKey::new(1u32, &shared);
            let k2 = ContextKey::new(2u32, &shared);
            assert_ne!(k1, k2);
            assert_eq!(k1, ContextKey::new(1u32, &shared));
        }

        #[test]
        fn accessors() {
            let fact = Rc::new(Fact("x"));
            let key = ContextKey::new((7u32, 0usize), &fact);
            assert_eq!(key.context(), &(7, 0));
            assert!(Rc::ptr_eq(key.fact(), &fact));
        }
    }
}
