//! Fixed-capacity associative container.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ FixedMap<K, V, N>                            │
//! │  [0] (k0, v0)   ← oldest key                 │
//! │  [1] (k1, v1)                                │
//! │  ...                                         │
//! │  [len-1]        ← most recently added key    │
//! │  [len..N)       unused, never allocated      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Entries live in a `heapless::Vec`, so the map never allocates and never
//! grows past `N`.  Lookup is a linear scan, which beats hashing at the
//! sizes used here (a request holds at most 24 fields, the mode table 3).
//!
//! Key comparison is delegated to a [`KeyEq`] strategy type.  The default
//! [`ByValue`] strategy uses `PartialEq`, and also lets callers probe with
//! a borrowed form of the key (e.g. `&str` against `heapless::String<N>`).

use core::fmt;
use core::marker::PhantomData;

// ───────────────────────────────────────────────────────────────
// Key equality strategy
// ───────────────────────────────────────────────────────────────

/// Equality predicate used to match a stored key against a probe.
pub trait KeyEq<K, Q: ?Sized = K> {
    fn key_eq(stored: &K, probe: &Q) -> bool;
}

/// Plain `PartialEq` comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByValue;

impl<K, Q> KeyEq<K, Q> for ByValue
where
    K: PartialEq<Q>,
    Q: ?Sized,
{
    fn key_eq(stored: &K, probe: &Q) -> bool {
        stored == probe
    }
}

// ───────────────────────────────────────────────────────────────
// FixedMap
// ───────────────────────────────────────────────────────────────

/// Bounded, insertion-ordered key → value map.
pub struct FixedMap<K, V, const N: usize, E = ByValue> {
    entries: heapless::Vec<(K, V), N>,
    _eq: PhantomData<fn() -> E>,
}

impl<K, V, const N: usize, E> FixedMap<K, V, N, E> {
    pub const fn new() -> Self {
        Self {
            entries: heapless::Vec::new(),
            _eq: PhantomData,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Position of `probe` in the entry list, if present.
    fn index_of<Q>(&self, probe: &Q) -> Option<usize>
    where
        Q: ?Sized,
        E: KeyEq<K, Q>,
    {
        self.entries.iter().position(|(k, _)| E::key_eq(k, probe))
    }

    /// Insert or update.
    ///
    /// An existing key keeps its position and gets the new value.  A new
    /// key is appended.  Returns `false` only when the map is full and
    /// `key` is not already present; the entry is then dropped and the
    /// map is left untouched.
    pub fn put(&mut self, key: K, value: V) -> bool
    where
        E: KeyEq<K>,
    {
        if let Some(idx) = self.index_of(&key) {
            self.entries[idx].1 = value;
            return true;
        }
        self.entries.push((key, value)).is_ok()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        Q: ?Sized,
        E: KeyEq<K, Q>,
    {
        self.index_of(key).map(|idx| &self.entries[idx].1)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        Q: ?Sized,
        E: KeyEq<K, Q>,
    {
        self.index_of(key).map(|idx| &mut self.entries[idx].1)
    }

    pub fn has<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized,
        E: KeyEq<K, Q>,
    {
        self.index_of(key).is_some()
    }

    /// Remove `key`, shifting later entries left.  Returns `false` if the
    /// key was not present.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        Q: ?Sized,
        E: KeyEq<K, Q>,
    {
        match self.index_of(key) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }
}

impl<K, V, const N: usize, E> Default for FixedMap<K, V, N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone, V: Clone, const N: usize, E> Clone for FixedMap<K, V, N, E> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            _eq: PhantomData,
        }
    }
}

/// Order-sensitive: two maps are equal when they hold the same pairs in
/// the same insertion order.
impl<K: PartialEq, V: PartialEq, const N: usize, E> PartialEq for FixedMap<K, V, N, E> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: Eq, V: Eq, const N: usize, E> Eq for FixedMap<K, V, N, E> {}

impl<K: fmt::Debug, V: fmt::Debug, const N: usize, E> fmt::Debug for FixedMap<K, V, N, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
