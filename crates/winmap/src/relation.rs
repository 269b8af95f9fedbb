//! A general-purpose integrity-checked bidirectional map, used by the
//! [`crate::Manager`] for `path_index`, `region_index` and `cursor_index`.
//!
//! Every successful [`Relation::put`] and [`Relation::hit`] moves the
//! touched entry to the most-recently-used end of an intrusive ordering, so
//! the same structure that gives `O(1)` key/value lookup also gives `O(1)`
//! "who is the eviction victim" iteration via [`Relation::iter_lru`].

use std::collections::HashMap;
use std::hash::Hash;

use thiserror::Error;

/// Flags describing the constraints a [`Relation`] enforces.
///
/// `null_keys`/`null_values` are threaded through for fidelity with the
/// design this type is modeled on, but none of the three indexes the
/// manager builds ever insert an `Option`-shaped null key or value, so
/// they are not currently exercised by any caller in this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationConfig {
    pub one_to_one: bool,
    pub null_keys: bool,
    pub null_values: bool,
}

impl RelationConfig {
    pub const fn one_to_one() -> Self {
        Self { one_to_one: true, null_keys: false, null_values: false }
    }

    pub const fn many_to_one() -> Self {
        Self { one_to_one: false, null_keys: false, null_values: false }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RelationError {
    #[error("key already present")]
    DuplicateKey,
    #[error("value already present in a one-to-one relation")]
    DuplicateValue,
    #[error("key not found")]
    KeyNotFound,
    #[error("one-to-one inverse mapping does not point back to the given key")]
    InverseMismatch,
}

#[derive(Clone)]
struct Slot<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// A bidirectional `K <-> V` map maintained in least-recently-used order.
///
/// Internally this is an arena of slots linked into an intrusive doubly
/// linked list (oldest at `head`, most-recently-touched at `tail`), paired
/// with hash maps from key/value to slot index. `hit` and eviction
/// traversal are both `O(1)` amortized, independent of how many entries are
/// currently referenced elsewhere — the property the design notes in
/// spec.md ask for.
#[derive(Clone)]
pub struct Relation<K, V> {
    config: RelationConfig,
    slots: Vec<Option<Slot<K, V>>>,
    free: Vec<usize>,
    by_key: HashMap<K, usize>,
    by_value: Option<HashMap<V, usize>>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K, V> Relation<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone + Eq + Hash,
{
    pub fn new(config: RelationConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            free: Vec::new(),
            by_key: HashMap::new(),
            by_value: config.one_to_one.then(HashMap::new),
            head: None,
            tail: None,
        }
    }

    pub fn config(&self) -> RelationConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let idx = *self.by_key.get(key)?;
        self.slots[idx].as_ref().map(|s| &s.value)
    }

    /// Inserts `key -> value`. Fails without modifying the map if `key` is
    /// already present, or (when `one_to_one`) if `value` is already mapped
    /// by a different key.
    pub fn put(&mut self, key: K, value: V) -> Result<(), RelationError> {
        if self.by_key.contains_key(&key) {
            return Err(RelationError::DuplicateKey);
        }
        if let Some(by_value) = &self.by_value
            && by_value.contains_key(&value)
        {
            return Err(RelationError::DuplicateValue);
        }

        let idx = self.alloc_slot(Slot { key: key.clone(), value: value.clone(), prev: None, next: None });
        self.link_at_tail(idx);
        self.by_key.insert(key, idx);
        if let Some(by_value) = &mut self.by_value {
            by_value.insert(value, idx);
        }
        Ok(())
    }

    /// Removes `key`, returning its value. Fails if `key` is absent, or
    /// (when `one_to_one`) if the value's inverse mapping does not point
    /// back to this exact key — which would indicate index corruption.
    pub fn take(&mut self, key: &K) -> Result<V, RelationError> {
        let idx = *self.by_key.get(key).ok_or(RelationError::KeyNotFound)?;

        if let Some(by_value) = &self.by_value {
            let value = &self.slots[idx].as_ref().unwrap().value;
            if by_value.get(value) != Some(&idx) {
                return Err(RelationError::InverseMismatch);
            }
        }

        self.unlink(idx);
        let slot = self.slots[idx].take().expect("slot present for indexed key");
        self.by_key.remove(key);
        if let Some(by_value) = &mut self.by_value {
            by_value.remove(&slot.value);
        }
        self.free.push(idx);
        Ok(slot.value)
    }

    /// Moves `key` to the most-recently-used end of the ordering.
    pub fn hit(&mut self, key: &K) -> Result<(), RelationError> {
        let idx = *self.by_key.get(key).ok_or(RelationError::KeyNotFound)?;
        self.unlink(idx);
        self.link_at_tail(idx);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.by_key.clear();
        if let Some(by_value) = &mut self.by_value {
            by_value.clear();
        }
        self.head = None;
        self.tail = None;
    }

    /// Iterates `(key, value)` pairs from least- to most-recently-used.
    pub fn iter_lru(&self) -> impl Iterator<Item = (&K, &V)> {
        let mut cur = self.head;
        std::iter::from_fn(move || {
            let idx = cur?;
            let slot = self.slots[idx].as_ref().expect("linked slot is occupied");
            cur = slot.next;
            Some((&slot.key, &slot.value))
        })
    }

    /// Runs `f` against this relation, reverting all changes if it returns
    /// `Err`. On success the pre-call state is simply discarded.
    pub fn transaction<F, R, E>(&mut self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Self) -> Result<R, E>,
    {
        let snapshot = self.clone();
        match f(self) {
            Ok(r) => Ok(r),
            Err(e) => {
                *self = snapshot;
                Err(e)
            }
        }
    }

    fn alloc_slot(&mut self, slot: Slot<K, V>) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(slot);
            idx
        } else {
            self.slots.push(Some(slot));
            self.slots.len() - 1
        }
    }

    fn link_at_tail(&mut self, idx: usize) {
        let old_tail = self.tail;
        {
            let slot = self.slots[idx].as_mut().unwrap();
            slot.prev = old_tail;
            slot.next = None;
        }
        if let Some(old_tail) = old_tail {
            self.slots[old_tail].as_mut().unwrap().next = Some(idx);
        } else {
            self.head = Some(idx);
        }
        self.tail = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let slot = self.slots[idx].as_ref().unwrap();
            (slot.prev, slot.next)
        };
        match prev {
            Some(p) => self.slots[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }
}
