//! Keyed maps and the write-buffer overlay
//!
//! [`BackedMap`] layers a front store over a backing store. Lookups consult
//! the front first; writes only ever touch the front. The front therefore
//! holds exactly the delta that still has to be persisted, while the
//! backing store mirrors what is already durable.
//!
//! Neither map does I/O and neither is thread-safe; an overlay is owned by
//! one writer at a time.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// An object that carries its own identifying key
pub trait HasKey {
    /// The key type
    type Key: Eq + Hash + Clone;

    /// The key identifying this object
    fn key(&self) -> Self::Key;
}

/// Items stored by their key, enumerated in first-insertion order
pub struct KeyedMap<T: HasKey> {
    items: HashMap<T::Key, T>,
    order: Vec<T::Key>,
}

impl<T: HasKey> KeyedMap<T> {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Create a map holding the given items (later duplicates win)
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let mut map = Self::new();
        map.put_range(items);
        map
    }

    /// Find an item by key
    pub fn find<Q>(&self, key: &Q) -> Option<&T>
    where
        T::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.items.get(key)
    }

    /// Whether an item with this key is present
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.items.contains_key(key)
    }

    /// Put an item, returning the item it replaced (if any)
    ///
    /// A replaced item keeps its original position in the enumeration order.
    pub fn put(&mut self, item: T) -> Option<T> {
        let key = item.key();
        let previous = self.items.insert(key.clone(), item);
        if previous.is_none() {
            self.order.push(key);
        }
        previous
    }

    /// Put zero or more items
    pub fn put_range(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.put(item);
        }
    }

    /// Remove an item if present
    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        let removed = self.items.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }

    /// Enumerate the stored items in first-insertion order
    pub fn items(&self) -> impl Iterator<Item = &T> + '_ {
        self.order.iter().filter_map(|key| self.items.get(key))
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: HasKey> Default for KeyedMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: HasKey> FromIterator<T> for KeyedMap<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_items(iter)
    }
}

/// A front store shadowing a read-through backing store
pub struct BackedMap<T: HasKey> {
    front: KeyedMap<T>,
    backing: KeyedMap<T>,
}

impl<T: HasKey> BackedMap<T> {
    /// Create an overlay with an empty front over the given backing map
    pub fn new(backing: KeyedMap<T>) -> Self {
        Self {
            front: KeyedMap::new(),
            backing,
        }
    }

    /// Find an item in the front store, falling back to the backing store
    pub fn find<Q>(&self, key: &Q) -> Option<&T>
    where
        T::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.front.find(key).or_else(|| self.backing.find(key))
    }

    /// Unconditionally put the item in the front store
    pub fn put(&mut self, item: T) {
        self.front.put(item);
    }

    /// Put the item in the front store only if the backing store has no
    /// entry for its key. Returns whether the item was stored.
    pub fn put_if_missing(&mut self, item: T) -> bool {
        if self.backing.contains(&item.key()) {
            false
        } else {
            self.front.put(item);
            true
        }
    }

    /// Enumerate the front store only (the delta to persist)
    pub fn items(&self) -> impl Iterator<Item = &T> + '_ {
        self.front.items()
    }

    /// Number of items in the front store
    pub fn front_len(&self) -> usize {
        self.front.len()
    }

    /// The backing store
    pub fn backing(&self) -> &KeyedMap<T> {
        &self.backing
    }

    /// Enumerate every visible item: the front store, then the backing
    /// entries it does not shadow
    pub fn visible_items(&self) -> impl Iterator<Item = &T> + '_ {
        self.front.items().chain(
            self.backing
                .items()
                .filter(|item| !self.front.contains(&item.key())),
        )
    }
}
