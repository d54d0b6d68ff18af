use std::collections::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

struct Entry<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

/// Bounded map that evicts the least recently used entry.
///
/// Entries live in a slab; recency is a doubly linked list threaded through
/// slab indices, so no per-access allocation happens once the cache is full.
pub struct LruCache<K, V> {
    map: HashMap<K, usize, ahash::RandomState>,
    entries: Vec<Entry<K, V>>,
    head: usize,
    tail: usize,
    capacity: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            map: HashMap::with_capacity_and_hasher(capacity, ahash::RandomState::new()),
            entries: Vec::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key).map(|&i| &self.entries[i].value)
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.touch(idx);
        Some(&self.entries[idx].value)
    }

    /// Insert or replace; returns the evicted entry if the cache was full.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            self.entries[idx].value = value;
            self.touch(idx);
            return None;
        }
        if self.entries.len() < self.capacity {
            let idx = self.entries.len();
            self.entries.push(Entry { key: key.clone(), value, prev: NIL, next: NIL });
            self.map.insert(key, idx);
            self.push_front(idx);
            return None;
        }
        // Reuse the tail slot.
        let idx = self.tail;
        self.unlink(idx);
        let old_key = std::mem::replace(&mut self.entries[idx].key, key.clone());
        let old_value = std::mem::replace(&mut self.entries[idx].value, value);
        self.map.remove(&old_key);
        self.map.insert(key, idx);
        self.push_front(idx);
        Some((old_key, old_value))
    }

    /// Return the cached value, computing and inserting it on a miss.
    pub fn get_or_insert_with<F: FnOnce() -> V>(&mut self, key: K, f: F) -> &V {
        let idx = match self.map.get(&key) {
            Some(&idx) => {
                self.touch(idx);
                idx
            }
            None => {
                self.insert(key.clone(), f());
                self.map[&key]
            }
        };
        &self.entries[idx].value
    }

    /// Fallible variant of `get_or_insert_with`; errors are not cached.
    pub fn try_get_or_insert_with<E, F: FnOnce() -> Result<V, E>>(&mut self, key: K, f: F) -> Result<&V, E> {
        if !self.map.contains_key(&key) {
            let value = f()?;
            self.insert(key.clone(), value);
        }
        Ok(self.get_or_insert_with(key, || unreachable!("entry inserted above")))
    }

    fn touch(&mut self, idx: usize) {
        if self.head != idx {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.entries[idx].prev, self.entries[idx].next);
        if prev != NIL {
            self.entries[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.entries[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.entries[idx].prev = NIL;
        self.entries[idx].next = NIL;
    }

    fn push_front(&mut self, idx: usize) {
        self.entries[idx].prev = NIL;
        self.entries[idx].next = self.head;
        if self.head != NIL {
            self.entries[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }
}
