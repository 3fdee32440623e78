//! Incremental-rehash, open-chaining hash map.
//!
//! Two sub-tables (`bigger`, `smaller`) plus a migration cursor. Every
//! mutating call — and lookup, which the original also paces rehashing on —
//! performs up to `rehash_batch_size` migration steps, so no single caller
//! ever pays for a full-table resize. `rehash_batch_size` and
//! `rehash_load_factor` are per-instance, sourced from [`Configuration`] for
//! the top-level keyspace and each sorted set's name index, rather than the
//! fixed constants the original uses.
//!
//! This is the owning variant the design notes allow in place of an
//! intrusive node embedded in the caller's payload: each bucket head is
//! `Option<Box<Node<T>>>` and the map owns `T` directly.
//!
//! [`Configuration`]: crate::config::Configuration

const INITIAL_CAPACITY: usize = 4;

/// Defaults matching the original's fixed constants, used when a map is
/// built with [`HashMap::new`] rather than [`HashMap::with_config`].
pub(crate) const DEFAULT_REHASH_LOAD_FACTOR: usize = 16;
pub(crate) const DEFAULT_REHASH_BATCH_SIZE: usize = 256;

struct Node<T> {
    hash: u64,
    value: T,
    next: Option<Box<Node<T>>>,
}

struct SubTable<T> {
    slots: Vec<Option<Box<Node<T>>>>,
    mask: usize,
    len: usize,
}

impl<T> SubTable<T> {
    fn empty() -> Self {
        SubTable { slots: Vec::new(), mask: 0, len: 0 }
    }

    fn with_capacity(n: usize) -> Self {
        debug_assert!(n > 0 && (n & (n - 1)) == 0, "capacity must be a power of two");
        let mut slots = Vec::with_capacity(n);
        slots.resize_with(n, || None);
        SubTable { slots, mask: n - 1, len: 0 }
    }

    fn is_live(&self) -> bool {
        !self.slots.is_empty()
    }

    fn insert(&mut self, mut node: Box<Node<T>>) {
        let pos = (node.hash as usize) & self.mask;
        node.next = self.slots[pos].take();
        self.slots[pos] = Some(node);
        self.len += 1;
    }

    fn find(&self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Option<&T> {
        if !self.is_live() {
            return None;
        }
        let pos = (hash as usize) & self.mask;
        let mut cur = self.slots[pos].as_deref();
        while let Some(node) = cur {
            if node.hash == hash && eq(&node.value) {
                return Some(&node.value);
            }
            cur = node.next.as_deref();
        }
        None
    }

    fn find_mut(&mut self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Option<&mut T> {
        if !self.is_live() {
            return None;
        }
        let pos = (hash as usize) & self.mask;
        let mut cur = self.slots[pos].as_deref_mut();
        while let Some(node) = cur {
            if node.hash == hash && eq(&node.value) {
                return Some(&mut node.value);
            }
            cur = node.next.as_deref_mut();
        }
        None
    }

    /// Finds the link slot holding the matching node, so the caller can
    /// detach it in place (used by `delete` and by rehash migration).
    fn find_link(
        &mut self,
        hash: u64,
        mut eq: impl FnMut(&T) -> bool,
    ) -> Option<&mut Option<Box<Node<T>>>> {
        if !self.is_live() {
            return None;
        }
        let pos = (hash as usize) & self.mask;
        let mut link = &mut self.slots[pos];
        loop {
            let matches = match link.as_deref() {
                Some(node) => node.hash == hash && eq(&node.value),
                None => return None,
            };
            if matches {
                return Some(link);
            }
            link = &mut link.as_mut().unwrap().next;
        }
    }

    fn detach(link: &mut Option<Box<Node<T>>>, len: &mut usize) -> Box<Node<T>> {
        let mut node = link.take().expect("detach called on empty link");
        *link = node.next.take();
        *len -= 1;
        node
    }

    fn for_each(&self, mut f: impl FnMut(&T)) {
        for head in &self.slots {
            let mut cur = head.as_deref();
            while let Some(node) = cur {
                f(&node.value);
                cur = node.next.as_deref();
            }
        }
    }
}

/// Generic incremental-rehash hash map. `T` carries its own payload; the map
/// stores a precomputed 64-bit hash alongside it and leaves equality to the
/// caller, so the same structure backs both the top-level keyspace and a
/// sorted set's name index.
pub struct HashMap<T> {
    bigger: SubTable<T>,
    smaller: SubTable<T>,
    migrate_cursor: usize,
    rehash_batch_size: usize,
    rehash_load_factor: usize,
}

impl<T> Default for HashMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HashMap<T> {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_REHASH_BATCH_SIZE, DEFAULT_REHASH_LOAD_FACTOR)
    }

    /// Builds a map that paces rehashing at `rehash_batch_size` moves per
    /// call and resizes once `bigger`'s load exceeds `rehash_load_factor`
    /// entries per bucket, per [`Configuration`](crate::config::Configuration).
    pub fn with_config(rehash_batch_size: usize, rehash_load_factor: usize) -> Self {
        HashMap {
            bigger: SubTable::empty(),
            smaller: SubTable::empty(),
            migrate_cursor: 0,
            rehash_batch_size,
            rehash_load_factor,
        }
    }

    /// Advances the migration by up to `rehash_batch_size` steps.
    fn help_rehash(&mut self) {
        let mut moved = 0;
        while moved < self.rehash_batch_size && self.smaller.len > 0 {
            if self.smaller.slots[self.migrate_cursor].is_none() {
                self.migrate_cursor += 1;
                continue;
            }
            let link = &mut self.smaller.slots[self.migrate_cursor];
            let node = SubTable::detach(link, &mut self.smaller.len);
            self.bigger.insert(node);
            moved += 1;
        }

        if self.smaller.len == 0 && self.smaller.is_live() {
            self.smaller = SubTable::empty();
            self.migrate_cursor = 0;
        }
    }

    fn trigger_rehash_if_due(&mut self) {
        if self.smaller.is_live() || !self.bigger.is_live() {
            return;
        }
        let threshold = (self.bigger.mask + 1) * self.rehash_load_factor;
        if self.bigger.len >= threshold {
            let new_bigger = SubTable::with_capacity((self.bigger.mask + 1) * 2);
            let old = std::mem::replace(&mut self.bigger, new_bigger);
            self.smaller = old;
            self.migrate_cursor = 0;
        }
    }

    /// Looks up a node by precomputed hash and caller-supplied equality,
    /// scanning `bigger` then `smaller`. Paces rehashing like every other
    /// call, matching the original's behavior.
    pub fn lookup(&mut self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Option<&T> {
        self.help_rehash();
        match self.bigger.find(hash, &mut eq) {
            Some(_) => self.bigger.find(hash, eq),
            None => self.smaller.find(hash, eq),
        }
    }

    /// Like [`lookup`](Self::lookup), but returns a mutable reference so the
    /// caller can update a value's payload in place (e.g. a sorted set
    /// nested inside a keyspace entry) without a delete-then-reinsert.
    pub fn lookup_mut(&mut self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Option<&mut T> {
        self.help_rehash();
        let in_bigger = self.bigger.find(hash, &mut eq).is_some();
        if in_bigger {
            self.bigger.find_mut(hash, eq)
        } else {
            self.smaller.find_mut(hash, eq)
        }
    }

    /// Inserts unconditionally into `bigger`, possibly triggering a new
    /// migration, then performs this call's share of migration work.
    pub fn insert(&mut self, hash: u64, value: T) {
        if !self.bigger.is_live() {
            self.bigger = SubTable::with_capacity(INITIAL_CAPACITY);
        }
        self.bigger.insert(Box::new(Node { hash, value, next: None }));
        self.trigger_rehash_if_due();
        self.help_rehash();
    }

    pub fn delete(&mut self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Option<T> {
        self.help_rehash();
        if let Some(link) = self.bigger.find_link(hash, &mut eq) {
            let node = SubTable::detach(link, &mut self.bigger.len);
            return Some(node.value);
        }
        if let Some(link) = self.smaller.find_link(hash, &mut eq) {
            let node = SubTable::detach(link, &mut self.smaller.len);
            return Some(node.value);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.bigger.len + self.smaller.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        self.bigger.for_each(&mut f);
        self.smaller.for_each(&mut f);
    }

    pub fn clear(&mut self) {
        self.bigger = SubTable::empty();
        self.smaller = SubTable::empty();
        self.migrate_cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    fn insert_str(map: &mut HashMap<(Vec<u8>, i64)>, key: &str, value: i64) {
        map.insert(hash_bytes(key.as_bytes()), (key.as_bytes().to_vec(), value));
    }

    fn lookup_str<'a>(map: &'a mut HashMap<(Vec<u8>, i64)>, key: &str) -> Option<i64> {
        let hash = hash_bytes(key.as_bytes());
        map.lookup(hash, |(k, _)| k.as_slice() == key.as_bytes()).map(|(_, v)| *v)
    }

    fn delete_str(map: &mut HashMap<(Vec<u8>, i64)>, key: &str) -> Option<i64> {
        let hash = hash_bytes(key.as_bytes());
        map.delete(hash, |(k, _)| k.as_slice() == key.as_bytes()).map(|(_, v)| v)
    }

    #[test]
    fn insert_then_lookup() {
        let mut map = HashMap::new();
        insert_str(&mut map, "a", 1);
        insert_str(&mut map, "b", 2);
        assert_eq!(lookup_str(&mut map, "a"), Some(1));
        assert_eq!(lookup_str(&mut map, "b"), Some(2));
        assert_eq!(lookup_str(&mut map, "c"), None);
    }

    #[test]
    fn delete_removes_entry() {
        let mut map = HashMap::new();
        insert_str(&mut map, "a", 1);
        assert_eq!(delete_str(&mut map, "a"), Some(1));
        assert_eq!(lookup_str(&mut map, "a"), None);
        assert_eq!(delete_str(&mut map, "a"), None);
    }

    #[test]
    fn len_tracks_live_entries_across_rehash() {
        let mut map = HashMap::new();
        const N: usize = 5000;
        for i in 0..N {
            insert_str(&mut map, &format!("key-{i}"), i as i64);
        }
        assert_eq!(map.len(), N);
        for i in 0..N {
            assert_eq!(lookup_str(&mut map, &format!("key-{i}")), Some(i as i64));
        }
        for i in 0..N {
            assert_eq!(delete_str(&mut map, &format!("key-{i}")), Some(i as i64));
        }
        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn rehash_completes_within_bounded_calls() {
        // Crossing the load-factor threshold at capacity 4 happens at 64
        // entries; migration is capped at 256 steps per call, so a single
        // extra insert/lookup call can't finish moving a much larger table,
        // but repeated calls must make forward progress every time.
        let mut map = HashMap::new();
        for i in 0..100_000usize {
            insert_str(&mut map, &format!("k{i}"), i as i64);
        }
        assert_eq!(map.len(), 100_000);
        for i in (0..100_000usize).step_by(997) {
            assert_eq!(lookup_str(&mut map, &format!("k{i}")), Some(i as i64));
        }
    }

    #[test]
    fn for_each_visits_every_live_entry() {
        let mut map = HashMap::new();
        for i in 0..50 {
            insert_str(&mut map, &format!("x{i}"), i);
        }
        let mut seen = Vec::new();
        map.for_each(|(_, v)| seen.push(*v));
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn lookup_mut_allows_in_place_updates() {
        let mut map = HashMap::new();
        insert_str(&mut map, "a", 1);
        if let Some((_, v)) = map.lookup_mut(hash_bytes(b"a"), |(k, _)| k.as_slice() == b"a") {
            *v = 99;
        }
        assert_eq!(lookup_str(&mut map, "a"), Some(99));
    }

    #[test]
    fn clear_empties_the_map() {
        let mut map = HashMap::new();
        for i in 0..10 {
            insert_str(&mut map, &format!("y{i}"), i);
        }
        map.clear();
        assert_eq!(map.len(), 0);
        assert_eq!(lookup_str(&mut map, "y0"), None);
    }
}
