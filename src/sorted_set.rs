//! Sorted set: a name hash map layered over an order-statistic AVL tree
//! keyed by `(score, name)`, giving O(log n) add/remove/score-lookup plus
//! rank-based range queries.

use crate::avl::{self, Arena};
use crate::hash::hash_bytes;
use crate::map::HashMap;

pub struct SortedSet {
    arena: Arena,
    names: HashMap<u32>,
    root: Option<u32>,
}

impl Default for SortedSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SortedSet {
    pub fn new() -> Self {
        SortedSet { arena: Arena::new(), names: HashMap::new(), root: None }
    }

    /// Builds a set whose name index paces rehashing per `rehash_batch_size`/
    /// `rehash_load_factor`, per [`Configuration`](crate::config::Configuration).
    pub fn with_config(rehash_batch_size: usize, rehash_load_factor: usize) -> Self {
        SortedSet {
            arena: Arena::new(),
            names: HashMap::with_config(rehash_batch_size, rehash_load_factor),
            root: None,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn find_index(&mut self, name: &[u8]) -> Option<u32> {
        let hash = hash_bytes(name);
        let arena = &self.arena;
        self.names.lookup(hash, |idx: &u32| arena.get(*idx).name == name).copied()
    }

    /// Inserts `name` at `score`, or moves it if already present. Returns
    /// `true` if this created a new member.
    pub fn add(&mut self, name: &[u8], score: f64) -> bool {
        match self.find_index(name) {
            Some(idx) => {
                if self.arena.get(idx).score != score {
                    self.root = avl::delete(&mut self.arena, idx);
                    self.arena.get_mut(idx).score = score;
                    self.root = Some(avl::insert(&mut self.arena, self.root, idx));
                }
                false
            }
            None => {
                let idx = self.arena.alloc(name.to_vec(), score);
                self.names.insert(hash_bytes(name), idx);
                self.root = Some(avl::insert(&mut self.arena, self.root, idx));
                true
            }
        }
    }

    /// Removes `name`, returning `true` if it was present.
    pub fn remove(&mut self, name: &[u8]) -> bool {
        let idx = match self.find_index(name) {
            Some(idx) => idx,
            None => return false,
        };
        let hash = hash_bytes(name);
        self.names.delete(hash, |i: &u32| *i == idx);
        self.root = avl::delete(&mut self.arena, idx);
        self.arena.free(idx);
        true
    }

    pub fn score(&mut self, name: &[u8]) -> Option<f64> {
        let idx = self.find_index(name)?;
        Some(self.arena.get(idx).score)
    }

    /// Starting from the smallest member `>= (score, name)`, skips `offset`
    /// members and returns up to `limit` tagged items (name and score each
    /// count as one item, matching the client-visible array length).
    pub fn query(&self, score: f64, name: &[u8], offset: i64, limit: i64) -> Vec<(Vec<u8>, f64)> {
        let mut node = avl::seek_ge(&self.arena, self.root, score, name);
        if offset != 0 {
            node = node.and_then(|idx| avl::offset(&self.arena, idx, offset));
        }

        let mut out = Vec::new();
        let mut emitted: i64 = 0;
        while let Some(idx) = node {
            if emitted >= limit {
                break;
            }
            let n = self.arena.get(idx);
            out.push((n.name.clone(), n.score));
            emitted += 2;
            node = avl::offset(&self.arena, idx, 1);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_score_and_remove() {
        let mut set = SortedSet::new();
        assert!(set.add(b"alice", 1.0));
        assert!(set.add(b"bob", 2.0));
        assert!(!set.add(b"alice", 3.0)); // re-add moves, doesn't recreate
        assert_eq!(set.score(b"alice"), Some(3.0));
        assert_eq!(set.len(), 2);

        assert!(set.remove(b"bob"));
        assert!(!set.remove(b"bob"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.score(b"bob"), None);
    }

    #[test]
    fn query_orders_by_score_then_name() {
        let mut set = SortedSet::new();
        set.add(b"c", 1.0);
        set.add(b"a", 1.0);
        set.add(b"b", 1.0);
        set.add(b"z", 2.0);

        let got = set.query(0.0, b"", 0, 100);
        assert_eq!(
            got,
            vec![
                (b"a".to_vec(), 1.0),
                (b"b".to_vec(), 1.0),
                (b"c".to_vec(), 1.0),
                (b"z".to_vec(), 2.0),
            ]
        );
    }

    #[test]
    fn query_limit_counts_tagged_items_not_pairs() {
        let mut set = SortedSet::new();
        for i in 0..5 {
            set.add(format!("m{i}").as_bytes(), i as f64);
        }
        // limit=4 allows at most two (name, score) pairs.
        let got = set.query(0.0, b"", 0, 4);
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn query_offset_skips_members() {
        let mut set = SortedSet::new();
        for i in 0..10 {
            set.add(format!("m{i}").as_bytes(), i as f64);
        }
        let got = set.query(0.0, b"", 3, 2);
        assert_eq!(got, vec![(b"m3".to_vec(), 3.0), (b"m4".to_vec(), 4.0)]);
    }

    #[test]
    fn add_and_remove_survive_many_members() {
        let mut set = SortedSet::new();
        for i in 0..2000 {
            assert!(set.add(format!("k{i}").as_bytes(), i as f64));
        }
        assert_eq!(set.len(), 2000);
        for i in (0..2000).step_by(2) {
            assert!(set.remove(format!("k{i}").as_bytes()));
        }
        assert_eq!(set.len(), 1000);
        for i in (1..2000).step_by(2) {
            assert_eq!(set.score(format!("k{i}").as_bytes()), Some(i as f64));
        }
    }
}
