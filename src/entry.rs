//! The keyspace: a map from key bytes to a tagged value, either a plain
//! string or a sorted set.

use crate::hash::hash_bytes;
use crate::map::HashMap;
use crate::sorted_set::SortedSet;

/// A keyspace value. New variants (e.g. a list or hash type) would extend
/// this enum; commands that expect one kind reject the other with
/// `ErrorCode::BadTyp`.
pub enum Payload {
    Str(Vec<u8>),
    SortedSet(SortedSet),
}

pub struct Entry {
    pub key: Vec<u8>,
    pub payload: Payload,
}

impl Entry {
    pub fn new_str(key: Vec<u8>, value: Vec<u8>) -> Self {
        Entry { key, payload: Payload::Str(value) }
    }

    pub fn new_sorted_set(key: Vec<u8>) -> Self {
        Entry { key, payload: Payload::SortedSet(SortedSet::new()) }
    }
}

/// The top-level key -> `Entry` map, keyed by the same FNV-variant hash used
/// throughout.
pub type Keyspace = HashMap<Entry>;

pub fn keyspace_hash(key: &[u8]) -> u64 {
    hash_bytes(key)
}

pub fn key_eq<'a>(key: &'a [u8]) -> impl FnMut(&Entry) -> bool + 'a {
    move |entry: &Entry| entry.key == key
}
