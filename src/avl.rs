//! Order-statistic AVL tree, arena-indexed.
//!
//! Nodes live in a growable arena (a `Vec<SetNode>` plus a free list) instead
//! of being reached through raw intrusive pointers; `left`/`right`/`parent`
//! are `Option<u32>` indices into that arena. This keeps the exact rotation,
//! fix, and offset algorithms of the source material while staying entirely
//! safe Rust (no `unsafe`, no `container_of`).
//!
//! Ordering is specific to sorted-set members: `(score, name)` under the
//! total order `a < b` iff `a.score < b.score`, or scores are equal and
//! `a.name` lexicographically precedes `b.name` (byte-wise, shorter-is-
//! smaller on equal prefix).

use std::cmp::Ordering;

/// One sorted-set member, living at a stable arena slot.
pub struct SetNode {
    pub score: f64,
    pub name: Vec<u8>,
    parent: Option<u32>,
    left: Option<u32>,
    right: Option<u32>,
    height: u32,
    cnt: u32,
}

/// Arena of sorted-set nodes with slot reuse via a free list. Indices handed
/// out by [`Arena::alloc`] stay valid (and stable) until the matching
/// [`Arena::free`] call.
#[derive(Default)]
pub struct Arena {
    nodes: Vec<SetNode>,
    free: Vec<u32>,
}

impl Arena {
    pub fn new() -> Self {
        Arena::default()
    }

    pub fn get(&self, idx: u32) -> &SetNode {
        &self.nodes[idx as usize]
    }

    pub(crate) fn get_mut(&mut self, idx: u32) -> &mut SetNode {
        &mut self.nodes[idx as usize]
    }

    /// Allocates a fresh leaf node (height 1, count 1, no links).
    pub fn alloc(&mut self, name: Vec<u8>, score: f64) -> u32 {
        let node = SetNode { score, name, parent: None, left: None, right: None, height: 1, cnt: 1 };
        if let Some(idx) = self.free.pop() {
            self.nodes[idx as usize] = node;
            idx
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as u32
        }
    }

    /// Returns a node's slot to the free list for reuse. The node must
    /// already be detached from the tree and the name hash map.
    pub fn free(&mut self, idx: u32) {
        let n = self.get_mut(idx);
        n.name = Vec::new();
        n.left = None;
        n.right = None;
        n.parent = None;
        self.free.push(idx);
    }
}

fn height(arena: &Arena, idx: Option<u32>) -> u32 {
    idx.map(|i| arena.get(i).height).unwrap_or(0)
}

fn count(arena: &Arena, idx: Option<u32>) -> u32 {
    idx.map(|i| arena.get(i).cnt).unwrap_or(0)
}

/// Subtree count of a node, including itself. Used by callers to check the
/// root-count == hash-map-size invariant.
pub fn subtree_count(arena: &Arena, idx: Option<u32>) -> u32 {
    count(arena, idx)
}

fn update(arena: &mut Arena, idx: u32) {
    let (l, r) = (arena.get(idx).left, arena.get(idx).right);
    let h = 1 + height(arena, l).max(height(arena, r));
    let c = 1 + count(arena, l) + count(arena, r);
    let n = arena.get_mut(idx);
    n.height = h;
    n.cnt = c;
}

fn cmp_value(arena: &Arena, idx: u32, score: f64, name: &[u8]) -> Ordering {
    let n = arena.get(idx);
    if n.score != score {
        return n.score.partial_cmp(&score).unwrap_or(Ordering::Equal);
    }
    let min_len = n.name.len().min(name.len());
    match n.name[..min_len].cmp(&name[..min_len]) {
        Ordering::Equal => n.name.len().cmp(&name.len()),
        other => other,
    }
}

fn less_than_value(arena: &Arena, idx: u32, score: f64, name: &[u8]) -> bool {
    cmp_value(arena, idx, score, name) == Ordering::Less
}

fn node_less(arena: &Arena, a: u32, b: u32) -> bool {
    let (score, name) = (arena.get(b).score, arena.get(b).name.clone());
    less_than_value(arena, a, score, &name)
}

fn rotate_right(arena: &mut Arena, node: u32) -> u32 {
    let parent = arena.get(node).parent;
    let new_node = arena.get(node).left.expect("rotate_right requires a left child");
    let inner = arena.get(new_node).right;

    arena.get_mut(node).left = inner;
    if let Some(inner) = inner {
        arena.get_mut(inner).parent = Some(node);
    }
    arena.get_mut(new_node).parent = parent;
    arena.get_mut(new_node).right = Some(node);
    arena.get_mut(node).parent = Some(new_node);

    update(arena, node);
    update(arena, new_node);
    new_node
}

fn rotate_left(arena: &mut Arena, node: u32) -> u32 {
    let parent = arena.get(node).parent;
    let new_node = arena.get(node).right.expect("rotate_left requires a right child");
    let inner = arena.get(new_node).left;

    arena.get_mut(node).right = inner;
    if let Some(inner) = inner {
        arena.get_mut(inner).parent = Some(node);
    }
    arena.get_mut(new_node).parent = parent;
    arena.get_mut(new_node).left = Some(node);
    arena.get_mut(node).parent = Some(new_node);

    update(arena, node);
    update(arena, new_node);
    new_node
}

fn fix_left(arena: &mut Arena, node: u32) -> u32 {
    let left = arena.get(node).left.expect("fix_left requires a left child");
    if height(arena, arena.get(left).left) < height(arena, arena.get(left).right) {
        let new_left = rotate_left(arena, left);
        arena.get_mut(node).left = Some(new_left);
    }
    rotate_right(arena, node)
}

fn fix_right(arena: &mut Arena, node: u32) -> u32 {
    let right = arena.get(node).right.expect("fix_right requires a right child");
    if height(arena, arena.get(right).right) < height(arena, arena.get(right).left) {
        let new_right = rotate_right(arena, right);
        arena.get_mut(node).right = Some(new_right);
    }
    rotate_left(arena, node)
}

/// Rebalances the path from `node` up to the root, returning the index of
/// the (possibly new) overall tree root.
pub fn fix(arena: &mut Arena, mut node: u32) -> u32 {
    loop {
        let parent = arena.get(node).parent;
        update(arena, node);

        let le = height(arena, arena.get(node).left);
        let ri = height(arena, arena.get(node).right);

        let new_subtree_root = if le == ri + 2 {
            fix_left(arena, node)
        } else if le + 2 == ri {
            fix_right(arena, node)
        } else {
            node
        };

        match parent {
            None => return new_subtree_root,
            Some(p) => {
                if arena.get(p).left == Some(node) {
                    arena.get_mut(p).left = Some(new_subtree_root);
                } else {
                    arena.get_mut(p).right = Some(new_subtree_root);
                }
                node = p;
            }
        }
    }
}

/// BST-inserts the already-allocated leaf `new_idx` under `root` by
/// `(score, name)` order, then rebalances. Returns the new overall root.
/// Names must be unique among siblings; the caller is responsible for that
/// (via a prior hash-map lookup).
pub fn insert(arena: &mut Arena, root: Option<u32>, new_idx: u32) -> u32 {
    let mut cur = match root {
        None => return new_idx,
        Some(r) => r,
    };
    loop {
        if node_less(arena, new_idx, cur) {
            match arena.get(cur).left {
                Some(l) => cur = l,
                None => {
                    arena.get_mut(cur).left = Some(new_idx);
                    arena.get_mut(new_idx).parent = Some(cur);
                    break;
                }
            }
        } else {
            match arena.get(cur).right {
                Some(r) => cur = r,
                None => {
                    arena.get_mut(cur).right = Some(new_idx);
                    arena.get_mut(new_idx).parent = Some(cur);
                    break;
                }
            }
        }
    }
    fix(arena, new_idx)
}

/// Smallest node `>= (score, name)` in the total order, or `None` if the
/// tree has no such node.
pub fn seek_ge(arena: &Arena, root: Option<u32>, score: f64, name: &[u8]) -> Option<u32> {
    let mut found = None;
    let mut cur = root;
    while let Some(idx) = cur {
        if less_than_value(arena, idx, score, name) {
            cur = arena.get(idx).right;
        } else {
            found = Some(idx);
            cur = arena.get(idx).left;
        }
    }
    found
}

/// The in-order node `k` positions away from `node` (negative moves left,
/// positive moves right), or `None` if that position doesn't exist.
pub fn offset(arena: &Arena, mut node: u32, target: i64) -> Option<u32> {
    let mut pos: i64 = 0;
    while target != pos {
        let right_cnt = count(arena, arena.get(node).right) as i64;
        let left_cnt = count(arena, arena.get(node).left) as i64;

        if pos < target && pos + right_cnt >= target {
            node = arena.get(node).right?;
            pos += count(arena, arena.get(node).left) as i64 + 1;
        } else if pos > target && pos - left_cnt <= target {
            node = arena.get(node).left?;
            pos -= count(arena, arena.get(node).right) as i64 + 1;
        } else {
            let parent = arena.get(node).parent?;
            if arena.get(parent).right == Some(node) {
                pos -= count(arena, arena.get(node).left) as i64 + 1;
            } else {
                pos += count(arena, arena.get(node).right) as i64 + 1;
            }
            node = parent;
        }
    }
    Some(node)
}

fn lazy_delete(arena: &mut Arena, node: u32) -> Option<u32> {
    let n = arena.get(node);
    let child = n.left.or(n.right);
    let parent = n.parent;

    if let Some(c) = child {
        arena.get_mut(c).parent = parent;
    }
    match parent {
        None => child,
        Some(p) => {
            if arena.get(p).left == Some(node) {
                arena.get_mut(p).left = child;
            } else {
                arena.get_mut(p).right = child;
            }
            Some(fix(arena, p))
        }
    }
}

/// Removes `node` from the tree, returning the new overall root (or `None`
/// if the tree is now empty). The node's arena slot is left intact; the
/// caller frees it via [`Arena::free`] once it has also removed the node
/// from any other index (e.g. the name hash map).
pub fn delete(arena: &mut Arena, node: u32) -> Option<u32> {
    let (left, right) = (arena.get(node).left, arena.get(node).right);
    if left.is_none() || right.is_none() {
        return lazy_delete(arena, node);
    }

    let mut victim = right.unwrap();
    while let Some(l) = arena.get(victim).left {
        victim = l;
    }

    let root = lazy_delete(arena, victim);

    let node_parent = arena.get(node).parent;
    let node_left = arena.get(node).left;
    let node_right = arena.get(node).right;
    let node_height = arena.get(node).height;
    let node_cnt = arena.get(node).cnt;

    {
        let v = arena.get_mut(victim);
        v.parent = node_parent;
        v.left = node_left;
        v.right = node_right;
        v.height = node_height;
        v.cnt = node_cnt;
    }
    if let Some(l) = node_left {
        arena.get_mut(l).parent = Some(victim);
    }
    if let Some(r) = node_right {
        arena.get_mut(r).parent = Some(victim);
    }

    match node_parent {
        None => Some(victim),
        Some(p) => {
            if arena.get(p).left == Some(node) {
                arena.get_mut(p).left = Some(victim);
            } else {
                arena.get_mut(p).right = Some(victim);
            }
            root
        }
    }
}

/// In-order traversal, for tests and for `keys`-style dumps.
pub fn in_order(arena: &Arena, root: Option<u32>, mut visit: impl FnMut(u32)) {
    fn walk(arena: &Arena, node: Option<u32>, visit: &mut impl FnMut(u32)) {
        if let Some(idx) = node {
            walk(arena, arena.get(idx).left, visit);
            visit(idx);
            walk(arena, arena.get(idx).right, visit);
        }
    }
    walk(arena, root, &mut visit);
}
