// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::IndexKind;
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::snapshot::Snapshot;
use crate::value::Value;
use crate::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io::{Read, Write};
use std::path::PathBuf;

/// Default maximum children per node
pub const DEFAULT_MAX_CHILDREN: usize = 4;

type NodeId = u32;

/// An axis-aligned bounding rectangle
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rect {
    /// Left edge
    pub min_x: f32,
    /// Bottom edge
    pub min_y: f32,
    /// Right edge
    pub max_x: f32,
    /// Top edge
    pub max_y: f32,
}

impl Rect {
    /// The empty rectangle (neutral element of [`Rect::union`])
    pub const EMPTY: Self = Self {
        min_x: f32::INFINITY,
        min_y: f32::INFINITY,
        max_x: f32::NEG_INFINITY,
        max_y: f32::NEG_INFINITY,
    };

    /// Creates a rectangle from its corners.
    #[must_use]
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A degenerate rectangle enclosing a single point.
    #[must_use]
    pub fn point(x: f32, y: f32) -> Self {
        Self::new(x, y, x, y)
    }

    fn area(&self) -> f32 {
        (self.max_x - self.min_x) * (self.max_y - self.min_y)
    }

    fn union(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Area growth needed to also enclose `other`.
    fn enlargement(&self, other: &Self) -> f32 {
        self.union(other).area() - self.area()
    }

    /// Returns `true` if the rectangles overlap (edges included).
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !(self.max_x < other.min_x
            || self.min_x > other.max_x
            || self.max_y < other.min_y
            || self.min_y > other.max_y)
    }

    fn center(&self) -> (f32, f32) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Shortest Euclidean distance from a point to this rectangle
    /// (zero if the point lies inside).
    #[must_use]
    pub fn mindist(&self, x: f32, y: f32) -> f32 {
        let dx = if x < self.min_x {
            self.min_x - x
        } else if x > self.max_x {
            x - self.max_x
        } else {
            0.0
        };

        let dy = if y < self.min_y {
            self.min_y - y
        } else if y > self.max_y {
            y - self.max_y
        } else {
            0.0
        };

        dx.hypot(dy)
    }
}

#[derive(Debug)]
struct Node {
    is_leaf: bool,

    /// Leaf payload entries
    entries: Vec<(Rect, Value)>,

    /// Internal child node ids
    children: Vec<NodeId>,

    bbox: Rect,
}

impl Node {
    fn leaf() -> Self {
        Self {
            is_leaf: true,
            entries: vec![],
            children: vec![],
            bbox: Rect::EMPTY,
        }
    }

    fn len(&self) -> usize {
        if self.is_leaf {
            self.entries.len()
        } else {
            self.children.len()
        }
    }
}

/// A 2-D R-tree over bounding rectangles.
///
/// Nodes are arena-allocated and reference each other by index. Insertion
/// descends by least enlargement (ties broken by center distance) and
/// splits overfull nodes at a balanced midpoint; deletion dissolves
/// underfull nodes and reinserts their entries from the root.
pub struct RTree {
    max_children: usize,
    root: NodeId,
    nodes: Vec<Node>,
    free_ids: Vec<NodeId>,
}

impl RTree {
    /// Creates an empty tree.
    ///
    /// # Panics
    ///
    /// Panics if `max_children < 2`.
    #[must_use]
    pub fn new(max_children: usize) -> Self {
        assert!(max_children >= 2, "max_children must be at least 2");

        Self {
            max_children,
            root: 0,
            nodes: vec![Node::leaf()],
            free_ids: vec![],
        }
    }

    /// Minimum entries per non-root node: `ceil(M / 2)`, floored at 1.
    fn min_fill(&self) -> usize {
        ((self.max_children + 1) / 2).max(1)
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id as usize]
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free_ids.pop() {
            self.nodes[id as usize] = node;
            id
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as NodeId
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id as usize] = Node::leaf();
        self.free_ids.push(id);
    }

    /// Returns `true` if the tree holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let root = self.node(self.root);
        root.is_leaf && root.entries.is_empty()
    }

    fn recompute_bbox(&mut self, id: NodeId) {
        let bbox = {
            let node = self.node(id);
            if node.is_leaf {
                node.entries
                    .iter()
                    .fold(Rect::EMPTY, |acc, (rect, _)| acc.union(rect))
            } else {
                node.children
                    .iter()
                    .fold(Rect::EMPTY, |acc, &child| {
                        acc.union(&self.node(child).bbox)
                    })
            }
        };

        self.node_mut(id).bbox = bbox;
    }

    /// Descends to the best leaf for `rect`, minimizing enlargement with
    /// center distance as the tie-breaker. Records the descent path,
    /// root first.
    fn choose_leaf(&self, rect: &Rect, path: &mut Vec<NodeId>) -> NodeId {
        let (cx, cy) = rect.center();

        let mut id = self.root;
        loop {
            path.push(id);

            let node = self.node(id);
            if node.is_leaf {
                return id;
            }

            let best = node
                .children
                .iter()
                .min_by(|&&a, &&b| {
                    let score = |child: NodeId| {
                        let bbox = &self.node(child).bbox;
                        (bbox.enlargement(rect), bbox.mindist(cx, cy))
                    };

                    let (ea, da) = score(a);
                    let (eb, db) = score(b);

                    ea.total_cmp(&eb).then_with(|| da.total_cmp(&db))
                })
                .expect("internal node has children");

            id = *best;
        }
    }

    /// Inserts a point entry (stored as a degenerate rectangle).
    pub fn insert_point(&mut self, payload: Value, x: f32, y: f32) {
        self.insert_rect(Rect::point(x, y), payload);
    }

    /// Inserts a rectangle entry.
    pub fn insert_rect(&mut self, rect: Rect, payload: Value) {
        let mut path = vec![];
        let leaf = self.choose_leaf(&rect, &mut path);

        self.node_mut(leaf).entries.push((rect, payload));

        // walk back up: refresh bboxes and split overfull nodes
        for depth in (0..path.len()).rev() {
            let id = path[depth];
            self.recompute_bbox(id);

            if self.node(id).len() > self.max_children {
                let new_id = self.split(id);

                if depth == 0 {
                    let old_root = self.root;
                    let new_root = self.alloc(Node {
                        is_leaf: false,
                        entries: vec![],
                        children: vec![old_root, new_id],
                        bbox: Rect::EMPTY,
                    });
                    self.recompute_bbox(new_root);
                    self.root = new_root;

                    log::trace!("rtree: grew a new root {new_root}");
                } else {
                    let parent = path[depth - 1];
                    self.node_mut(parent).children.push(new_id);
                }
            }
        }
    }

    /// Balanced midpoint split: the upper half moves to a fresh sibling,
    /// both sides keeping at least `min_fill` entries.
    fn split(&mut self, id: NodeId) -> NodeId {
        let min_fill = self.min_fill();

        let node = self.node_mut(id);
        let count = node.len();
        let mid = min_fill.max((count / 2).min(count - min_fill));

        let new_node = Node {
            is_leaf: node.is_leaf,
            entries: if node.is_leaf {
                node.entries.split_off(mid)
            } else {
                vec![]
            },
            children: if node.is_leaf {
                vec![]
            } else {
                node.children.split_off(mid)
            },
            bbox: Rect::EMPTY,
        };

        let new_id = self.alloc(new_node);
        self.recompute_bbox(id);
        self.recompute_bbox(new_id);

        log::trace!("rtree: split node {id} -> {new_id}");
        new_id
    }

    /// Returns the payloads of all entries intersecting `query`.
    #[must_use]
    pub fn search(&self, query: &Rect) -> Vec<Value> {
        let mut results = vec![];
        self.search_recursive(self.root, query, &mut results);
        results
    }

    /// Returns the payloads of all entries whose stored rectangles overlap
    /// the query bbox. Alias of [`RTree::search`].
    #[must_use]
    pub fn intersection_search(&self, query: &Rect) -> Vec<Value> {
        self.search(query)
    }

    fn search_recursive(&self, id: NodeId, query: &Rect, results: &mut Vec<Value>) {
        let node = self.node(id);

        if node.is_leaf {
            for (rect, payload) in &node.entries {
                if rect.intersects(query) {
                    results.push(payload.clone());
                }
            }
        } else {
            for &child in &node.children {
                if self.node(child).bbox.intersects(query) {
                    self.search_recursive(child, query, results);
                }
            }
        }
    }

    /// Returns the payloads of all entries within `radius` of the point,
    /// pruning subtrees by bbox mindist.
    #[must_use]
    pub fn search_radius(&self, x: f32, y: f32, radius: f32) -> Vec<Value> {
        let mut results = vec![];
        self.radius_recursive(self.root, x, y, radius, &mut results);
        results
    }

    fn radius_recursive(&self, id: NodeId, x: f32, y: f32, radius: f32, results: &mut Vec<Value>) {
        let node = self.node(id);

        if node.bbox.mindist(x, y) > radius {
            return;
        }

        if node.is_leaf {
            for (rect, payload) in &node.entries {
                if rect.mindist(x, y) <= radius {
                    results.push(payload.clone());
                }
            }
        } else {
            for &child in &node.children {
                if self.node(child).bbox.mindist(x, y) <= radius {
                    self.radius_recursive(child, x, y, radius, results);
                }
            }
        }
    }

    /// Returns the payloads of the `k` entries nearest to the point,
    /// closest first (best-first traversal ordered by mindist).
    #[must_use]
    pub fn knn(&self, x: f32, y: f32, k: usize) -> Vec<Value> {
        struct Candidate {
            dist: f32,
            node: Option<NodeId>,
            payload: Option<Value>,
        }

        impl PartialEq for Candidate {
            fn eq(&self, other: &Self) -> bool {
                self.dist.total_cmp(&other.dist) == Ordering::Equal
            }
        }
        impl Eq for Candidate {}

        impl PartialOrd for Candidate {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        // min-heap by distance
        impl Ord for Candidate {
            fn cmp(&self, other: &Self) -> Ordering {
                other.dist.total_cmp(&self.dist)
            }
        }

        let mut results = vec![];
        if k == 0 {
            return results;
        }

        let mut frontier = BinaryHeap::new();
        frontier.push(Candidate {
            dist: 0.0,
            node: Some(self.root),
            payload: None,
        });

        while let Some(candidate) = frontier.pop() {
            if let Some(id) = candidate.node {
                let node = self.node(id);

                if node.is_leaf {
                    for (rect, payload) in &node.entries {
                        let (cx, cy) = rect.center();
                        frontier.push(Candidate {
                            dist: (cx - x).hypot(cy - y),
                            node: None,
                            payload: Some(payload.clone()),
                        });
                    }
                } else {
                    for &child in &node.children {
                        frontier.push(Candidate {
                            dist: self.node(child).bbox.mindist(x, y),
                            node: Some(child),
                            payload: None,
                        });
                    }
                }
            } else if let Some(payload) = candidate.payload {
                results.push(payload);
                if results.len() == k {
                    break;
                }
            }
        }

        results
    }

    /// Removes every entry whose payload equals `payload`.
    ///
    /// Underfull nodes are dissolved and their remaining entries reinserted
    /// from the root; a single-child internal root is demoted afterwards.
    pub fn delete(&mut self, payload: &Value) -> bool {
        let mut orphans = vec![];
        let removed = self.delete_recursive(self.root, payload, &mut orphans);

        for (rect, value) in orphans {
            self.insert_rect(rect, value);
        }

        // demote a single-child internal root
        if !self.node(self.root).is_leaf && self.node(self.root).children.len() == 1 {
            let old_root = self.root;
            self.root = self.node(old_root).children[0];
            self.release(old_root);
        }

        // a root that lost everything resets to an empty leaf
        if !self.node(self.root).is_leaf && self.node(self.root).children.is_empty() {
            self.node_mut(self.root).is_leaf = true;
            self.node_mut(self.root).bbox = Rect::EMPTY;
        }

        removed
    }

    fn delete_recursive(
        &mut self,
        id: NodeId,
        payload: &Value,
        orphans: &mut Vec<(Rect, Value)>,
    ) -> bool {
        if self.node(id).is_leaf {
            let node = self.node_mut(id);
            let before = node.entries.len();
            node.entries.retain(|(_, p)| p != payload);

            let removed = node.entries.len() < before;
            if removed {
                self.recompute_bbox(id);

                if self.node(id).len() < self.min_fill() && id != self.root {
                    // dissolve; the parent drops the empty node
                    let node = self.node_mut(id);
                    orphans.append(&mut node.entries);
                    node.bbox = Rect::EMPTY;
                }
            }

            removed
        } else {
            let children: Vec<NodeId> = self.node(id).children.clone();

            let mut removed = false;
            for child in children {
                if self.delete_recursive(child, payload, orphans) {
                    removed = true;
                }
            }

            if removed {
                // drop children that dissolved themselves
                let empty: Vec<NodeId> = self
                    .node(id)
                    .children
                    .iter()
                    .copied()
                    .filter(|&child| self.node(child).len() == 0)
                    .collect();

                self.node_mut(id).children.retain(|child| !empty.contains(child));
                for child in empty {
                    self.release(child);
                }

                self.recompute_bbox(id);

                if self.node(id).len() < self.min_fill() && id != self.root {
                    self.collect_entries(id, orphans);
                }
            }

            removed
        }
    }

    /// Drains every leaf entry below `id` into `orphans`, releasing the
    /// emptied descendants.
    fn collect_entries(&mut self, id: NodeId, orphans: &mut Vec<(Rect, Value)>) {
        if self.node(id).is_leaf {
            let node = self.node_mut(id);
            orphans.append(&mut node.entries);
            node.bbox = Rect::EMPTY;
            return;
        }

        let children = std::mem::take(&mut self.node_mut(id).children);
        for child in children {
            self.collect_entries(child, orphans);
            self.release(child);
        }

        self.node_mut(id).bbox = Rect::EMPTY;
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        fn count(tree: &RTree, id: NodeId) -> usize {
            let node = tree.node(id);
            if node.is_leaf {
                node.entries.len()
            } else {
                node.children.iter().map(|&c| count(tree, c)).sum()
            }
        }

        count(self, self.root)
    }

    /// Asserts that every internal node's bbox equals the union of its
    /// children's bboxes and that fan-out bounds hold.
    ///
    /// # Panics
    ///
    /// Panics if an invariant is violated.
    #[doc(hidden)]
    pub fn verify_invariants(&self) {
        fn check(tree: &RTree, id: NodeId, is_root: bool) {
            let node = tree.node(id);

            assert!(node.len() <= tree.max_children, "node overflow");
            if !is_root {
                assert!(node.len() >= tree.min_fill(), "node underflow");
            }

            let expected = if node.is_leaf {
                node.entries
                    .iter()
                    .fold(Rect::EMPTY, |acc, (rect, _)| acc.union(rect))
            } else {
                for &child in &node.children {
                    check(tree, child, false);
                }
                node.children
                    .iter()
                    .fold(Rect::EMPTY, |acc, &child| acc.union(&tree.node(child).bbox))
            };

            assert_eq!(expected, node.bbox, "stale bbox on node {id}");
        }

        check(self, self.root, true);
    }
}

/// The spatial primary index: an [`RTree`] over two coordinate fields plus
/// a key → heap-slot map for point lookups.
///
/// Payloads stored in the tree are record keys; the map resolves them to
/// heap slots.
pub struct RTreeIndex {
    tree: RTree,
    slots: FxHashMap<Value, u32>,
    path: PathBuf,
}

impl RTreeIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(path: PathBuf, max_children: usize) -> Self {
        Self {
            tree: RTree::new(max_children),
            slots: FxHashMap::default(),
            path,
        }
    }

    /// Opens the index from its snapshot file, or creates an empty one if
    /// the file does not exist.
    pub fn open(path: PathBuf, max_children: usize) -> Result<Self> {
        match Snapshot::load(&path, IndexKind::RTree.into())? {
            Some(payload) => {
                let mut index = Self::decode_from(&mut &payload[..])?;
                index.path = path;

                log::debug!("rtree: loaded snapshot, {} entries", index.slots.len());
                Ok(index)
            }
            None => Ok(Self::new(path, max_children)),
        }
    }

    /// Inserts a point record.
    pub fn insert(&mut self, key: Value, x: f32, y: f32, slot: u32) -> Result<()> {
        self.tree.insert_point(key.clone(), x, y);
        self.slots.insert(key, slot);
        self.persist()
    }

    /// Replaces the entry for `key` with new coordinates and slot.
    pub fn update(&mut self, key: Value, x: f32, y: f32, slot: u32) -> Result<()> {
        self.tree.delete(&key);
        self.tree.insert_point(key.clone(), x, y);
        self.slots.insert(key, slot);
        self.persist()
    }

    /// Returns the heap slot for `key`.
    #[must_use]
    pub fn search(&self, key: &Value) -> Option<u32> {
        self.slots.get(key).copied()
    }

    /// Removes the entry for `key`. Returns `false` if it was absent.
    pub fn delete(&mut self, key: &Value) -> Result<bool> {
        if self.slots.remove(key).is_none() {
            return Ok(false);
        }

        self.tree.delete(key);
        self.persist()?;
        Ok(true)
    }

    fn to_slots(&self, payloads: Vec<Value>) -> Vec<u32> {
        payloads
            .into_iter()
            .filter_map(|key| self.slots.get(&key).copied())
            .collect()
    }

    /// Heap slots of all entries intersecting the query rectangle.
    #[must_use]
    pub fn search_bbox(&self, query: &Rect) -> Vec<u32> {
        self.to_slots(self.tree.search(query))
    }

    /// Alias of [`RTreeIndex::search_bbox`].
    #[must_use]
    pub fn intersection_search(&self, query: &Rect) -> Vec<u32> {
        self.search_bbox(query)
    }

    /// Heap slots of all entries within `radius` of the point.
    #[must_use]
    pub fn search_radius(&self, x: f32, y: f32, radius: f32) -> Vec<u32> {
        self.to_slots(self.tree.search_radius(x, y, radius))
    }

    /// Heap slots of the `k` nearest entries, closest first.
    #[must_use]
    pub fn knn(&self, x: f32, y: f32, k: usize) -> Vec<u32> {
        self.to_slots(self.tree.knn(x, y, k))
    }

    /// Returns `true` if the index holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Access to the underlying tree (invariant checks in tests).
    #[doc(hidden)]
    #[must_use]
    pub fn tree(&self) -> &RTree {
        &self.tree
    }

    /// Writes the snapshot file.
    pub fn persist(&self) -> Result<()> {
        Snapshot::persist(&self.path, IndexKind::RTree.into(), &self.encode_into_vec())
    }
}

fn encode_rect<W: Write>(rect: &Rect, writer: &mut W) -> std::result::Result<(), EncodeError> {
    writer.write_f32::<LittleEndian>(rect.min_x)?;
    writer.write_f32::<LittleEndian>(rect.min_y)?;
    writer.write_f32::<LittleEndian>(rect.max_x)?;
    writer.write_f32::<LittleEndian>(rect.max_y)?;
    Ok(())
}

fn decode_rect<R: Read>(reader: &mut R) -> std::result::Result<Rect, DecodeError> {
    Ok(Rect {
        min_x: reader.read_f32::<LittleEndian>()?,
        min_y: reader.read_f32::<LittleEndian>()?,
        max_x: reader.read_f32::<LittleEndian>()?,
        max_y: reader.read_f32::<LittleEndian>()?,
    })
}

impl Encode for RTreeIndex {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        let tree = &self.tree;

        // depth-first preorder node stream; the root is node 0
        let mut order_of_ids = vec![u32::MAX; tree.nodes.len()];
        let mut stream = vec![];

        let mut stack = vec![tree.root];
        while let Some(id) = stack.pop() {
            if order_of_ids[id as usize] != u32::MAX {
                continue;
            }
            order_of_ids[id as usize] = stream.len() as u32;
            stream.push(id);

            let node = &tree.nodes[id as usize];
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }

        writer.write_u32::<LittleEndian>(tree.max_children as u32)?;
        writer.write_u32::<LittleEndian>(stream.len() as u32)?;

        for &id in &stream {
            let node = &tree.nodes[id as usize];

            writer.write_u8(u8::from(node.is_leaf))?;
            encode_rect(&node.bbox, writer)?;

            if node.is_leaf {
                writer.write_u32::<LittleEndian>(node.entries.len() as u32)?;
                for (rect, payload) in &node.entries {
                    encode_rect(rect, writer)?;
                    payload.encode_into(writer)?;
                }
            } else {
                writer.write_u32::<LittleEndian>(node.children.len() as u32)?;
                for &child in &node.children {
                    writer.write_u32::<LittleEndian>(order_of_ids[child as usize])?;
                }
            }
        }

        // the key → slot map, sorted for byte-reproducible snapshots
        let mut pairs: Vec<(&Value, u32)> =
            self.slots.iter().map(|(k, &v)| (k, v)).collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        writer.write_u32::<LittleEndian>(pairs.len() as u32)?;
        for (key, slot) in pairs {
            key.encode_into(writer)?;
            writer.write_u32::<LittleEndian>(slot)?;
        }

        Ok(())
    }
}

impl Decode for RTreeIndex {
    fn decode_from<R: Read>(reader: &mut R) -> std::result::Result<Self, DecodeError> {
        let max_children = reader.read_u32::<LittleEndian>()? as usize;
        let node_count = reader.read_u32::<LittleEndian>()? as usize;

        if max_children < 2 || node_count == 0 {
            return Err(DecodeError::InvalidHeader("invalid rtree header"));
        }

        let mut nodes = Vec::with_capacity(node_count);

        for _ in 0..node_count {
            let is_leaf = reader.read_u8()? != 0;
            let bbox = decode_rect(reader)?;
            let count = reader.read_u32::<LittleEndian>()? as usize;

            let mut node = Node {
                is_leaf,
                entries: vec![],
                children: vec![],
                bbox,
            };

            if is_leaf {
                for _ in 0..count {
                    let rect = decode_rect(reader)?;
                    let payload = Value::decode_from(reader)?;
                    node.entries.push((rect, payload));
                }
            } else {
                for _ in 0..count {
                    node.children.push(reader.read_u32::<LittleEndian>()?);
                }
            }

            nodes.push(node);
        }

        let pair_count = reader.read_u32::<LittleEndian>()? as usize;
        let mut slots = FxHashMap::default();

        for _ in 0..pair_count {
            let key = Value::decode_from(reader)?;
            let slot = reader.read_u32::<LittleEndian>()?;
            slots.insert(key, slot);
        }

        Ok(Self {
            tree: RTree {
                max_children,
                root: 0,
                nodes,
                free_ids: vec![],
            },
            slots,
            path: PathBuf::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn id(name: &str) -> Value {
        Value::Str(name.into())
    }

    fn sample_tree() -> RTree {
        let mut tree = RTree::new(4);
        for (name, x, y) in [
            ("a", 1.0, 1.0),
            ("b", 2.0, 2.0),
            ("c", 3.0, 3.0),
            ("d", 5.0, 5.0),
            ("e", 7.0, 7.0),
        ] {
            tree.insert_point(id(name), x, y);
        }
        tree
    }

    #[test]
    fn bbox_query_hits_exact_points() {
        let tree = sample_tree();
        tree.verify_invariants();

        let hits = tree.search(&Rect::new(1.5, 1.5, 2.5, 2.5));
        assert_eq!(vec![id("b")], hits);

        assert!(tree.search(&Rect::new(10.0, 10.0, 11.0, 11.0)).is_empty());
    }

    #[test]
    fn radius_query_prunes_by_mindist() {
        let tree = sample_tree();

        // b and d are sqrt(4.5) ~ 2.12 away, a already sqrt(12.5) ~ 3.54
        let mut hits = tree.search_radius(3.5, 3.5, 2.2);
        hits.sort();
        assert_eq!(vec![id("b"), id("c"), id("d")], hits);

        let hits = tree.search_radius(3.0, 3.0, 0.0);
        assert_eq!(vec![id("c")], hits);
    }

    #[test]
    fn knn_returns_closest_first() {
        let tree = sample_tree();

        let hits = tree.knn(3.1, 3.1, 3);
        assert_eq!(vec![id("c"), id("b"), id("d")], hits);

        assert_eq!(5, tree.knn(0.0, 0.0, 100).len(), "k larger than tree");
    }

    #[test]
    fn delete_reinserts_orphans() {
        let mut tree = sample_tree();

        assert!(tree.delete(&id("b")));
        assert!(!tree.delete(&id("b")));

        tree.verify_invariants();
        assert_eq!(4, tree.len());

        let hits = tree.search_radius(3.5, 3.5, 2.2);
        assert!(!hits.contains(&id("b")));
    }

    #[test]
    fn split_keeps_min_fill() {
        let mut tree = RTree::new(4);
        for i in 0..100 {
            let x = (i % 10) as f32;
            let y = (i / 10) as f32;
            tree.insert_point(Value::I32(i), x, y);
        }

        tree.verify_invariants();
        assert_eq!(100, tree.len());

        // every point is recoverable by an exact query
        for i in 0..100 {
            let x = (i % 10) as f32;
            let y = (i / 10) as f32;
            let hits = tree.search(&Rect::point(x, y));
            assert!(hits.contains(&Value::I32(i)));
        }
    }

    #[test]
    fn delete_down_to_empty() {
        let mut tree = sample_tree();

        for name in ["a", "b", "c", "d", "e"] {
            assert!(tree.delete(&id(name)));
        }

        assert!(tree.is_empty());
        assert!(tree.search(&Rect::new(0.0, 0.0, 10.0, 10.0)).is_empty());
    }

    #[test]
    fn true_rectangles() {
        let mut tree = RTree::new(4);
        tree.insert_rect(Rect::new(0.0, 0.0, 4.0, 4.0), id("big"));
        tree.insert_rect(Rect::new(1.0, 1.0, 2.0, 2.0), id("small"));

        let mut hits = tree.search(&Rect::point(1.5, 1.5));
        hits.sort();
        assert_eq!(vec![id("big"), id("small")], hits);

        let mut hits = tree.intersection_search(&Rect::new(1.5, 1.5, 3.0, 3.0));
        hits.sort();
        assert_eq!(vec![id("big"), id("small")], hits);

        // mindist from inside a rect is zero
        let hits = tree.search_radius(3.5, 3.5, 0.1);
        assert_eq!(vec![id("big")], hits);
    }

    #[test]
    fn index_snapshot_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("spatial.idx");

        {
            let mut index = RTreeIndex::new(path.clone(), 4);
            for (i, (x, y)) in [(1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (5.0, 5.0), (7.0, 7.0)]
                .into_iter()
                .enumerate()
            {
                index.insert(Value::I32(i as i32), x, y, i as u32)?;
            }
        }

        {
            let index = RTreeIndex::open(path, 4)?;
            index.tree().verify_invariants();

            assert_eq!(Some(3), index.search(&Value::I32(3)));
            assert_eq!(vec![1], index.search_bbox(&Rect::new(1.5, 1.5, 2.5, 2.5)));
            assert_eq!(
                vec![1],
                index.intersection_search(&Rect::new(1.5, 1.5, 2.5, 2.5)),
            );

            let mut slots = index.search_radius(3.5, 3.5, 2.2);
            slots.sort_unstable();
            assert_eq!(vec![1, 2, 3], slots);

            assert_eq!(vec![2, 1], index.knn(2.9, 2.9, 2));
        }

        Ok(())
    }
}
