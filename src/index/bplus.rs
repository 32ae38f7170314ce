// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{IndexKind, KeyIndex};
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::snapshot::Snapshot;
use crate::value::Value;
use crate::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use std::path::PathBuf;

/// Default maximum number of keys per node
pub const DEFAULT_ORDER: usize = 4;

/// Sentinel for "no next leaf" in the snapshot encoding
const NO_LEAF: u32 = u32::MAX;

type NodeId = u32;

#[derive(Debug)]
struct Node {
    is_leaf: bool,

    keys: Vec<Value>,

    /// For leaves: the heap slot of `keys[i]`.
    /// For internal nodes: `keys.len() + 1` child node ids.
    children: Vec<u32>,

    /// Threads the leaves in ascending key order
    next_leaf: Option<NodeId>,
}

impl Node {
    fn leaf() -> Self {
        Self {
            is_leaf: true,
            keys: vec![],
            children: vec![],
            next_leaf: None,
        }
    }

    /// First child to descend into for `key`: the branch left of the first
    /// key strictly greater than the query.
    fn descend_index(&self, key: &Value) -> usize {
        self.keys.partition_point(|k| k <= key)
    }
}

/// An ordered B+ tree index mapping keys to heap slots.
///
/// Nodes live in an arena and reference each other by index, so sibling and
/// leaf links never form owning cycles. The whole tree is kept in memory
/// between calls and snapshotted to disk after every mutation.
///
/// Duplicate keys collapse to a single entry (upsert semantics).
pub struct BPlusTree {
    order: usize,
    root: NodeId,
    nodes: Vec<Node>,
    free_ids: Vec<NodeId>,
    path: PathBuf,
}

impl BPlusTree {
    /// Creates an empty tree with the given order (max keys per node).
    ///
    /// # Panics
    ///
    /// Panics if `order < 2`.
    #[must_use]
    pub fn new(path: PathBuf, order: usize) -> Self {
        assert!(order >= 2, "order must be at least 2");

        Self {
            order,
            root: 0,
            nodes: vec![Node::leaf()],
            free_ids: vec![],
            path,
        }
    }

    /// Opens the tree from its snapshot file, or creates an empty one if the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// A present but undecodable snapshot surfaces as a corrupt-snapshot
    /// error; callers may recover by rebuilding from the heap.
    pub fn open(path: PathBuf, order: usize) -> Result<Self> {
        match Snapshot::load(&path, IndexKind::BPlusTree.into())? {
            Some(payload) => {
                let mut tree = Self::decode_from(&mut &payload[..])?;
                tree.path = path;

                log::debug!(
                    "bplus: loaded snapshot, {} nodes, order {}",
                    tree.nodes.len(),
                    tree.order,
                );
                Ok(tree)
            }
            None => Ok(Self::new(path, order)),
        }
    }

    /// Returns the tree's order.
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
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

    fn min_keys(&self) -> usize {
        (self.order + 1) / 2
    }

    fn leftmost_leaf(&self) -> NodeId {
        let mut id = self.root;
        while !self.node(id).is_leaf {
            id = self.node(id).children[0];
        }
        id
    }

    /// Descends to the leaf that would contain `key`.
    fn find_leaf(&self, key: &Value) -> NodeId {
        let mut id = self.root;
        while !self.node(id).is_leaf {
            let idx = self.node(id).descend_index(key);
            id = self.node(id).children[idx];
        }
        id
    }

    fn insert_recursive(&mut self, id: NodeId, key: Value, slot: u32) -> Option<(Value, NodeId)> {
        if self.node(id).is_leaf {
            let node = self.node_mut(id);

            match node.keys.binary_search(&key) {
                Ok(idx) => {
                    // upsert
                    node.children[idx] = slot;
                    None
                }
                Err(idx) => {
                    node.keys.insert(idx, key);
                    node.children.insert(idx, slot);

                    if node.keys.len() > self.order {
                        Some(self.split_leaf(id))
                    } else {
                        None
                    }
                }
            }
        } else {
            let idx = self.node(id).descend_index(&key);
            let child = self.node(id).children[idx];

            if let Some((new_key, new_node)) = self.insert_recursive(child, key, slot) {
                let node = self.node_mut(id);
                node.keys.insert(idx, new_key);
                node.children.insert(idx + 1, new_node);

                if node.keys.len() > self.order {
                    return Some(self.split_internal(id));
                }
            }
            None
        }
    }

    /// Splits an overfull leaf at the midpoint; the new right leaf keeps the
    /// upper half and its first key is promoted.
    fn split_leaf(&mut self, id: NodeId) -> (Value, NodeId) {
        let node = self.node_mut(id);
        let mid = node.keys.len() / 2;

        let new_node = Node {
            is_leaf: true,
            keys: node.keys.split_off(mid),
            children: node.children.split_off(mid),
            next_leaf: node.next_leaf,
        };
        let promoted = new_node.keys[0].clone();

        let new_id = self.alloc(new_node);
        self.node_mut(id).next_leaf = Some(new_id);

        log::trace!("bplus: split leaf {id} -> {new_id}");
        (promoted, new_id)
    }

    /// Splits an overfull internal node; the middle key moves up.
    fn split_internal(&mut self, id: NodeId) -> (Value, NodeId) {
        let node = self.node_mut(id);
        let mid = node.keys.len() / 2;

        let upper_keys = node.keys.split_off(mid + 1);
        let promoted = node.keys.pop().expect("mid < len");
        let upper_children = node.children.split_off(mid + 1);

        let new_id = self.alloc(Node {
            is_leaf: false,
            keys: upper_keys,
            children: upper_children,
            next_leaf: None,
        });

        log::trace!("bplus: split internal {id} -> {new_id}");
        (promoted, new_id)
    }

    fn delete_recursive(&mut self, id: NodeId, key: &Value) -> bool {
        if self.node(id).is_leaf {
            let node = self.node_mut(id);

            match node.keys.binary_search(key) {
                Ok(idx) => {
                    node.keys.remove(idx);
                    node.children.remove(idx);
                    true
                }
                Err(_) => false,
            }
        } else {
            let idx = self.node(id).descend_index(key);
            let child = self.node(id).children[idx];
            let removed = self.delete_recursive(child, key);

            if self.node(child).keys.len() < self.min_keys() {
                self.rebalance(id, idx);
            }

            removed
        }
    }

    /// Refills an underflowing child, borrowing from a sibling with surplus
    /// or merging otherwise.
    fn rebalance(&mut self, parent: NodeId, idx: usize) {
        let child = self.node(parent).children[idx];

        // borrow from the left sibling
        if idx > 0 {
            let left = self.node(parent).children[idx - 1];

            if self.node(left).keys.len() > self.min_keys() {
                if self.node(child).is_leaf {
                    let (key, slot) = {
                        let left = self.node_mut(left);
                        (
                            left.keys.pop().expect("sibling has surplus"),
                            left.children.pop().expect("sibling has surplus"),
                        )
                    };

                    let node = self.node_mut(child);
                    node.keys.insert(0, key);
                    node.children.insert(0, slot);

                    let separator = self.node(child).keys[0].clone();
                    self.node_mut(parent).keys[idx - 1] = separator;
                } else {
                    let separator = self.node(parent).keys[idx - 1].clone();

                    let (key, grandchild) = {
                        let left = self.node_mut(left);
                        (
                            left.keys.pop().expect("sibling has surplus"),
                            left.children.pop().expect("sibling has surplus"),
                        )
                    };

                    let node = self.node_mut(child);
                    node.keys.insert(0, separator);
                    node.children.insert(0, grandchild);

                    self.node_mut(parent).keys[idx - 1] = key;
                }
                return;
            }
        }

        // borrow from the right sibling
        if idx < self.node(parent).children.len() - 1 {
            let right = self.node(parent).children[idx + 1];

            if self.node(right).keys.len() > self.min_keys() {
                if self.node(child).is_leaf {
                    let (key, slot) = key_slot_front(self.node_mut(right));

                    let node = self.node_mut(child);
                    node.keys.push(key);
                    node.children.push(slot);

                    let separator = self.node(right).keys[0].clone();
                    self.node_mut(parent).keys[idx] = separator;
                } else {
                    let separator = self.node(parent).keys[idx].clone();

                    let (key, grandchild) = key_slot_front(self.node_mut(right));

                    let node = self.node_mut(child);
                    node.keys.push(separator);
                    node.children.push(grandchild);

                    self.node_mut(parent).keys[idx] = key;
                }
                return;
            }
        }

        // no sibling has surplus
        if idx > 0 {
            self.merge(parent, idx - 1);
        } else {
            self.merge(parent, idx);
        }
    }

    /// Merges `children[idx + 1]` into `children[idx]`.
    fn merge(&mut self, parent: NodeId, idx: usize) {
        let child = self.node(parent).children[idx];
        let sibling = self.node(parent).children[idx + 1];

        let (sib_keys, sib_children, sib_next) = {
            let sibling = self.node_mut(sibling);
            (
                std::mem::take(&mut sibling.keys),
                std::mem::take(&mut sibling.children),
                sibling.next_leaf,
            )
        };

        if self.node(child).is_leaf {
            let node = self.node_mut(child);
            node.keys.extend(sib_keys);
            node.children.extend(sib_children);
            node.next_leaf = sib_next;
        } else {
            let separator = self.node(parent).keys[idx].clone();

            let node = self.node_mut(child);
            node.keys.push(separator);
            node.keys.extend(sib_keys);
            node.children.extend(sib_children);
        }

        let parent_node = self.node_mut(parent);
        parent_node.keys.remove(idx);
        parent_node.children.remove(idx + 1);

        self.release(sibling);

        log::trace!("bplus: merged node {sibling} into {child}");
    }

    /// Returns all `(key, slot)` entries by walking the leaf chain.
    #[must_use]
    pub fn leaf_entries(&self) -> Vec<(Value, u32)> {
        let mut entries = vec![];

        let mut cursor = Some(self.leftmost_leaf());
        while let Some(id) = cursor {
            let node = self.node(id);
            for (key, slot) in node.keys.iter().zip(&node.children) {
                entries.push((key.clone(), *slot));
            }
            cursor = node.next_leaf;
        }

        entries
    }

    /// Asserts the structural invariants: node occupancy bounds, uniform
    /// leaf depth, and an ascending leaf chain.
    ///
    /// # Panics
    ///
    /// Panics if an invariant is violated.
    #[doc(hidden)]
    pub fn verify_invariants(&self) {
        fn depth_of(tree: &BPlusTree, id: NodeId) -> usize {
            let node = tree.node(id);
            if node.is_leaf {
                return 1;
            }

            let depths: Vec<usize> = node
                .children
                .iter()
                .map(|&child| depth_of(tree, child))
                .collect();
            assert!(
                depths.windows(2).all(|w| w[0] == w[1]),
                "leaves must share a depth"
            );
            depths[0] + 1
        }

        fn check_occupancy(tree: &BPlusTree, id: NodeId, is_root: bool) {
            let node = tree.node(id);
            assert!(node.keys.len() <= tree.order, "node overflow");

            if node.is_leaf {
                if !is_root {
                    assert!(node.keys.len() >= tree.min_keys(), "leaf underflow");
                }
                assert_eq!(node.keys.len(), node.children.len());
            } else {
                assert_eq!(node.keys.len() + 1, node.children.len());
                for &child in &node.children {
                    check_occupancy(tree, child, false);
                }
            }
        }

        depth_of(self, self.root);
        check_occupancy(self, self.root, true);

        let entries = self.leaf_entries();
        assert!(
            entries.windows(2).all(|w| w[0].0 < w[1].0),
            "leaf chain must be strictly ascending"
        );
    }
}

fn key_slot_front(node: &mut Node) -> (Value, u32) {
    (node.keys.remove(0), node.children.remove(0))
}

impl KeyIndex for BPlusTree {
    fn insert(&mut self, key: Value, slot: u32) -> Result<()> {
        if let Some((promoted, new_node)) = self.insert_recursive(self.root, key, slot) {
            let old_root = self.root;
            self.root = self.alloc(Node {
                is_leaf: false,
                keys: vec![promoted],
                children: vec![old_root, new_node],
                next_leaf: None,
            });
        }

        self.persist()
    }

    fn search(&self, key: &Value) -> Option<u32> {
        let leaf = self.find_leaf(key);
        let node = self.node(leaf);

        node.keys
            .binary_search(key)
            .ok()
            .map(|idx| node.children[idx])
    }

    fn range_search(&self, lo: &Value, hi: &Value) -> Vec<(Value, u32)> {
        let mut result = vec![];

        if self.is_empty() {
            return result;
        }

        let mut cursor = Some(self.find_leaf(lo));
        'chain: while let Some(id) = cursor {
            let node = self.node(id);

            for (key, slot) in node.keys.iter().zip(&node.children) {
                if key > hi {
                    break 'chain;
                }
                if key >= lo {
                    result.push((key.clone(), *slot));
                }
            }

            cursor = node.next_leaf;
        }

        result
    }

    fn delete(&mut self, key: &Value) -> Result<bool> {
        let removed = self.delete_recursive(self.root, key);

        // a root that lost its last separator descends one level
        if !self.node(self.root).is_leaf && self.node(self.root).keys.is_empty() {
            let old_root = self.root;
            self.root = self.node(old_root).children[0];
            self.release(old_root);
        }

        self.persist()?;
        Ok(removed)
    }

    fn update(&mut self, key: Value, slot: u32) -> Result<()> {
        let leaf = self.find_leaf(&key);
        let node = self.node_mut(leaf);

        if let Ok(idx) = node.keys.binary_search(&key) {
            node.children[idx] = slot;
            self.persist()
        } else {
            self.insert(key, slot)
        }
    }

    fn is_empty(&self) -> bool {
        let root = self.node(self.root);
        root.is_leaf && root.keys.is_empty()
    }

    fn persist(&self) -> Result<()> {
        Snapshot::persist(
            &self.path,
            IndexKind::BPlusTree.into(),
            &self.encode_into_vec(),
        )
    }
}

impl Encode for BPlusTree {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        // depth-first preorder; the root is always node 0 of the stream
        let mut order_of_ids = vec![NO_LEAF; self.nodes.len()];
        let mut stream = vec![];

        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if order_of_ids[id as usize] != NO_LEAF {
                continue;
            }
            order_of_ids[id as usize] = stream.len() as u32;
            stream.push(id);

            let node = &self.nodes[id as usize];
            if !node.is_leaf {
                for &child in node.children.iter().rev() {
                    stack.push(child);
                }
            }
        }

        writer.write_u32::<LittleEndian>(self.order as u32)?;
        writer.write_u32::<LittleEndian>(stream.len() as u32)?;

        for &id in &stream {
            let node = &self.nodes[id as usize];

            writer.write_u8(u8::from(node.is_leaf))?;
            writer.write_u32::<LittleEndian>(node.keys.len() as u32)?;

            for key in &node.keys {
                key.encode_into(writer)?;
            }

            if node.is_leaf {
                for &slot in &node.children {
                    writer.write_u32::<LittleEndian>(slot)?;
                }

                let next = node
                    .next_leaf
                    .map_or(NO_LEAF, |next| order_of_ids[next as usize]);
                writer.write_u32::<LittleEndian>(next)?;
            } else {
                for &child in &node.children {
                    writer.write_u32::<LittleEndian>(order_of_ids[child as usize])?;
                }
            }
        }

        Ok(())
    }
}

impl Decode for BPlusTree {
    fn decode_from<R: Read>(reader: &mut R) -> std::result::Result<Self, DecodeError> {
        let order = reader.read_u32::<LittleEndian>()? as usize;
        let node_count = reader.read_u32::<LittleEndian>()? as usize;

        if order < 2 || node_count == 0 {
            return Err(DecodeError::InvalidHeader("invalid b+tree header"));
        }

        let mut nodes = Vec::with_capacity(node_count);

        for _ in 0..node_count {
            let is_leaf = reader.read_u8()? != 0;
            let key_count = reader.read_u32::<LittleEndian>()? as usize;

            let mut keys = Vec::with_capacity(key_count);
            for _ in 0..key_count {
                keys.push(Value::decode_from(reader)?);
            }

            let (children, next_leaf) = if is_leaf {
                let mut slots = Vec::with_capacity(key_count);
                for _ in 0..key_count {
                    slots.push(reader.read_u32::<LittleEndian>()?);
                }

                let next = reader.read_u32::<LittleEndian>()?;
                (slots, (next != NO_LEAF).then_some(next))
            } else {
                let mut ids = Vec::with_capacity(key_count + 1);
                for _ in 0..=key_count {
                    ids.push(reader.read_u32::<LittleEndian>()?);
                }
                (ids, None)
            };

            nodes.push(Node {
                is_leaf,
                keys,
                children,
                next_leaf,
            });
        }

        Ok(Self {
            order,
            root: 0,
            nodes,
            free_ids: vec![],
            path: PathBuf::new(),
        })
    }
}
