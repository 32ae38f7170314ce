// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod bplus;
pub mod ext_hash;
pub mod isam;
pub mod rtree;
pub mod sequential;

use crate::value::Value;
use crate::Result;
use enum_dispatch::enum_dispatch;

pub use bplus::BPlusTree;
pub use ext_hash::ExtendibleHash;
pub use isam::IsamIndex;
pub use rtree::{RTree, RTreeIndex, Rect};
pub use sequential::SequentialFile;

/// The primary index kind chosen at table-creation time
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IndexKind {
    /// Ordered B+ tree with linked leaves, see [`BPlusTree`]
    BPlusTree,

    /// Static sorted leaf array with summary levels, see [`IsamIndex`]
    Isam,

    /// Extendible hashing, see [`ExtendibleHash`]
    ExtendibleHash,

    /// Sorted main file + unsorted aux file, see [`SequentialFile`]
    Sequential,

    /// 2-D spatial index, see [`RTreeIndex`]
    RTree,
}

impl From<IndexKind> for u8 {
    fn from(val: IndexKind) -> Self {
        match val {
            IndexKind::BPlusTree => 0,
            IndexKind::Isam => 1,
            IndexKind::ExtendibleHash => 2,
            IndexKind::Sequential => 3,
            IndexKind::RTree => 4,
        }
    }
}

impl TryFrom<u8> for IndexKind {
    type Error = ();

    fn try_from(value: u8) -> std::result::Result<Self, ()> {
        match value {
            0 => Ok(Self::BPlusTree),
            1 => Ok(Self::Isam),
            2 => Ok(Self::ExtendibleHash),
            3 => Ok(Self::Sequential),
            4 => Ok(Self::RTree),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::BPlusTree => "b+tree",
                Self::Isam => "isam",
                Self::ExtendibleHash => "extendible-hash",
                Self::Sequential => "sequential",
                Self::RTree => "rtree",
            }
        )
    }
}

/// Common contract of the key → heap-slot indexes.
///
/// Mutating operations leave the on-disk snapshot consistent before they
/// return. Duplicate-key policy is per index: the B+ tree upserts, ISAM and
/// extendible hashing admit positional duplicates via overflow. The table
/// manager exposes only upsert semantics on top of this trait.
#[enum_dispatch]
pub trait KeyIndex {
    /// Inserts a key/slot entry.
    fn insert(&mut self, key: Value, slot: u32) -> Result<()>;

    /// Returns the slot stored for the key.
    fn search(&self, key: &Value) -> Option<u32>;

    /// Returns all entries with `lo <= key <= hi`.
    fn range_search(&self, lo: &Value, hi: &Value) -> Vec<(Value, u32)>;

    /// Removes the key. Returns `false` if it was absent.
    fn delete(&mut self, key: &Value) -> Result<bool>;

    /// Overwrites the slot of an existing key, inserting if absent.
    fn update(&mut self, key: Value, slot: u32) -> Result<()>;

    /// Returns `true` if the index holds no entries.
    fn is_empty(&self) -> bool;

    /// Writes the snapshot file.
    fn persist(&self) -> Result<()>;
}

/// May be any of the key → slot indexes
#[enum_dispatch(KeyIndex)]
pub enum AnyKeyIndex {
    /// B+ tree index
    BPlusTree(BPlusTree),

    /// ISAM index
    Isam(IsamIndex),

    /// Extendible hash index
    ExtendibleHash(ExtendibleHash),
}
