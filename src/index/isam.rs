// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{IndexKind, KeyIndex};
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::snapshot::Snapshot;
use crate::value::Value;
use crate::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::PathBuf;

const PAGE_SIZE: usize = 4_096;
const PAGE_HEADER_SIZE: usize = 4;

/// Size of one `(key, slot)` entry in a summary page
const ENTRY_SIZE: usize = 8;

/// Entries per summary page, derived from a 4 KiB page
const PAGE_FANOUT: usize = (PAGE_SIZE - PAGE_HEADER_SIZE) / ENTRY_SIZE;

/// An ISAM-style index: a sorted leaf array with two derived summary levels
/// and per-key overflow chains.
///
/// `l3` is the ordered list of `(key, base slot)` pairs. `l2` summarizes
/// `l3` page-wise (`(first key, page start)`), and `l1` summarizes `l2` the
/// same way; both are rebuilt from `l3` after every base mutation, which is
/// `O(|l3| / fanout)`.
///
/// Duplicate insertions of an existing key go to the key's overflow chain
/// instead of the leaf array; deleting such a key promotes the first
/// overflow slot into the base entry.
pub struct IsamIndex {
    l1: Vec<(Value, u32)>,
    l2: Vec<(Value, u32)>,
    l3: Vec<(Value, u32)>,
    overflow: BTreeMap<Value, Vec<u32>>,
    fanout: usize,
    path: PathBuf,
}

/// Index of the greatest entry with key <= `key`.
fn floor_search(list: &[(Value, u32)], key: &Value) -> Option<usize> {
    let idx = list.partition_point(|(k, _)| k <= key);
    idx.checked_sub(1)
}

impl IsamIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            l1: vec![],
            l2: vec![],
            l3: vec![],
            overflow: BTreeMap::new(),
            fanout: PAGE_FANOUT,
            path,
        }
    }

    /// Opens the index from its snapshot file, or creates an empty one if
    /// the file does not exist.
    pub fn open(path: PathBuf) -> Result<Self> {
        match Snapshot::load(&path, IndexKind::Isam.into())? {
            Some(payload) => {
                let mut index = Self::decode_from(&mut &payload[..])?;
                index.path = path;

                if index.l2.is_empty() && !index.l3.is_empty() {
                    index.rebuild_summaries();
                }

                log::debug!("isam: loaded snapshot, {} leaf entries", index.l3.len());
                Ok(index)
            }
            None => Ok(Self::new(path)),
        }
    }

    /// Sorted insertion point for `key` in the leaf array.
    fn insert_pos(&self, key: &Value) -> usize {
        self.l3.partition_point(|(k, _)| k < key)
    }

    /// Rebuilds `l2` and `l1` by paging the level below.
    fn rebuild_summaries(&mut self) {
        self.l2.clear();
        self.l1.clear();

        for page_start in (0..self.l3.len()).step_by(self.fanout) {
            self.l2
                .push((self.l3[page_start].0.clone(), page_start as u32));
        }

        for block_start in (0..self.l2.len()).step_by(self.fanout) {
            self.l1
                .push((self.l2[block_start].0.clone(), block_start as u32));
        }
    }

    /// Exact-match position in `l3`, located top-down through the summaries.
    fn locate(&self, key: &Value) -> Option<usize> {
        if self.l3.is_empty() {
            return None;
        }

        // l1 narrows the l2 block, l2 narrows the l3 page
        let block = floor_search(&self.l1, key)?;
        let block_start = self.l1[block].1 as usize;
        let block_end = (block_start + self.fanout).min(self.l2.len());

        let within = floor_search(&self.l2[block_start..block_end], key)?;
        let page_start = self.l2[block_start + within].1 as usize;
        let page_end = (page_start + self.fanout).min(self.l3.len());

        self.l3[page_start..page_end]
            .binary_search_by(|(k, _)| k.cmp(key))
            .ok()
            .map(|idx| page_start + idx)
    }

    /// Returns the base slot plus all overflow slots for `key`, base first.
    #[must_use]
    pub fn get_all_positions(&self, key: &Value) -> Vec<u32> {
        let Some(base) = self.search(key) else {
            return vec![];
        };

        let mut positions = vec![base];
        if let Some(extra) = self.overflow.get(key) {
            positions.extend_from_slice(extra);
        }

        positions
    }

    /// Replaces the whole leaf array with the given pairs and clears all
    /// overflow chains.
    pub fn bulk_insert(&mut self, mut pairs: Vec<(Value, u32)>) -> Result<()> {
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        self.l3 = pairs;
        self.overflow.clear();
        self.rebuild_summaries();

        self.persist()
    }

    /// Number of leaf (base) entries.
    #[allow(clippy::len_without_is_empty)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.l3.len()
    }

    #[doc(hidden)]
    #[must_use]
    pub fn summary_levels(&self) -> (&[(Value, u32)], &[(Value, u32)]) {
        (&self.l1, &self.l2)
    }
}

impl KeyIndex for IsamIndex {
    /// Inserts `(key, slot)`. If the key already has a base entry, the slot
    /// is appended to its overflow chain instead (deduplicated).
    fn insert(&mut self, key: Value, slot: u32) -> Result<()> {
        let idx = self.insert_pos(&key);

        if idx < self.l3.len() && self.l3[idx].0 == key {
            let base_slot = self.l3[idx].1;

            let chain = self.overflow.entry(key).or_default();
            if slot != base_slot && !chain.contains(&slot) {
                chain.push(slot);
            }

            return self.persist();
        }

        self.l3.insert(idx, (key.clone(), slot));

        // an empty chain left behind by deletes must not shadow the new base
        if self.overflow.get(&key).is_some_and(Vec::is_empty) {
            self.overflow.remove(&key);
        }

        self.rebuild_summaries();
        self.persist()
    }

    fn search(&self, key: &Value) -> Option<u32> {
        self.locate(key).map(|idx| self.l3[idx].1)
    }

    fn range_search(&self, lo: &Value, hi: &Value) -> Vec<(Value, u32)> {
        let mut result = vec![];

        let mut idx = self.l3.partition_point(|(k, _)| k < lo);
        while idx < self.l3.len() && self.l3[idx].0 <= *hi {
            let (key, base_slot) = &self.l3[idx];
            result.push((key.clone(), *base_slot));

            if let Some(extra) = self.overflow.get(key) {
                for &slot in extra {
                    result.push((key.clone(), slot));
                }
            }

            idx += 1;
        }

        result
    }

    /// Removes the base entry. If the key has overflow slots, the first one
    /// is promoted to base instead, preserving the key's existence.
    fn delete(&mut self, key: &Value) -> Result<bool> {
        let Some(idx) = self.locate(key) else {
            return Ok(false);
        };

        if let Some(chain) = self.overflow.get_mut(key) {
            if !chain.is_empty() {
                let promoted = chain.remove(0);
                if chain.is_empty() {
                    self.overflow.remove(key);
                }

                self.l3[idx].1 = promoted;

                self.persist()?;
                return Ok(true);
            }
        }

        self.l3.remove(idx);
        self.rebuild_summaries();

        self.persist()?;
        Ok(true)
    }

    /// Overwrites the base slot of an existing key; inserts a new base entry
    /// otherwise. Overflow chains are left untouched.
    fn update(&mut self, key: Value, slot: u32) -> Result<()> {
        if let Some(idx) = self.locate(&key) {
            self.l3[idx].1 = slot;
            return self.persist();
        }

        let idx = self.insert_pos(&key);
        self.l3.insert(idx, (key, slot));
        self.rebuild_summaries();

        self.persist()
    }

    fn is_empty(&self) -> bool {
        self.l3.is_empty()
    }

    fn persist(&self) -> Result<()> {
        Snapshot::persist(&self.path, IndexKind::Isam.into(), &self.encode_into_vec())
    }
}

fn encode_level<W: Write>(
    level: &[(Value, u32)],
    writer: &mut W,
) -> std::result::Result<(), EncodeError> {
    writer.write_u32::<LittleEndian>(level.len() as u32)?;
    for (key, slot) in level {
        key.encode_into(writer)?;
        writer.write_u32::<LittleEndian>(*slot)?;
    }
    Ok(())
}

fn decode_level<R: Read>(reader: &mut R) -> std::result::Result<Vec<(Value, u32)>, DecodeError> {
    let len = reader.read_u32::<LittleEndian>()? as usize;

    let mut level = Vec::with_capacity(len);
    for _ in 0..len {
        let key = Value::decode_from(reader)?;
        let slot = reader.read_u32::<LittleEndian>()?;
        level.push((key, slot));
    }

    Ok(level)
}

impl Encode for IsamIndex {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        writer.write_u32::<LittleEndian>(self.fanout as u32)?;

        encode_level(&self.l3, writer)?;
        encode_level(&self.l2, writer)?;
        encode_level(&self.l1, writer)?;

        writer.write_u32::<LittleEndian>(self.overflow.len() as u32)?;
        for (key, slots) in &self.overflow {
            key.encode_into(writer)?;
            writer.write_u32::<LittleEndian>(slots.len() as u32)?;
            for slot in slots {
                writer.write_u32::<LittleEndian>(*slot)?;
            }
        }

        Ok(())
    }
}

impl Decode for IsamIndex {
    fn decode_from<R: Read>(reader: &mut R) -> std::result::Result<Self, DecodeError> {
        let fanout = reader.read_u32::<LittleEndian>()? as usize;
        if fanout == 0 {
            return Err(DecodeError::InvalidHeader("invalid isam fanout"));
        }

        let l3 = decode_level(reader)?;
        let l2 = decode_level(reader)?;
        let l1 = decode_level(reader)?;

        let overflow_len = reader.read_u32::<LittleEndian>()? as usize;
        let mut overflow = BTreeMap::new();

        for _ in 0..overflow_len {
            let key = Value::decode_from(reader)?;
            let slot_count = reader.read_u32::<LittleEndian>()? as usize;

            let mut slots = Vec::with_capacity(slot_count);
            for _ in 0..slot_count {
                slots.push(reader.read_u32::<LittleEndian>()?);
            }

            overflow.insert(key, slots);
        }

        Ok(Self {
            l1,
            l2,
            l3,
            overflow,
            fanout,
            path: PathBuf::new(),
        })
    }
}
