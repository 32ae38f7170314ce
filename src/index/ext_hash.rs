// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{IndexKind, KeyIndex};
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::hash::hash64;
use crate::snapshot::Snapshot;
use crate::value::Value;
use crate::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::PathBuf;

/// Default entries per bucket
pub const DEFAULT_BUCKET_SIZE: usize = 3;

type BucketId = u32;

#[derive(Debug)]
struct Bucket {
    /// Number of key bits this bucket discriminates on
    local_depth: u8,

    entries: Vec<(Value, u32)>,

    /// At most one chained overflow bucket is permitted
    overflow: Option<Vec<(Value, u32)>>,
}

impl Bucket {
    fn with_depth(local_depth: u8) -> Self {
        Self {
            local_depth,
            entries: vec![],
            overflow: None,
        }
    }

    fn find(&self, key: &Value) -> Option<u32> {
        self.entries
            .iter()
            .chain(self.overflow.iter().flatten())
            .find(|(k, _)| k == key)
            .map(|(_, slot)| *slot)
    }
}

/// Directory-addressed hash value for a key.
///
/// Integer keys hash to their own two's-complement value, which keeps the
/// directory layout reproducible and intuitive; other key types go through
/// a fixed-seed xxh3 so the mapping is stable across runs.
fn key_hash(key: &Value) -> u64 {
    match key {
        Value::I32(v) => i64::from(*v) as u64,
        other => {
            let mut buf = vec![];
            other.canonical_bytes(&mut buf);
            hash64(&buf)
        }
    }
}

/// An extendible hash index mapping keys to heap slots.
///
/// The directory holds `2^global_depth` references into a bucket arena;
/// several directory slots may reference the same bucket, distinguished by
/// the bucket's local depth. A full bucket with spare depth splits; at the
/// depth ceiling it chains a single overflow bucket; when even the chain is
/// full, the directory doubles and all chains are flattened back in.
///
/// Buckets never merge on underflow.
pub struct ExtendibleHash {
    global_depth: u8,
    bucket_size: usize,
    directory: Vec<BucketId>,
    buckets: Vec<Bucket>,
    path: PathBuf,
}

impl ExtendibleHash {
    /// Creates an empty index with the given bucket capacity.
    ///
    /// A fresh directory starts at global depth 2 over two depth-1 buckets.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_size` is zero.
    #[must_use]
    pub fn new(path: PathBuf, bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");

        Self {
            global_depth: 2,
            bucket_size,
            directory: vec![0, 1, 0, 1],
            buckets: vec![Bucket::with_depth(1), Bucket::with_depth(1)],
            path,
        }
    }

    /// Opens the index from its snapshot file, or creates an empty one if
    /// the file does not exist.
    pub fn open(path: PathBuf, bucket_size: usize) -> Result<Self> {
        match Snapshot::load(&path, IndexKind::ExtendibleHash.into())? {
            Some(payload) => {
                let mut index = Self::decode_from(&mut &payload[..])?;
                index.path = path;

                log::debug!(
                    "ext_hash: loaded snapshot, global depth {}, {} buckets",
                    index.global_depth,
                    index.buckets.len(),
                );
                Ok(index)
            }
            None => Ok(Self::new(path, bucket_size)),
        }
    }

    /// Returns the current global depth.
    #[must_use]
    pub fn global_depth(&self) -> u8 {
        self.global_depth
    }

    fn dir_index(&self, key: &Value) -> usize {
        (key_hash(key) % (1_u64 << self.global_depth)) as usize
    }

    fn unique_bucket_ids(&self) -> BTreeSet<BucketId> {
        self.directory.iter().copied().collect()
    }

    fn insert_entry(&mut self, key: Value, slot: u32) {
        loop {
            let dir_idx = self.dir_index(&key);
            let id = self.directory[dir_idx] as usize;

            if self.buckets[id].entries.len() < self.bucket_size {
                self.buckets[id].entries.push((key, slot));
                return;
            }

            if self.buckets[id].local_depth < self.global_depth {
                self.split(dir_idx);
                continue;
            }

            // depth ceiling reached, try the (single) overflow chain
            let chain_full = self.buckets[id]
                .overflow
                .as_ref()
                .is_some_and(|chain| chain.len() >= self.bucket_size);

            if chain_full {
                self.grow_directory();
                continue;
            }

            self.buckets[id]
                .overflow
                .get_or_insert_with(Vec::new)
                .push((key, slot));
            return;
        }
    }

    /// Splits the bucket referenced by `dir_idx`: its local depth grows by
    /// one, directory slots whose extra bit is set are repointed to a fresh
    /// bucket, and the old entries are re-dealt between the two.
    fn split(&mut self, dir_idx: usize) {
        let old_id = self.directory[dir_idx];

        let new_depth = self.buckets[old_id as usize].local_depth + 1;
        self.buckets[old_id as usize].local_depth = new_depth;

        let new_id = self.buckets.len() as BucketId;
        self.buckets.push(Bucket::with_depth(new_depth));

        let extra_bit = 1_usize << (new_depth - 1);

        for (i, slot) in self.directory.iter_mut().enumerate() {
            if *slot == old_id && (i & extra_bit) != 0 {
                *slot = new_id;
            }
        }

        log::trace!("ext_hash: split bucket {old_id} -> {new_id} at depth {new_depth}");

        let entries = std::mem::take(&mut self.buckets[old_id as usize].entries);
        for (key, slot) in entries {
            self.insert_entry(key, slot);
        }
    }

    /// Doubles the directory (incrementing the global depth) and flattens
    /// every overflow chain back into the table.
    fn grow_directory(&mut self) {
        self.global_depth += 1;

        let doubled: Vec<BucketId> = self.directory.clone();
        self.directory.extend(doubled);

        log::trace!("ext_hash: directory grown to global depth {}", self.global_depth);

        let dir_len = self.directory.len();
        for i in 0..dir_len {
            let id = self.directory[i] as usize;

            if let Some(chain) = self.buckets[id].overflow.take() {
                for (key, slot) in chain {
                    self.insert_entry(key, slot);
                }
            }
        }
    }

    /// Asserts the directory invariants: the directory length is
    /// `2^global_depth`, local depths never exceed the global depth, and
    /// directory slots sharing a bucket agree on their low `local_depth`
    /// bits.
    ///
    /// # Panics
    ///
    /// Panics if an invariant is violated.
    #[doc(hidden)]
    pub fn verify_invariants(&self) {
        assert_eq!(1_usize << self.global_depth, self.directory.len());

        for &id in &self.directory {
            assert!(self.buckets[id as usize].local_depth <= self.global_depth);
        }

        for (i, &a) in self.directory.iter().enumerate() {
            for (j, &b) in self.directory.iter().enumerate().skip(i + 1) {
                if a == b {
                    let depth = self.buckets[a as usize].local_depth;
                    let mask = (1_usize << depth) - 1;
                    assert_eq!(
                        i & mask,
                        j & mask,
                        "slots {i} and {j} share bucket {a} but differ in their low {depth} bits"
                    );
                }
            }
        }
    }
}

impl KeyIndex for ExtendibleHash {
    /// Inserts `(key, slot)`. An existing key keeps its entry; the new one
    /// coexists as a positional duplicate (callers wanting upsert semantics
    /// use [`KeyIndex::update`]).
    fn insert(&mut self, key: Value, slot: u32) -> Result<()> {
        self.insert_entry(key, slot);
        self.persist()
    }

    fn search(&self, key: &Value) -> Option<u32> {
        let id = self.directory[self.dir_index(key)];
        self.buckets[id as usize].find(key)
    }

    /// Filters every bucket by `lo <= key <= hi`.
    ///
    /// Hashing does not preserve key order, so this is a full O(N) sweep;
    /// it is provided for completeness.
    fn range_search(&self, lo: &Value, hi: &Value) -> Vec<(Value, u32)> {
        let mut result = vec![];

        for id in self.unique_bucket_ids() {
            let bucket = &self.buckets[id as usize];

            for (key, slot) in bucket.entries.iter().chain(bucket.overflow.iter().flatten()) {
                if key >= lo && key <= hi {
                    result.push((key.clone(), *slot));
                }
            }
        }

        result
    }

    fn delete(&mut self, key: &Value) -> Result<bool> {
        let id = self.directory[self.dir_index(key)] as usize;

        if let Some(idx) = self.buckets[id].entries.iter().position(|(k, _)| k == key) {
            self.buckets[id].entries.remove(idx);
            self.persist()?;
            return Ok(true);
        }

        let mut removed = false;
        let mut drop_chain = false;

        if let Some(chain) = self.buckets[id].overflow.as_mut() {
            if let Some(idx) = chain.iter().position(|(k, _)| k == key) {
                chain.remove(idx);
                removed = true;
                drop_chain = chain.is_empty();
            }
        }

        if drop_chain {
            // the emptied chain is released
            self.buckets[id].overflow = None;
        }

        if removed {
            self.persist()?;
            return Ok(true);
        }

        Ok(false)
    }

    fn update(&mut self, key: Value, slot: u32) -> Result<()> {
        let id = self.directory[self.dir_index(&key)] as usize;
        let bucket = &mut self.buckets[id];

        let overwritten = bucket
            .entries
            .iter_mut()
            .chain(bucket.overflow.iter_mut().flatten())
            .find(|(k, _)| k == &key)
            .map(|entry| entry.1 = slot);

        if overwritten.is_some() {
            self.persist()
        } else {
            self.insert(key, slot)
        }
    }

    fn is_empty(&self) -> bool {
        self.unique_bucket_ids().iter().all(|&id| {
            let bucket = &self.buckets[id as usize];
            bucket.entries.is_empty() && bucket.overflow.is_none()
        })
    }

    fn persist(&self) -> Result<()> {
        Snapshot::persist(
            &self.path,
            IndexKind::ExtendibleHash.into(),
            &self.encode_into_vec(),
        )
    }
}

fn encode_entries<W: Write>(
    entries: &[(Value, u32)],
    writer: &mut W,
) -> std::result::Result<(), EncodeError> {
    writer.write_u32::<LittleEndian>(entries.len() as u32)?;
    for (key, slot) in entries {
        key.encode_into(writer)?;
        writer.write_u32::<LittleEndian>(*slot)?;
    }
    Ok(())
}

fn decode_entries<R: Read>(reader: &mut R) -> std::result::Result<Vec<(Value, u32)>, DecodeError> {
    let len = reader.read_u32::<LittleEndian>()? as usize;

    let mut entries = Vec::with_capacity(len);
    for _ in 0..len {
        let key = Value::decode_from(reader)?;
        let slot = reader.read_u32::<LittleEndian>()?;
        entries.push((key, slot));
    }

    Ok(entries)
}

impl Encode for ExtendibleHash {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        writer.write_u8(self.global_depth)?;
        writer.write_u32::<LittleEndian>(self.bucket_size as u32)?;

        writer.write_u32::<LittleEndian>(self.buckets.len() as u32)?;
        for bucket in &self.buckets {
            writer.write_u8(bucket.local_depth)?;
            encode_entries(&bucket.entries, writer)?;

            match &bucket.overflow {
                Some(chain) => {
                    writer.write_u8(1)?;
                    encode_entries(chain, writer)?;
                }
                None => writer.write_u8(0)?,
            }
        }

        for &id in &self.directory {
            writer.write_u32::<LittleEndian>(id)?;
        }

        Ok(())
    }
}

impl Decode for ExtendibleHash {
    fn decode_from<R: Read>(reader: &mut R) -> std::result::Result<Self, DecodeError> {
        let global_depth = reader.read_u8()?;
        if global_depth == 0 || global_depth > 31 {
            return Err(DecodeError::InvalidHeader("invalid global depth"));
        }

        let bucket_size = reader.read_u32::<LittleEndian>()? as usize;
        if bucket_size == 0 {
            return Err(DecodeError::InvalidHeader("invalid bucket size"));
        }

        let bucket_count = reader.read_u32::<LittleEndian>()? as usize;
        let mut buckets = Vec::with_capacity(bucket_count);

        for _ in 0..bucket_count {
            let local_depth = reader.read_u8()?;
            let entries = decode_entries(reader)?;

            let overflow = match reader.read_u8()? {
                0 => None,
                1 => Some(decode_entries(reader)?),
                tag => return Err(DecodeError::InvalidTag(("Bucket", tag))),
            };

            buckets.push(Bucket {
                local_depth,
                entries,
                overflow,
            });
        }

        let dir_len = 1_usize << global_depth;
        let mut directory = Vec::with_capacity(dir_len);

        for _ in 0..dir_len {
            let id = reader.read_u32::<LittleEndian>()?;
            if id as usize >= bucket_count {
                return Err(DecodeError::InvalidHeader("directory points past buckets"));
            }
            directory.push(id);
        }

        Ok(Self {
            global_depth,
            bucket_size,
            directory,
            buckets,
            path: PathBuf::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn index(dir: &std::path::Path) -> ExtendibleHash {
        ExtendibleHash::new(dir.join("hash.idx"), 3)
    }

    #[test]
    fn insert_search_delete() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut index = index(dir.path());

        for key in [4, 6, 8, 10, 1, 5, 9, 13, 17, 21, 25] {
            index.insert(Value::I32(key), key as u32)?;
            index.verify_invariants();
        }

        assert_eq!(Some(17), index.search(&Value::I32(17)));
        assert!(index.global_depth() >= 3);

        assert!(index.delete(&Value::I32(13))?);
        assert_eq!(None, index.search(&Value::I32(13)));
        assert!(!index.delete(&Value::I32(13))?);

        Ok(())
    }

    #[test]
    fn directory_growth_keeps_entries_reachable() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut index = index(dir.path());

        for key in 0..200 {
            index.insert(Value::I32(key), key as u32)?;
        }

        index.verify_invariants();

        for key in 0..200 {
            assert_eq!(Some(key as u32), index.search(&Value::I32(key)));
        }

        Ok(())
    }

    #[test]
    fn range_sweep() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut index = index(dir.path());

        for key in 0..30 {
            index.insert(Value::I32(key), key as u32)?;
        }

        let mut hits = index.range_search(&Value::I32(10), &Value::I32(19));
        hits.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(10, hits.len());
        assert_eq!((Value::I32(10), 10), hits[0]);
        assert_eq!((Value::I32(19), 19), hits[9]);

        Ok(())
    }

    #[test]
    fn update_overwrites_in_place() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut index = index(dir.path());

        index.insert(Value::I32(7), 1)?;
        index.update(Value::I32(7), 2)?;
        assert_eq!(Some(2), index.search(&Value::I32(7)));

        index.update(Value::I32(8), 3)?;
        assert_eq!(Some(3), index.search(&Value::I32(8)));

        Ok(())
    }

    #[test]
    fn string_keys_are_stable() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("hash.idx");

        {
            let mut index = ExtendibleHash::new(path.clone(), 3);
            for (i, name) in ["ada", "grace", "edsger", "donald", "barbara"]
                .into_iter()
                .enumerate()
            {
                index.insert(Value::Str(name.into()), i as u32)?;
            }
        }

        {
            let index = ExtendibleHash::open(path, 3)?;
            index.verify_invariants();
            assert_eq!(Some(1), index.search(&Value::Str("grace".into())));
            assert_eq!(None, index.search(&Value::Str("alan".into())));
        }

        Ok(())
    }

    #[test]
    fn snapshot_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("hash.idx");

        {
            let mut index = ExtendibleHash::new(path.clone(), 3);
            for key in 0..50 {
                index.insert(Value::I32(key), (key + 1_000) as u32)?;
            }
        }

        {
            let index = ExtendibleHash::open(path, 3)?;
            index.verify_invariants();

            for key in 0..50 {
                assert_eq!(Some((key + 1_000) as u32), index.search(&Value::I32(key)));
            }
        }

        Ok(())
    }
}
