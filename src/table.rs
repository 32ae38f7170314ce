// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::config::TableConfig;
use crate::file::{AUX_EXT, DATA_EXT, HEADER_EXT, INDEX_EXT};
use crate::heap::HeapFile;
use crate::index::{
    AnyKeyIndex, BPlusTree, ExtendibleHash, IndexKind, IsamIndex, KeyIndex, RTreeIndex, Rect,
    SequentialFile,
};
use crate::record::Record;
use crate::schema::Schema;
use crate::value::Value;
use crate::{Error, Result};
use std::path::PathBuf;

enum Backend {
    /// Heap-backed table with a key → slot index
    Keyed {
        heap: HeapFile,
        index: AnyKeyIndex,
    },

    /// The sequential-file index owns its own record files
    Sequential { index: SequentialFile },

    /// Heap-backed table with a spatial index over two coordinate fields
    Spatial {
        heap: HeapFile,
        index: RTreeIndex,
        x_field: usize,
        y_field: usize,
    },
}

/// A single table: one schema, one heap (unless sequential), one primary
/// index.
///
/// All record operations route through the index; the heap is never
/// consulted without it except for full scans and index rebuilds. Keys are
/// upserted at this layer: adding a record whose key already exists
/// overwrites the old record in place.
pub struct Table {
    schema: Schema,
    kind: IndexKind,
    backend: Backend,
}

/// Loads a key index, discarding a corrupt snapshot.
macro_rules! open_or_discard {
    ($index:ty, $path:expr, $($arg:expr),*) => {
        match <$index>::open($path.clone(), $($arg),*) {
            Ok(index) => index,
            Err(e) if e.is_corrupt_snapshot() => {
                log::warn!(
                    "discarding corrupt index snapshot {}: {e}",
                    $path.display(),
                );
                <$index>::new($path, $($arg),*)
            }
            Err(e) => return Err(e),
        }
    };
}

impl Table {
    pub(crate) fn open(config: TableConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.folder)?;

        let file = |ext: &str| -> PathBuf {
            config
                .folder
                .join(format!("{}.{ext}", config.schema.name()))
        };

        let schema = config.schema.clone();
        let kind = config.kind;

        let backend = match kind {
            IndexKind::Sequential => Backend::Sequential {
                index: SequentialFile::open(
                    file(DATA_EXT),
                    file(AUX_EXT),
                    schema.clone(),
                    config.aux_threshold,
                )?,
            },

            IndexKind::RTree => {
                let (x_name, y_name) = config.spatial_fields.as_ref().ok_or(
                    Error::Unsupported("an r-tree table needs two coordinate fields"),
                )?;

                let coord = |name: &str| -> Result<usize> {
                    let idx = schema
                        .field_index(name)
                        .ok_or(Error::Unsupported("unknown coordinate field"))?;

                    match schema.fields()[idx].field_type() {
                        crate::schema::FieldType::Str(_) => {
                            Err(Error::Unsupported("coordinate fields must be numeric"))
                        }
                        _ => Ok(idx),
                    }
                };

                let x_field = coord(x_name)?;
                let y_field = coord(y_name)?;

                let heap = HeapFile::open(file(DATA_EXT), file(HEADER_EXT), schema.clone())?;
                let path = file(INDEX_EXT);

                let index = open_or_discard!(RTreeIndex, path, config.max_children);

                let mut table = Self {
                    schema,
                    kind,
                    backend: Backend::Spatial {
                        heap,
                        index,
                        x_field,
                        y_field,
                    },
                };
                table.rebuild_index_if_needed()?;
                return Ok(table);
            }

            _ => {
                let heap = HeapFile::open(file(DATA_EXT), file(HEADER_EXT), schema.clone())?;
                let path = file(INDEX_EXT);

                let index = match kind {
                    IndexKind::BPlusTree => {
                        AnyKeyIndex::from(open_or_discard!(BPlusTree, path, config.order))
                    }
                    IndexKind::Isam => AnyKeyIndex::from(open_or_discard!(IsamIndex, path,)),
                    IndexKind::ExtendibleHash => AnyKeyIndex::from(open_or_discard!(
                        ExtendibleHash,
                        path,
                        config.bucket_size
                    )),
                    _ => unreachable!("handled above"),
                };

                Backend::Keyed { heap, index }
            }
        };

        let mut table = Self {
            schema,
            kind,
            backend,
        };
        table.rebuild_index_if_needed()?;

        Ok(table)
    }

    /// Re-derives the index from the heap when the snapshot was absent or
    /// corrupt but data exists.
    fn rebuild_index_if_needed(&mut self) -> Result<()> {
        match &mut self.backend {
            Backend::Sequential { .. } => Ok(()),

            Backend::Keyed { heap, index } => {
                if !index.is_empty() || heap.file_size() == 0 {
                    return Ok(());
                }

                log::debug!("table {}: rebuilding index from heap", self.schema.name());

                for record in heap.live_records()? {
                    let slot = record.pos().expect("assigned by scan");
                    index.insert(record.key(&self.schema).clone(), slot)?;
                }

                Ok(())
            }

            Backend::Spatial {
                heap,
                index,
                x_field,
                y_field,
            } => {
                if !index.is_empty() || heap.file_size() == 0 {
                    return Ok(());
                }

                log::debug!(
                    "table {}: rebuilding spatial index from heap",
                    self.schema.name(),
                );

                for record in heap.live_records()? {
                    let slot = record.pos().expect("assigned by scan");
                    let (x, y) = spatial_coords(&record, *x_field, *y_field)?;
                    index.insert(record.key(&self.schema).clone(), x, y, slot)?;
                }

                Ok(())
            }
        }
    }

    /// Returns the table schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the chosen index kind.
    #[must_use]
    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    /// Adds a record (insert-or-replace by key).
    pub fn add_record(&mut self, record: &Record) -> Result<()> {
        self.schema.validate(record.values())?;
        let key = record.key(&self.schema).clone();

        match &mut self.backend {
            Backend::Sequential { index } => index.insert(record),

            Backend::Keyed { heap, index } => {
                if let Some(slot) = index.search(&key) {
                    // upsert: the key keeps its slot
                    heap.write_record_at(slot, record)
                } else {
                    let slot = heap.add_record(record)?;
                    index.insert(key, slot)
                }
            }

            Backend::Spatial {
                heap,
                index,
                x_field,
                y_field,
            } => {
                let (x, y) = spatial_coords(record, *x_field, *y_field)?;

                if let Some(slot) = index.search(&key) {
                    heap.write_record_at(slot, record)?;
                    index.update(key, x, y, slot)
                } else {
                    let slot = heap.add_record(record)?;
                    index.insert(key, x, y, slot)
                }
            }
        }
    }

    /// Returns the record stored under `key`.
    pub fn get_record(&self, key: &Value) -> Result<Option<Record>> {
        match &self.backend {
            Backend::Sequential { index } => index.search(key),

            Backend::Keyed { heap, index } => match index.search(key) {
                Some(slot) => heap.read_record(slot),
                None => Ok(None),
            },

            Backend::Spatial { heap, index, .. } => match index.search(key) {
                Some(slot) => heap.read_record(slot),
                None => Ok(None),
            },
        }
    }

    /// Replaces the record under `key` with new values, in place.
    ///
    /// Returns `false` if the key is absent. If the new values carry a
    /// different key, the old record is removed and the new one inserted.
    pub fn update_record(&mut self, key: &Value, values: Vec<Value>) -> Result<bool> {
        let record = Record::new(&self.schema, values)?;

        if record.key(&self.schema) != key {
            if !self.remove_record(key)? {
                return Ok(false);
            }
            self.add_record(&record)?;
            return Ok(true);
        }

        match &mut self.backend {
            Backend::Sequential { index } => index.update(key, &record),

            Backend::Keyed { heap, index } => match index.search(key) {
                Some(slot) => {
                    heap.write_record_at(slot, &record)?;
                    Ok(true)
                }
                None => Ok(false),
            },

            Backend::Spatial {
                heap,
                index,
                x_field,
                y_field,
            } => match index.search(key) {
                Some(slot) => {
                    let (x, y) = spatial_coords(&record, *x_field, *y_field)?;
                    heap.write_record_at(slot, &record)?;
                    index.update(key.clone(), x, y, slot)?;
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }

    /// Removes the record under `key`. Returns `false` if it was absent.
    pub fn remove_record(&mut self, key: &Value) -> Result<bool> {
        match &mut self.backend {
            Backend::Sequential { index } => index.delete(key),

            Backend::Keyed { heap, index } => match index.search(key) {
                Some(slot) => {
                    if heap.remove_record(slot)? {
                        index.delete(key)?;
                        Ok(true)
                    } else {
                        Ok(false)
                    }
                }
                None => Ok(false),
            },

            Backend::Spatial { heap, index, .. } => match index.search(key) {
                Some(slot) => {
                    if heap.remove_record(slot)? {
                        index.delete(key)?;
                        Ok(true)
                    } else {
                        Ok(false)
                    }
                }
                None => Ok(false),
            },
        }
    }

    /// Returns all live records with `lo <= key <= hi`.
    ///
    /// # Errors
    ///
    /// Unsupported for R-tree tables; use the spatial queries instead.
    pub fn range_search(&self, lo: &Value, hi: &Value) -> Result<Vec<Record>> {
        match &self.backend {
            Backend::Sequential { index } => index.range_search(lo, hi),

            Backend::Keyed { heap, index } => {
                let mut records = vec![];

                for (_, slot) in index.range_search(lo, hi) {
                    if let Some(record) = heap.read_record(slot)? {
                        if record.is_live() {
                            records.push(record);
                        }
                    }
                }

                Ok(records)
            }

            Backend::Spatial { .. } => Err(Error::Unsupported(
                "key-range queries on an r-tree table",
            )),
        }
    }

    fn spatial(&self) -> Result<(&HeapFile, &RTreeIndex)> {
        match &self.backend {
            Backend::Spatial { heap, index, .. } => Ok((heap, index)),
            _ => Err(Error::Unsupported("spatial queries on a non-spatial table")),
        }
    }

    fn read_slots(&self, heap: &HeapFile, slots: Vec<u32>) -> Result<Vec<Record>> {
        let mut records = vec![];

        for slot in slots {
            if let Some(record) = heap.read_record(slot)? {
                if record.is_live() {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    /// Returns all records whose point intersects the query rectangle
    /// (R-tree tables only).
    pub fn search_bbox(&self, query: &Rect) -> Result<Vec<Record>> {
        let (heap, index) = self.spatial()?;
        self.read_slots(heap, index.search_bbox(query))
    }

    /// Returns all records within `radius` of the point (R-tree tables
    /// only).
    pub fn search_radius(&self, x: f32, y: f32, radius: f32) -> Result<Vec<Record>> {
        let (heap, index) = self.spatial()?;
        self.read_slots(heap, index.search_radius(x, y, radius))
    }

    /// Returns the `k` records nearest to the point, closest first (R-tree
    /// tables only).
    pub fn knn(&self, x: f32, y: f32, k: usize) -> Result<Vec<Record>> {
        let (heap, index) = self.spatial()?;
        self.read_slots(heap, index.knn(x, y, k))
    }

    /// Returns every live record of the table.
    pub fn get_all(&self) -> Result<Vec<Record>> {
        match &self.backend {
            Backend::Sequential { index } => index.all_records(),
            Backend::Keyed { heap, .. } | Backend::Spatial { heap, .. } => heap.live_records(),
        }
    }

    /// Flushes the index snapshot (for the sequential kind: forces a
    /// merge).
    pub fn save_all(&mut self) -> Result<()> {
        match &mut self.backend {
            Backend::Sequential { index } => index.save(),
            Backend::Keyed { index, .. } => index.persist(),
            Backend::Spatial { index, .. } => index.persist(),
        }
    }
}

fn spatial_coords(record: &Record, x_field: usize, y_field: usize) -> Result<(f32, f32)> {
    let coord = |idx: usize| -> Result<f32> {
        record.values()[idx]
            .as_f32()
            .ok_or(Error::Unsupported("coordinate fields must be numeric"))
    };

    Ok((coord(x_field)?, coord(y_field)?))
}
