// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::index::bplus::DEFAULT_ORDER;
use crate::index::ext_hash::DEFAULT_BUCKET_SIZE;
use crate::index::rtree::DEFAULT_MAX_CHILDREN;
use crate::index::sequential::DEFAULT_AUX_THRESHOLD;
use crate::index::IndexKind;
use crate::schema::Schema;
use crate::table::Table;
use crate::Result;
use std::path::{Path, PathBuf};

/// Table configuration builder.
///
/// Binds a schema to an index kind and a folder; the per-index tuning knobs
/// have sensible defaults for small tables and tests.
///
/// ```no_run
/// use tabular_engine::{Field, FieldType, IndexKind, Schema, TableConfig};
///
/// let schema = Schema::new(
///     "users",
///     vec![
///         Field::new("id", FieldType::I32),
///         Field::new("name", FieldType::Str(16)),
///     ],
///     "id",
/// )?;
///
/// let table = TableConfig::new("/tmp/db", schema, IndexKind::BPlusTree)
///     .order(8)
///     .open()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct TableConfig {
    /// Folder the table's files live in
    pub(crate) folder: PathBuf,

    /// Table schema
    pub(crate) schema: Schema,

    /// Chosen primary index
    pub(crate) kind: IndexKind,

    /// B+ tree fan-out (max keys per node)
    pub(crate) order: usize,

    /// Extendible hash bucket capacity
    pub(crate) bucket_size: usize,

    /// R-tree fan-out (max children per node)
    pub(crate) max_children: usize,

    /// Sequential-file merge threshold
    pub(crate) aux_threshold: u32,

    /// Names of the two coordinate fields (R-tree only)
    pub(crate) spatial_fields: Option<(String, String)>,
}

impl TableConfig {
    /// Initializes a new config.
    pub fn new<P: AsRef<Path>>(folder: P, schema: Schema, kind: IndexKind) -> Self {
        Self {
            folder: folder.as_ref().into(),
            schema,
            kind,
            order: DEFAULT_ORDER,
            bucket_size: DEFAULT_BUCKET_SIZE,
            max_children: DEFAULT_MAX_CHILDREN,
            aux_threshold: DEFAULT_AUX_THRESHOLD,
            spatial_fields: None,
        }
    }

    /// Sets the B+ tree order (max keys per node).
    ///
    /// Defaults to 4.
    ///
    /// # Panics
    ///
    /// Panics if `order < 2`.
    #[must_use]
    pub fn order(mut self, order: usize) -> Self {
        assert!(order >= 2, "invalid order");

        self.order = order;
        self
    }

    /// Sets the extendible hash bucket capacity.
    ///
    /// Defaults to 3.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    #[must_use]
    pub fn bucket_size(mut self, n: usize) -> Self {
        assert!(n > 0, "invalid bucket size");

        self.bucket_size = n;
        self
    }

    /// Sets the R-tree fan-out (max children per node).
    ///
    /// Defaults to 4.
    ///
    /// # Panics
    ///
    /// Panics if `m < 2`.
    #[must_use]
    pub fn max_children(mut self, m: usize) -> Self {
        assert!(m >= 2, "invalid fan-out");

        self.max_children = m;
        self
    }

    /// Sets the number of aux records that triggers a sequential-file merge.
    ///
    /// Defaults to 5; production workloads usually raise this.
    ///
    /// # Panics
    ///
    /// Panics if `k` is zero.
    #[must_use]
    pub fn aux_threshold(mut self, k: u32) -> Self {
        assert!(k > 0, "invalid aux threshold");

        self.aux_threshold = k;
        self
    }

    /// Names the two numeric coordinate fields the R-tree indexes.
    ///
    /// Required for [`IndexKind::RTree`]; ignored by every other kind.
    #[must_use]
    pub fn spatial_fields<S: Into<String>>(mut self, x: S, y: S) -> Self {
        self.spatial_fields = Some((x.into(), y.into()));
        self
    }

    /// Opens the table, creating its files if they do not exist yet.
    ///
    /// A present but corrupt index snapshot is discarded and the index is
    /// rebuilt from the heap (heap-backed kinds only).
    pub fn open(self) -> Result<Table> {
        Table::open(self)
    }
}
