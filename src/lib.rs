// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A small relational storage engine: one table abstraction backed by a
//! pluggable primary index chosen at table-creation time.
//!
//! Records are fixed-size and schema-typed (i32, f32, fixed-length UTF-8
//! strings). Heap-backed tables store records in a slotted data file with a
//! free-slot list; the primary index maps keys to heap slots. Five index
//! kinds are available:
//!
//! - **B+ tree** — ordered, linked leaves, range scans
//! - **ISAM** — static sorted leaf array with summary levels and overflow
//!   chains
//! - **Extendible hashing** — directory doubling, per-bucket local depth
//! - **Sequential file** — sorted main file plus unsorted aux file, merged
//!   in batches (this kind owns its data files; no heap)
//! - **R-tree** — 2-D points and rectangles, bbox / radius / kNN queries
//!
//! Every mutating operation leaves the index snapshot and the heap flushed
//! before it returns. The engine is single-threaded; callers serialize
//! access to a table and its files.
//!
//! # Example usage
//!
//! ```
//! use tabular_engine::{Field, FieldType, IndexKind, Record, Schema, TableConfig, Value};
//! #
//! # let folder = tempfile::tempdir()?;
//!
//! let schema = Schema::new(
//!     "users",
//!     vec![
//!         Field::new("id", FieldType::I32),
//!         Field::new("name", FieldType::Str(16)),
//!     ],
//!     "id",
//! )?;
//!
//! let mut table = TableConfig::new(&folder, schema, IndexKind::BPlusTree).open()?;
//!
//! let record = Record::new(
//!     table.schema(),
//!     vec![Value::I32(1), Value::Str("ada".into())],
//! )?;
//! table.add_record(&record)?;
//!
//! let found = table.get_record(&Value::I32(1))?;
//! assert_eq!(Some(record.values()), found.as_ref().map(|r| r.values()));
//!
//! let hits = table.range_search(&Value::I32(0), &Value::I32(9))?;
//! assert_eq!(1, hits.len());
//! #
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(clippy::all, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![warn(clippy::multiple_crate_versions)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]

pub mod coding;

mod config;
mod error;

#[doc(hidden)]
pub mod file;

mod hash;

pub mod heap;
pub mod index;
pub mod record;
pub mod schema;

mod snapshot;
mod table;
mod value;

pub use config::TableConfig;
pub use error::{Error, Result};
pub use heap::HeapFile;
pub use index::{
    AnyKeyIndex, BPlusTree, ExtendibleHash, IndexKind, IsamIndex, KeyIndex, RTree, RTreeIndex,
    Rect, SequentialFile,
};
pub use record::{Record, NEXT_LIVE, NEXT_TOMBSTONE};
pub use schema::{Field, FieldType, Schema, SchemaError};
pub use table::Table;
pub use value::Value;
