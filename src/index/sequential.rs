// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::file::fsync_directory;
use crate::record::{Record, NEXT_TOMBSTONE};
use crate::schema::Schema;
use crate::value::Value;
use crate::Result;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Default number of aux records that triggers a merge
pub const DEFAULT_AUX_THRESHOLD: u32 = 5;

/// A sequential-file index: a key-sorted main file plus an unsorted aux
/// file absorbing new records.
///
/// Unlike the other index kinds this one IS the data store: it owns its two
/// record files and no generic heap is involved. Deletion is logical (the
/// record's `next` link becomes `-1`); once the aux file holds
/// `aux_threshold` records, a merge folds it into the main file, dropping
/// all tombstones and restoring strict key order.
///
/// Inserting a key that is already live tombstones the old record first, so
/// at most one live record per key exists across both files.
pub struct SequentialFile {
    schema: Schema,
    main_path: PathBuf,
    aux_path: PathBuf,
    aux_threshold: u32,
    aux_count: u32,
}

fn touch(path: &Path) -> std::io::Result<()> {
    File::options()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map(|_| ())
}

impl SequentialFile {
    /// Opens (or initializes) the index over the given main and aux files.
    pub fn open(
        main_path: PathBuf,
        aux_path: PathBuf,
        schema: Schema,
        aux_threshold: u32,
    ) -> Result<Self> {
        assert!(aux_threshold > 0, "aux threshold must be positive");

        touch(&main_path)?;
        touch(&aux_path)?;

        let record_size = u64::from(schema.record_size());
        let aux_count = (std::fs::metadata(&aux_path)?.len() / record_size) as u32;

        Ok(Self {
            schema,
            main_path,
            aux_path,
            aux_threshold,
            aux_count,
        })
    }

    /// Returns the schema records are packed with.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn record_size(&self) -> u64 {
        u64::from(self.schema.record_size())
    }

    fn record_count(&self, path: &Path) -> Result<u64> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(meta.len() / self.record_size()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads every record of a file in physical order.
    fn read_file(&self, path: &Path) -> Result<Vec<Record>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut records = vec![];
        let mut buf = vec![0; self.schema.record_size() as usize];

        loop {
            match reader.read_exact(&mut buf) {
                Ok(()) => records.push(Record::unpack(&self.schema, &mut &buf[..])?),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(records)
    }

    /// Appends a record to the aux file; merges once the threshold is hit.
    ///
    /// If a live record with the same key exists, it is tombstoned first
    /// (insert-or-replace).
    pub fn insert(&mut self, record: &Record) -> Result<()> {
        let key = record.key(&self.schema).clone();
        if self.search(&key)?.is_some() {
            self.delete(&key)?;
        }

        let mut file = File::options().append(true).create(true).open(&self.aux_path)?;
        file.write_all(&record.pack(&self.schema))?;
        file.sync_all()?;

        self.aux_count += 1;

        if self.aux_count >= self.aux_threshold {
            log::debug!(
                "sequential: aux threshold {} reached, merging",
                self.aux_threshold,
            );
            self.rebuild()?;
        }

        Ok(())
    }

    /// Merges the aux file into the main file.
    ///
    /// Live aux records are sorted and merge-written against the main file
    /// (main wins key ties); tombstones on either side are dropped. The new
    /// main file replaces the old one atomically, then the aux file is
    /// truncated.
    pub fn rebuild(&mut self) -> Result<()> {
        let mut aux: Vec<Record> = self
            .read_file(&self.aux_path)?
            .into_iter()
            .filter(Record::is_live)
            .collect();
        aux.sort_by(|a, b| a.key(&self.schema).cmp(b.key(&self.schema)));

        let temp_path = self.main_path.with_extension("tmp");

        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);

            let mut main = self
                .read_file(&self.main_path)?
                .into_iter()
                .filter(Record::is_live)
                .peekable();
            let mut aux = aux.into_iter().peekable();

            loop {
                let take_main = match (main.peek(), aux.peek()) {
                    (Some(m), Some(a)) => m.key(&self.schema) <= a.key(&self.schema),
                    (Some(_), None) => true,
                    (None, Some(_)) => false,
                    (None, None) => break,
                };

                let record = if take_main {
                    main.next()
                } else {
                    aux.next()
                }
                .expect("peeked");

                writer.write_all(&record.pack(&self.schema))?;
            }

            let file = writer.into_inner().map_err(std::io::IntoInnerError::into_error)?;
            file.sync_all()?;
        }

        std::fs::rename(&temp_path, &self.main_path)?;

        if let Some(folder) = self.main_path.parent() {
            fsync_directory(folder)?;
        }

        // reset the aux file
        File::create(&self.aux_path)?.sync_all()?;
        self.aux_count = 0;

        log::debug!("sequential: merge complete");
        Ok(())
    }

    /// Binary search over the sorted main file.
    fn search_main(&self, key: &Value) -> Result<Option<Record>> {
        let count = self.record_count(&self.main_path)?;
        if count == 0 {
            return Ok(None);
        }

        let mut file = File::open(&self.main_path)?;
        let mut buf = vec![0; self.schema.record_size() as usize];

        let mut low = 0_i64;
        let mut high = count as i64 - 1;

        while low <= high {
            let mid = (low + high) / 2;

            file.seek(SeekFrom::Start(mid as u64 * self.record_size()))?;
            file.read_exact(&mut buf)?;

            let mut record = Record::unpack(&self.schema, &mut &buf[..])?;

            match record.key(&self.schema).cmp(key) {
                std::cmp::Ordering::Equal => {
                    record.set_pos(mid as u32);
                    return Ok(Some(record));
                }
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid - 1,
            }
        }

        Ok(None)
    }

    /// Returns the live record for `key`, checking main first, then aux.
    pub fn search(&self, key: &Value) -> Result<Option<Record>> {
        if let Some(record) = self.search_main(key)? {
            if record.is_live() {
                return Ok(Some(record));
            }
            // a tombstone in main shadows nothing; the key may live in aux
        }

        for record in self.read_file(&self.aux_path)? {
            if record.is_live() && record.key(&self.schema) == key {
                return Ok(Some(record));
            }
        }

        Ok(None)
    }

    /// Returns all live records with `lo <= key <= hi`.
    ///
    /// The main file is scanned in key order (stopping past `hi`); the aux
    /// file is swept linearly afterwards.
    pub fn range_search(&self, lo: &Value, hi: &Value) -> Result<Vec<Record>> {
        let mut result = vec![];

        for record in self.read_file(&self.main_path)? {
            if !record.is_live() {
                continue;
            }

            let key = record.key(&self.schema);
            if key > hi {
                break;
            }
            if key >= lo {
                result.push(record);
            }
        }

        for record in self.read_file(&self.aux_path)? {
            if record.is_live() {
                let key = record.key(&self.schema);
                if key >= lo && key <= hi {
                    result.push(record);
                }
            }
        }

        Ok(result)
    }

    fn tombstone_at(&self, path: &Path, index: u64, record: &mut Record) -> Result<()> {
        record.set_next(NEXT_TOMBSTONE);

        let mut file = File::options().read(true).write(true).open(path)?;
        file.seek(SeekFrom::Start(index * self.record_size()))?;
        file.write_all(&record.pack(&self.schema))?;
        file.sync_all()?;

        Ok(())
    }

    /// Tombstones the live record for `key`.
    ///
    /// The physical purge happens at the next merge. Returns `false` if no
    /// live record carries the key.
    pub fn delete(&mut self, key: &Value) -> Result<bool> {
        if let Some(mut record) = self.search_main(key)? {
            if !record.is_live() {
                return Ok(false);
            }

            let index = u64::from(record.pos().expect("assigned by search"));
            self.tombstone_at(&self.main_path, index, &mut record)?;
            return Ok(true);
        }

        for (index, mut record) in self.read_file(&self.aux_path)?.into_iter().enumerate() {
            if record.is_live() && record.key(&self.schema) == key {
                self.tombstone_at(&self.aux_path, index as u64, &mut record)?;
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Replaces the record for `key` (delete + insert; the old tombstone is
    /// purged at the next merge).
    ///
    /// Returns `false` without inserting if the key is absent or already
    /// deleted.
    pub fn update(&mut self, key: &Value, record: &Record) -> Result<bool> {
        if !self.delete(key)? {
            return Ok(false);
        }

        self.insert(record)?;
        Ok(true)
    }

    /// Returns all live records of both files, main first.
    pub fn all_records(&self) -> Result<Vec<Record>> {
        let mut records: Vec<Record> = self
            .read_file(&self.main_path)?
            .into_iter()
            .filter(Record::is_live)
            .collect();

        records.extend(
            self.read_file(&self.aux_path)?
                .into_iter()
                .filter(Record::is_live),
        );

        Ok(records)
    }

    /// Forces a merge if the aux file holds any records.
    pub fn save(&mut self) -> Result<()> {
        if self.aux_count > 0 {
            self.rebuild()?;
        }
        Ok(())
    }

    /// Returns `true` if both files are empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.aux_count == 0 && self.record_count(&self.main_path)? == 0)
    }

    #[doc(hidden)]
    #[must_use]
    pub fn aux_count(&self) -> u32 {
        self.aux_count
    }

    /// Asserts that the main file is strictly key-sorted and tombstone-free
    /// right after a merge.
    ///
    /// # Panics
    ///
    /// Panics if the invariant is violated.
    #[doc(hidden)]
    pub fn verify_merged_main(&self) -> Result<()> {
        let main = self.read_file(&self.main_path)?;

        assert!(main.iter().all(Record::is_live), "merged main has tombstones");
        assert!(
            main.windows(2)
                .all(|w| w[0].key(&self.schema) < w[1].key(&self.schema)),
            "merged main is not strictly sorted"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, FieldType};
    use test_log::test;

    fn schema() -> Schema {
        Schema::new(
            "events",
            vec![
                Field::new("id", FieldType::I32),
                Field::new("tag", FieldType::Str(8)),
            ],
            "id",
        )
        .expect("valid schema")
    }

    fn open(dir: &Path, threshold: u32) -> Result<SequentialFile> {
        SequentialFile::open(
            dir.join("events.dat"),
            dir.join("events.aux"),
            schema(),
            threshold,
        )
    }

    fn record(schema: &Schema, id: i32, tag: &str) -> Record {
        Record::new(schema, vec![Value::I32(id), Value::Str(tag.into())])
            .expect("schema-conformant")
    }

    #[test]
    fn merge_sorts_and_purges() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut index = open(dir.path(), 5)?;

        for (i, id) in [3, 1, 4, 1, 5, 9, 2, 6].into_iter().enumerate() {
            let rec = record(index.schema(), id, &format!("t{i}"));
            index.insert(&rec)?;
        }

        // the threshold was hit at least once
        assert!(index.aux_count() < 8);

        // upsert-by-replacement: the second key-1 record wins
        let hit = index.search(&Value::I32(1))?.expect("key 1 is live");
        assert_eq!(&Value::Str("t3".into()), &hit.values()[1]);

        let hits = index.range_search(&Value::I32(2), &Value::I32(6))?;
        let mut keys: Vec<i32> = hits
            .iter()
            .map(|r| match r.values()[0] {
                Value::I32(v) => v,
                _ => unreachable!(),
            })
            .collect();
        keys.sort_unstable();
        assert_eq!(vec![2, 3, 4, 5, 6], keys);

        index.save()?;
        index.verify_merged_main()?;

        Ok(())
    }

    #[test]
    fn delete_is_logical_until_merge() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut index = open(dir.path(), 100)?;

        for id in [10, 20, 30] {
            index.insert(&record(index.schema(), id, "x"))?;
        }

        assert!(index.delete(&Value::I32(20))?);
        assert!(!index.delete(&Value::I32(20))?, "tombstone collision");
        assert!(index.search(&Value::I32(20))?.is_none());

        // still three physical records in aux
        assert_eq!(3, index.aux_count());

        index.save()?;
        index.verify_merged_main()?;
        assert_eq!(2, index.all_records()?.len());

        Ok(())
    }

    #[test]
    fn delete_in_main_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut index = open(dir.path(), 2)?;

        for id in [7, 3, 9, 1] {
            index.insert(&record(index.schema(), id, "x"))?;
        }
        assert_eq!(0, index.aux_count(), "everything merged");

        assert!(index.delete(&Value::I32(9))?);
        assert!(index.search(&Value::I32(9))?.is_none());
        assert_eq!(3, index.all_records()?.len());

        Ok(())
    }

    #[test]
    fn reinsert_after_delete() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut index = open(dir.path(), 100)?;

        index.insert(&record(index.schema(), 1, "old"))?;
        assert!(index.delete(&Value::I32(1))?);
        index.insert(&record(index.schema(), 1, "new"))?;

        let hit = index.search(&Value::I32(1))?.expect("key 1 is live");
        assert_eq!(&Value::Str("new".into()), &hit.values()[1]);

        // deleting again hits the live one, not the tombstone
        assert!(index.delete(&Value::I32(1))?);
        assert!(index.search(&Value::I32(1))?.is_none());

        Ok(())
    }

    #[test]
    fn update_of_deleted_record_is_not_found() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut index = open(dir.path(), 100)?;

        index.insert(&record(index.schema(), 5, "a"))?;
        index.delete(&Value::I32(5))?;

        let replacement = record(index.schema(), 5, "b");
        assert!(!index.update(&Value::I32(5), &replacement)?);

        Ok(())
    }

    #[test]
    fn state_survives_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;

        {
            let mut index = open(dir.path(), 4)?;
            for id in [8, 2, 6, 4, 1, 9] {
                index.insert(&record(index.schema(), id, "x"))?;
            }
        }

        {
            let index = open(dir.path(), 4)?;
            assert_eq!(2, index.aux_count(), "1 and 9 still in aux");
            assert!(index.search(&Value::I32(6))?.is_some());
            assert!(index.search(&Value::I32(9))?.is_some());
            assert_eq!(6, index.all_records()?.len());
        }

        Ok(())
    }

    #[test]
    fn first_merge_with_empty_main() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut index = open(dir.path(), 3)?;

        for id in [5, 2, 8] {
            index.insert(&record(index.schema(), id, "x"))?;
        }

        index.verify_merged_main()?;
        assert_eq!(0, index.aux_count());

        Ok(())
    }
}
