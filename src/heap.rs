// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::record::{Record, NEXT_LIVE};
use crate::schema::Schema;
use crate::{file::rewrite_atomic, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Header sentinel for an empty free list
const FREE_LIST_EMPTY: i32 = -1;

/// In-record sentinel terminating the free-slot chain.
///
/// Free-list links are stored as `next free slot + 1` so that `next == 0`
/// stays exclusive to live records; the end of the chain needs its own
/// value in the `p >= 1` space.
const FREE_LIST_END: i32 = i32::MAX;

/// A heap of fixed-size record slots with a LIFO free-slot list.
///
/// Slot `i` occupies bytes `[i * record_size, (i + 1) * record_size)` of the
/// data file. The header file holds the free-list head as a single signed
/// 32-bit little-endian integer (`-1` = empty list).
///
/// File handles are opened per operation and released on every exit path;
/// the only state kept between calls is the free-list head and the record
/// count.
pub struct HeapFile {
    data_path: PathBuf,
    header_path: PathBuf,
    schema: Schema,
    free_list_head: i32,
    file_size: u32,
}

impl HeapFile {
    /// Opens (or initializes) a heap over the given data and header files.
    pub fn open(data_path: PathBuf, header_path: PathBuf, schema: Schema) -> Result<Self> {
        let free_list_head = match File::open(&header_path) {
            Ok(mut file) => file.read_i32::<LittleEndian>()?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                rewrite_atomic(&header_path, &FREE_LIST_EMPTY.to_le_bytes())?;
                FREE_LIST_EMPTY
            }
            Err(e) => return Err(e.into()),
        };

        let file_size = match std::fs::metadata(&data_path) {
            Ok(meta) => (meta.len() / u64::from(schema.record_size())) as u32,
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            data_path,
            header_path,
            schema,
            free_list_head,
            file_size,
        })
    }

    /// Returns the number of slots in the data file (live or freed).
    #[must_use]
    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    /// Returns the schema this heap packs records with.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn byte_offset(&self, slot: u32) -> u64 {
        u64::from(slot) * u64::from(self.schema.record_size())
    }

    fn persist_header(&self) -> Result<()> {
        rewrite_atomic(&self.header_path, &self.free_list_head.to_le_bytes())?;
        Ok(())
    }

    /// Adds a record, reusing the most recently freed slot if one exists.
    ///
    /// The record's `next` link is forced to `0` on write. Returns the slot
    /// the record was placed in.
    pub fn add_record(&mut self, record: &Record) -> Result<u32> {
        // a record entering the heap is live, whatever its link says
        let record = record.clone().with_next(NEXT_LIVE);

        if self.free_list_head != FREE_LIST_EMPTY {
            let slot = self.free_list_head as u32;

            let freed = self
                .read_record(slot)?
                .ok_or_else(|| std::io::Error::new(ErrorKind::UnexpectedEof, "free slot vanished"))?;

            self.free_list_head = if freed.next() == FREE_LIST_END {
                FREE_LIST_EMPTY
            } else {
                freed.next() - 1
            };

            self.write_record_at(slot, &record)?;
            self.persist_header()?;

            log::trace!("heap: reused free slot {slot}");
            return Ok(slot);
        }

        let slot = self.file_size;
        self.write_record_at(slot, &record)?;
        self.file_size += 1;

        Ok(slot)
    }

    /// Reads the record at `slot`, attaching its position.
    ///
    /// Returns `None` if the slot lies past the end of the file.
    pub fn read_record(&self, slot: u32) -> Result<Option<Record>> {
        let mut file = match File::open(&self.data_path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        file.seek(SeekFrom::Start(self.byte_offset(slot)))?;

        let mut buf = vec![0; self.schema.record_size() as usize];
        if let Err(e) = file.read_exact(&mut buf) {
            if e.kind() == ErrorKind::UnexpectedEof {
                return Ok(None);
            }
            return Err(e.into());
        }

        let mut record = Record::unpack(&self.schema, &mut &buf[..])?;
        record.set_pos(slot);

        Ok(Some(record))
    }

    /// Overwrites the record at `slot` in place, extending the file if needed.
    pub fn write_record_at(&mut self, slot: u32, record: &Record) -> Result<()> {
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.data_path)?;

        file.seek(SeekFrom::Start(self.byte_offset(slot)))?;
        file.write_all(&record.pack(&self.schema))?;
        file.sync_all()?;

        Ok(())
    }

    /// Puts the slot on the free list.
    ///
    /// Returns `false` if the slot does not exist or is already freed.
    pub fn remove_record(&mut self, slot: u32) -> Result<bool> {
        let Some(mut record) = self.read_record(slot)? else {
            return Ok(false);
        };

        if !record.is_live() {
            return Ok(false);
        }

        record.set_next(if self.free_list_head == FREE_LIST_EMPTY {
            FREE_LIST_END
        } else {
            self.free_list_head + 1
        });

        self.write_record_at(slot, &record)?;

        self.free_list_head = slot as i32;
        self.persist_header()?;

        log::trace!("heap: freed slot {slot}");
        Ok(true)
    }

    /// Scans all slots in order, yielding live records with positions attached.
    pub fn live_records(&self) -> Result<Vec<Record>> {
        let mut records = vec![];

        for slot in 0..self.file_size {
            if let Some(record) = self.read_record(slot)? {
                if record.next() == NEXT_LIVE {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }
}
