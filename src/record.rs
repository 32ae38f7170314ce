// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};
use crate::schema::{FieldType, Schema, SchemaError};
use crate::value::Value;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// `next` link value of a live record
pub const NEXT_LIVE: i32 = 0;

/// `next` link value of a logically deleted record (sequential file only)
pub const NEXT_TOMBSTONE: i32 = -1;

/// A fixed-layout row of a table.
///
/// The trailing `next` link doubles as the tombstone marker and the heap's
/// free-slot chain:
///
/// - `0` → live record
/// - `-1` → tombstone (sequential file, purged at the next merge)
/// - `p ≥ 1` → slot is free; `p` is the next free slot plus one
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    values: Vec<Value>,
    next: i32,
    pos: Option<u32>,
}

impl Record {
    /// Creates a record, validating the values against the schema.
    ///
    /// # Errors
    ///
    /// Fails with a schema violation if the value count, a value's type or a
    /// string's length does not match the field list.
    pub fn new(schema: &Schema, values: Vec<Value>) -> Result<Self, SchemaError> {
        schema.validate(&values)?;

        Ok(Self {
            values,
            next: NEXT_LIVE,
            pos: None,
        })
    }

    pub(crate) fn with_next(mut self, next: i32) -> Self {
        self.next = next;
        self
    }

    /// Returns the field values in schema order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the key field's value.
    #[must_use]
    pub fn key(&self, schema: &Schema) -> &Value {
        // the value count was validated on construction
        &self.values[schema.key_index()]
    }

    /// Returns the raw `next` link.
    #[must_use]
    pub fn next(&self) -> i32 {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: i32) {
        self.next = next;
    }

    /// Returns `true` if the record is live (not tombstoned, not freed).
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.next == NEXT_LIVE
    }

    /// Returns `true` if the record is a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.next == NEXT_TOMBSTONE
    }

    /// Returns the heap slot this record was read from, if any.
    ///
    /// Assigned by reads; never persisted.
    #[must_use]
    pub fn pos(&self) -> Option<u32> {
        self.pos
    }

    pub(crate) fn set_pos(&mut self, pos: u32) {
        self.pos = Some(pos);
    }

    /// Serializes the record into its fixed binary layout.
    ///
    /// Each field is written in declared order, little-endian; strings are
    /// right-padded with zero bytes to their fixed size. The 4-byte `next`
    /// link goes last.
    pub fn pack_into<W: Write>(&self, schema: &Schema, writer: &mut W) -> Result<(), EncodeError> {
        debug_assert_eq!(schema.fields().len(), self.values.len());

        for (field, value) in schema.fields().iter().zip(&self.values) {
            match (field.field_type(), value) {
                (FieldType::I32, Value::I32(v)) => writer.write_i32::<LittleEndian>(*v)?,
                (FieldType::F32, Value::F32(v)) => writer.write_f32::<LittleEndian>(*v)?,
                (FieldType::Str(size), Value::Str(s)) => {
                    debug_assert!(s.len() <= usize::from(size));

                    writer.write_all(s.as_bytes())?;

                    let padding = usize::from(size) - s.len();
                    writer.write_all(&vec![0; padding])?;
                }
                // construction and update both validate against the schema
                _ => unreachable!("record value does not match schema"),
            }
        }

        writer.write_i32::<LittleEndian>(self.next)?;

        Ok(())
    }

    /// Serializes the record into a buffer of exactly `schema.record_size()` bytes.
    #[must_use]
    pub fn pack(&self, schema: &Schema) -> Vec<u8> {
        let mut buf = Vec::with_capacity(schema.record_size() as usize);

        #[allow(clippy::expect_used)]
        self.pack_into(schema, &mut buf).expect("cannot fail");

        debug_assert_eq!(schema.record_size() as usize, buf.len());
        buf
    }

    /// Deserializes a record from its fixed binary layout.
    pub fn unpack<R: Read>(schema: &Schema, reader: &mut R) -> Result<Self, DecodeError> {
        let mut values = Vec::with_capacity(schema.fields().len());

        for field in schema.fields() {
            let value = match field.field_type() {
                FieldType::I32 => Value::I32(reader.read_i32::<LittleEndian>()?),
                FieldType::F32 => Value::F32(reader.read_f32::<LittleEndian>()?),
                FieldType::Str(size) => {
                    let mut buf = vec![0; usize::from(size)];
                    reader.read_exact(&mut buf)?;

                    // strip the zero padding
                    let end = buf
                        .iter()
                        .rposition(|&b| b != 0)
                        .map_or(0, |idx| idx + 1);
                    buf.truncate(end);

                    Value::Str(String::from_utf8(buf)?)
                }
            };
            values.push(value);
        }

        let next = reader.read_i32::<LittleEndian>()?;

        Ok(Self {
            values,
            next,
            pos: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    fn schema() -> Schema {
        Schema::new(
            "users",
            vec![
                Field::new("id", FieldType::I32),
                Field::new("name", FieldType::Str(8)),
                Field::new("score", FieldType::F32),
            ],
            "id",
        )
        .expect("valid schema")
    }

    #[test]
    fn pack_unpack_roundtrip() -> Result<(), DecodeError> {
        let schema = schema();

        let record = Record::new(
            &schema,
            vec![Value::I32(7), Value::Str("bob".into()), Value::F32(1.5)],
        )
        .expect("schema-conformant");

        let bytes = record.pack(&schema);
        assert_eq!(schema.record_size() as usize, bytes.len());

        let decoded = Record::unpack(&schema, &mut &bytes[..])?;
        assert_eq!(record.values(), decoded.values());
        assert_eq!(NEXT_LIVE, decoded.next());
        assert_eq!(&Value::I32(7), decoded.key(&schema));

        Ok(())
    }

    #[test]
    fn string_padding_is_stripped() -> Result<(), DecodeError> {
        let schema = schema();

        let record = Record::new(
            &schema,
            vec![Value::I32(1), Value::Str(String::new()), Value::F32(0.0)],
        )
        .expect("schema-conformant");

        let bytes = record.pack(&schema);
        let decoded = Record::unpack(&schema, &mut &bytes[..])?;
        assert_eq!(&Value::Str(String::new()), &decoded.values()[1]);

        Ok(())
    }

    #[test]
    fn tombstone_roundtrip() -> Result<(), DecodeError> {
        let schema = schema();

        let record = Record::new(
            &schema,
            vec![Value::I32(1), Value::Str("x".into()), Value::F32(0.0)],
        )
        .expect("schema-conformant")
        .with_next(NEXT_TOMBSTONE);

        let bytes = record.pack(&schema);
        let decoded = Record::unpack(&schema, &mut &bytes[..])?;
        assert!(decoded.is_tombstone());

        Ok(())
    }

    #[test]
    fn mismatching_values_are_rejected() {
        let schema = schema();

        assert!(Record::new(&schema, vec![Value::I32(1)]).is_err());

        assert!(Record::new(
            &schema,
            vec![
                Value::Str("1".into()),
                Value::Str("x".into()),
                Value::F32(0.0)
            ],
        )
        .is_err());
    }
}
