// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::io::{Read, Write};

/// A typed scalar value stored in a record field.
///
/// Keys are `Value`s as well; they are totally ordered, which makes them
/// usable in the ordered indexes. Floats are ordered by `f32::total_cmp`,
/// so NaN is permitted but sorts deterministically.
#[derive(Clone, Debug)]
pub enum Value {
    /// Signed 32-bit integer
    I32(i32),

    /// 32-bit float
    F32(f32),

    /// UTF-8 string (fixed-size on disk, see [`FieldType::Str`](crate::FieldType))
    Str(String),
}

impl Value {
    /// Returns a short name of the value's type, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::I32(_) => "i32",
            Self::F32(_) => "f32",
            Self::Str(_) => "str",
        }
    }

    /// Appends the canonical byte representation to `buf`.
    ///
    /// This is the hashing input for the extendible hash index, so it must
    /// not depend on field padding or platform endianness.
    pub(crate) fn canonical_bytes(&self, buf: &mut Vec<u8>) {
        match self {
            Self::I32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Self::F32(v) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
            Self::Str(v) => buf.extend_from_slice(v.as_bytes()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::I32(_) => 0,
            Self::F32(_) => 1,
            Self::Str(_) => 2,
        }
    }

    /// Numeric view, used by the spatial index to read coordinate fields.
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::I32(v) => Some(*v as f32),
            Self::F32(v) => Some(*v),
            Self::Str(_) => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::I32(a), Self::I32(b)) => a.cmp(b),
            (Self::F32(a), Self::F32(b)) => a.total_cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            // Keys within one table always share a type; cross-type
            // comparisons only need to be consistent.
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.rank());
        match self {
            Self::I32(v) => state.write_i32(*v),
            Self::F32(v) => state.write_u32(v.to_bits()),
            Self::Str(v) => state.write(v.as_bytes()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::I32(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::F32(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl Encode for Value {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        match self {
            Self::I32(v) => {
                writer.write_u8(0)?;
                writer.write_i32::<LittleEndian>(*v)?;
            }
            Self::F32(v) => {
                writer.write_u8(1)?;
                writer.write_u32::<LittleEndian>(v.to_bits())?;
            }
            Self::Str(v) => {
                writer.write_u8(2)?;

                // NOTE: string fields are limited to u16 size in the schema
                #[allow(clippy::expect_used)]
                let len = u16::try_from(v.len()).expect("string fits into u16");

                writer.write_u16::<LittleEndian>(len)?;
                writer.write_all(v.as_bytes())?;
            }
        }
        Ok(())
    }
}

impl Decode for Value {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tag = reader.read_u8()?;

        match tag {
            0 => Ok(Self::I32(reader.read_i32::<LittleEndian>()?)),
            1 => Ok(Self::F32(f32::from_bits(reader.read_u32::<LittleEndian>()?))),
            2 => {
                let len = reader.read_u16::<LittleEndian>()?;
                let mut buf = vec![0; len.into()];
                reader.read_exact(&mut buf)?;
                Ok(Self::Str(String::from_utf8(buf)?))
            }
            _ => Err(DecodeError::InvalidTag(("Value", tag))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_total_order() {
        assert!(Value::I32(1) < Value::I32(2));
        assert!(Value::F32(-0.5) < Value::F32(0.5));
        assert!(Value::Str("a".into()) < Value::Str("b".into()));
        assert!(Value::F32(f32::NEG_INFINITY) < Value::F32(0.0));
        assert!(Value::F32(f32::NAN) > Value::F32(f32::INFINITY));
    }

    #[test]
    fn value_roundtrip() -> Result<(), DecodeError> {
        for v in [
            Value::I32(-42),
            Value::F32(13.37),
            Value::Str("hello".into()),
            Value::Str(String::new()),
        ] {
            let bytes = v.encode_into_vec();
            let decoded = Value::decode_from(&mut &bytes[..])?;
            assert_eq!(v, decoded);
        }
        Ok(())
    }
}
