// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::value::Value;

/// Size of the trailing `next` link of every record (signed 32-bit)
pub(crate) const NEXT_LINK_SIZE: u32 = 4;

/// Scalar type of a record field
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FieldType {
    /// Signed 32-bit integer
    I32,

    /// 32-bit float
    F32,

    /// UTF-8 string, zero-padded to the given byte size on disk
    Str(u16),
}

impl FieldType {
    /// On-disk size of a field of this type, in bytes.
    #[must_use]
    pub fn size(self) -> u32 {
        match self {
            Self::I32 | Self::F32 => 4,
            Self::Str(n) => n.into(),
        }
    }

    fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::I32, Value::I32(_)) | (Self::F32, Value::F32(_)) | (Self::Str(_), Value::Str(_))
        )
    }
}

/// A named, typed column of a table
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Field {
    name: String,
    field_type: FieldType,
}

impl Field {
    /// Creates a field definition.
    pub fn new<S: Into<String>>(name: S, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    /// Returns the field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field type.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }
}

/// Schema violation found when validating a record against its table
#[derive(Debug)]
pub enum SchemaError {
    /// The schema has no fields
    NoFields,

    /// The named key field does not exist in the field list
    UnknownKeyField(String),

    /// Wrong number of values (expected, got)
    ValueCount((usize, usize)),

    /// A value's type does not match the field's declared type
    TypeMismatch {
        /// Field name
        field: String,
        /// Declared type
        expected: FieldType,
        /// Name of the offending value's type
        got: &'static str,
    },

    /// A string value exceeds the field's fixed size
    StringTooLong {
        /// Field name
        field: String,
        /// Declared byte size
        max: u16,
        /// Actual byte length
        got: usize,
    },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SchemaError({self:?})")
    }
}

impl std::error::Error for SchemaError {}

/// An ordered field list plus the designated primary key field.
///
/// The record size is derived once at construction time, so the on-disk
/// layout is reproducible for the lifetime of the table.
#[derive(Clone, Debug)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    key_index: usize,
    record_size: u32,
}

impl Schema {
    /// Creates a schema.
    ///
    /// # Errors
    ///
    /// Fails if the field list is empty or `key_field` names no field.
    pub fn new<S: Into<String>>(
        name: S,
        fields: Vec<Field>,
        key_field: &str,
    ) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::NoFields);
        }

        let key_index = fields
            .iter()
            .position(|f| f.name() == key_field)
            .ok_or_else(|| SchemaError::UnknownKeyField(key_field.into()))?;

        let record_size =
            fields.iter().map(|f| f.field_type().size()).sum::<u32>() + NEXT_LINK_SIZE;

        Ok(Self {
            name: name.into(),
            fields,
            key_index,
            record_size,
        })
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ordered field list.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the positional index of the key field.
    #[must_use]
    pub fn key_index(&self) -> usize {
        self.key_index
    }

    /// Returns the key field definition.
    #[must_use]
    pub fn key_field(&self) -> &Field {
        // key_index is validated in the constructor
        &self.fields[self.key_index]
    }

    /// Looks up a field position by name.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name() == name)
    }

    /// Returns the fixed on-disk record size in bytes (fields + `next` link).
    #[must_use]
    pub fn record_size(&self) -> u32 {
        self.record_size
    }

    /// Checks a value list against the field list.
    pub(crate) fn validate(&self, values: &[Value]) -> Result<(), SchemaError> {
        if values.len() != self.fields.len() {
            return Err(SchemaError::ValueCount((self.fields.len(), values.len())));
        }

        for (field, value) in self.fields.iter().zip(values) {
            if !field.field_type().accepts(value) {
                return Err(SchemaError::TypeMismatch {
                    field: field.name().into(),
                    expected: field.field_type(),
                    got: value.type_name(),
                });
            }

            if let (FieldType::Str(max), Value::Str(s)) = (field.field_type(), value) {
                if s.len() > usize::from(max) {
                    return Err(SchemaError::StringTooLong {
                        field: field.name().into(),
                        max,
                        got: s.len(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(
            "users",
            vec![
                Field::new("id", FieldType::I32),
                Field::new("name", FieldType::Str(12)),
                Field::new("score", FieldType::F32),
            ],
            "id",
        )
        .expect("valid schema")
    }

    #[test]
    fn record_size_is_fixed_layout() {
        // 4 (id) + 12 (name) + 4 (score) + 4 (next)
        assert_eq!(24, schema().record_size());
    }

    #[test]
    fn unknown_key_field() {
        let err = Schema::new("t", vec![Field::new("a", FieldType::I32)], "b").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownKeyField(_)));
    }

    #[test]
    fn validate_rejects_wrong_arity() {
        let err = schema().validate(&[Value::I32(1)]).unwrap_err();
        assert!(matches!(err, SchemaError::ValueCount((3, 1))));
    }

    #[test]
    fn validate_rejects_long_string() {
        let err = schema()
            .validate(&[
                Value::I32(1),
                Value::Str("a".repeat(13)),
                Value::F32(0.0),
            ])
            .unwrap_err();
        assert!(matches!(err, SchemaError::StringTooLong { .. }));
    }
}
