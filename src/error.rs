// Copyright (c) 2026-present, tabular-engine contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};
use crate::schema::SchemaError;

/// Represents errors that can occur in the storage engine
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// A record does not conform to its table schema
    Schema(SchemaError),

    /// Invalid checksum value (got, expected)
    ///
    /// A snapshot with a bad checksum is treated as corrupt; heap-backed
    /// tables recover by rebuilding the index from the heap.
    InvalidChecksum((u64, u64)),

    /// The operation is not supported by the chosen index kind
    Unsupported(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EngineError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<SchemaError> for Error {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl Error {
    /// Returns `true` if this error means an index snapshot could not be trusted.
    #[must_use]
    pub fn is_corrupt_snapshot(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::InvalidChecksum(_))
    }
}

/// Engine result
pub type Result<T> = std::result::Result<T, Error>;
