use crate::coding::DecodeError;
use crate::file::{rewrite_atomic, MAGIC_BYTES};
use crate::hash::hash64;
use crate::{Error, Result};
use std::io::ErrorKind;
use std::path::Path;

/// Shared framing for index snapshot files:
///
/// ```text
/// [0..4)  magic bytes (incl. format version)
/// [4]     index kind tag
/// [5..N)  index-specific payload
/// [N..]   xxh3-64 checksum over [0..N), little-endian
/// ```
///
/// Snapshots are opaque to everything but the index that wrote them; the
/// only cross-cutting guarantees are the header and the checksum.
pub struct Snapshot;

impl Snapshot {
    /// Atomically writes a snapshot file.
    pub fn persist(path: &Path, kind_tag: u8, payload: &[u8]) -> Result<()> {
        let mut content = Vec::with_capacity(MAGIC_BYTES.len() + 1 + payload.len() + 8);
        content.extend_from_slice(&MAGIC_BYTES);
        content.push(kind_tag);
        content.extend_from_slice(payload);

        let checksum = hash64(&content);
        content.extend_from_slice(&checksum.to_le_bytes());

        rewrite_atomic(path, &content)?;

        log::trace!("snapshot: persisted {} bytes to {}", content.len(), path.display());
        Ok(())
    }

    /// Reads and verifies a snapshot file, returning its payload.
    ///
    /// Returns `Ok(None)` if the file does not exist. A malformed header or
    /// checksum mismatch is an error; callers treat it as a corrupt snapshot.
    pub fn load(path: &Path, kind_tag: u8) -> Result<Option<Vec<u8>>> {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let header_len = MAGIC_BYTES.len() + 1;
        if content.len() < header_len + 8 {
            return Err(Error::Decode(DecodeError::InvalidHeader(
                "snapshot file too short",
            )));
        }

        let (body, trailer) = content.split_at(content.len() - 8);

        let expected = u64::from_le_bytes(
            trailer
                .try_into()
                .map_err(|_| DecodeError::InvalidHeader("bad checksum trailer"))?,
        );
        let got = hash64(body);

        if got != expected {
            return Err(Error::InvalidChecksum((got, expected)));
        }

        if body[..MAGIC_BYTES.len()] != MAGIC_BYTES {
            return Err(Error::Decode(DecodeError::InvalidHeader("bad magic bytes")));
        }

        if body[MAGIC_BYTES.len()] != kind_tag {
            return Err(Error::Decode(DecodeError::InvalidHeader(
                "snapshot belongs to a different index kind",
            )));
        }

        Ok(Some(body[header_len..].to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("x.idx");

        Snapshot::persist(&path, 3, b"payload")?;
        assert_eq!(Some(b"payload".to_vec()), Snapshot::load(&path, 3)?);

        Ok(())
    }

    #[test]
    fn missing_file_is_none() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(Snapshot::load(&dir.path().join("nope.idx"), 0)?.is_none());
        Ok(())
    }

    #[test]
    fn flipped_bit_is_detected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("x.idx");

        Snapshot::persist(&path, 3, b"payload")?;

        let mut content = std::fs::read(&path)?;
        content[6] ^= 0x40;
        std::fs::write(&path, content)?;

        assert!(matches!(
            Snapshot::load(&path, 3),
            Err(Error::InvalidChecksum(_))
        ));

        Ok(())
    }

    #[test]
    fn wrong_kind_tag_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("x.idx");

        Snapshot::persist(&path, 3, b"payload")?;

        let err = Snapshot::load(&path, 4).expect_err("kind tag differs");
        assert!(err.is_corrupt_snapshot());

        Ok(())
    }
}
