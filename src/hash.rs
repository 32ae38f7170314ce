/// Deterministic 64-bit hash.
///
/// Used for bucket addressing in the extendible hash index and for
/// snapshot checksums, so it MUST be stable across runs and platforms.
pub fn hash64(bytes: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(bytes)
}
