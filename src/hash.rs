//! Deterministic URL hashing.
//!
//! Pages and favicons are looked up by `(url_hash, url)`: the integer hash
//! prunes the index scan, the exact string match disambiguates collisions.
//! The hash is 64-bit FNV-1a over the UTF-8 bytes, which is stable across
//! process restarts and platforms.

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Compute FNV-1a hash of a byte slice.
#[inline]
#[must_use]
pub fn fnv1a_hash(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Hash a URL into the signed form stored in `SQLite` INTEGER columns.
#[must_use]
pub fn url_hash(url: &str) -> i64 {
    // Same bits, reinterpreted; SQLite has no unsigned 64-bit integers.
    i64::from_ne_bytes(fnv1a_hash(url.as_bytes()).to_ne_bytes())
}
