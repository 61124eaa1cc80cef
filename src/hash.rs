// src/hash.rs

//! SHA-256 checksums for scanned files
//!
//! Every scanned file is identified in reports by the SHA-256 of its raw
//! bytes. A package gets a verification code derived from the checksums of
//! all its files, independent of the order they were listed in.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `data`
pub fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Package verification code: SHA-256 over the sorted file checksums
pub fn verification_code<'a>(checksums: impl IntoIterator<Item = &'a str>) -> String {
    let mut sorted: Vec<&str> = checksums.into_iter().collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for checksum in sorted {
        hasher.update(checksum.as_bytes());
    }
    hex::encode(hasher.finalize())
}
