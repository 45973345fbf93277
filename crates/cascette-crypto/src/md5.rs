//! MD5 content checksums

use md5::{Digest, Md5};

/// Size in bytes of an MD5 content checksum.
pub const CHECKSUM_SIZE: usize = 16;

/// Compute the MD5 content checksum of `data`.
pub fn content_checksum(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let mut hasher = Md5::new();
    hasher.update(data);
    let mut checksum = [0u8; CHECKSUM_SIZE];
    checksum.copy_from_slice(&hasher.finalize());
    checksum
}

/// Compute the MD5 content checksum of `data` as lowercase hex.
pub fn content_checksum_hex(data: &[u8]) -> String {
    hex::encode(content_checksum(data))
}
