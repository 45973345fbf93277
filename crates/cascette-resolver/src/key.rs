//! Variable-length checksum keys
//!
//! Content checksums are 16-byte MD5 digests. File keys stored in `.idx`
//! files are the first 9 bytes of a 16-byte encoding key, so one type covers
//! both and [`ChecksumKey::trim`] moves between them.

use crate::{Result, StorageError};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Length of a full content checksum or encoding key.
pub const CHECKSUM_LEN: usize = 16;

/// Length of the truncated file keys stored in `.idx` files.
pub const FILE_KEY_LEN: usize = 9;

/// Immutable, non-empty byte identifier.
///
/// Equality and hashing are structural over the raw bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChecksumKey(Arc<[u8]>);

impl ChecksumKey {
    /// Create a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `bytes` is empty.
    pub fn new(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = bytes.as_ref();
        if bytes.is_empty() {
            return Err(StorageError::InvalidArgument(
                "checksum key must not be empty".to_string(),
            ));
        }
        Ok(Self(Arc::from(bytes)))
    }

    /// Parse a key from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = hex::decode(hex.trim()).map_err(|e| {
            StorageError::InvalidArgument(format!("invalid checksum hex '{hex}': {e}"))
        })?;
        Self::new(bytes)
    }

    /// MD5 content checksum of `data`.
    pub fn from_content(data: &[u8]) -> Self {
        Self(Arc::from(cascette_crypto::content_checksum(data).as_slice()))
    }

    /// Copy of the first `n` bytes, or an equal key if `n >= len()`.
    ///
    /// `trim(0)` also returns an equal key since keys are never empty.
    #[must_use]
    pub fn trim(&self, n: usize) -> Self {
        if n == 0 || n >= self.0.len() {
            return self.clone();
        }
        Self(Arc::from(&self.0[..n]))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes in the key
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl Borrow<[u8]> for ChecksumKey {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for ChecksumKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for ChecksumKey {
    type Error = StorageError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::new(bytes)
    }
}

impl fmt::Display for ChecksumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ChecksumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChecksumKey({})", self.to_hex())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn empty_key_rejected() {
        assert!(matches!(
            ChecksumKey::new([]),
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(ChecksumKey::from_hex("").is_err());
    }

    #[test]
    fn hex_round_trip() {
        let key = ChecksumKey::from_hex("65a8e27d8879283831b664bd8b7f0ad4").unwrap();
        assert_eq!(key.len(), CHECKSUM_LEN);
        assert_eq!(key.to_hex(), "65a8e27d8879283831b664bd8b7f0ad4");
        assert_eq!(format!("{key}"), key.to_hex());
        assert!(ChecksumKey::from_hex("zz").is_err());
    }

    #[test]
    fn from_content_is_md5() {
        let key = ChecksumKey::from_content(b"Hello, World!");
        assert_eq!(key.to_hex(), "65a8e27d8879283831b664bd8b7f0ad4");
    }

    #[test]
    fn trim_to_file_key() {
        let key = ChecksumKey::new((1u8..=16).collect::<Vec<_>>()).unwrap();
        let short = key.trim(FILE_KEY_LEN);
        assert_eq!(short.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(key.trim(16), key);
        assert_eq!(key.trim(40), key);
    }

    #[test]
    fn map_lookup_by_slice() {
        let key = ChecksumKey::new([0xAA; 9]).unwrap();
        let mut map = HashMap::new();
        map.insert(key, 7u32);
        assert_eq!(map.get(&[0xAA; 9][..]), Some(&7));
    }

    proptest! {
        #[test]
        fn trim_is_prefix(bytes in prop::collection::vec(any::<u8>(), 10..32), n in 1usize..40) {
            let key = ChecksumKey::new(&bytes).unwrap();
            let trimmed = key.trim(n);
            if n >= bytes.len() {
                prop_assert_eq!(trimmed, key);
            } else {
                prop_assert_eq!(trimmed.len(), n);
                prop_assert_eq!(trimmed.as_bytes(), &bytes[..n]);
            }
        }
    }
}
