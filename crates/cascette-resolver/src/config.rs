//! Configuration for opening an installation

use crate::key::ChecksumKey;
use crate::storage::shard_filename;
use crate::{DATA_DIR, DEFAULT_DATA_DIR, DEFAULT_MAX_SHARD, Result, StorageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a [`StorageContext`](crate::StorageContext)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Game installation root
    pub install_path: PathBuf,

    /// File key of the encoding table blob (hex)
    pub encoding_key: String,

    /// Content checksum of the root table blob (hex)
    pub root_checksum: String,

    /// Highest shard number an index record may name
    pub max_shard_number: u16,

    /// Memory-map shard files instead of reading through a file handle
    pub enable_mmap: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            install_path: PathBuf::from("."),
            encoding_key: String::new(),
            root_checksum: String::new(),
            max_shard_number: DEFAULT_MAX_SHARD,
            enable_mmap: true,
        }
    }
}

impl StorageConfig {
    /// Create a new configuration for the installation at `install_path`
    pub fn new<P: AsRef<Path>>(install_path: P) -> Self {
        Self {
            install_path: install_path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StorageError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| StorageError::Config(format!("{}: {e}", path.display())))
    }

    /// Set the installation root
    #[must_use]
    pub fn with_install_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.install_path = path.as_ref().to_path_buf();
        self
    }

    /// Set the encoding table file key
    #[must_use]
    pub fn with_encoding_key(mut self, hex: impl Into<String>) -> Self {
        self.encoding_key = hex.into();
        self
    }

    /// Set the root table content checksum
    #[must_use]
    pub fn with_root_checksum(mut self, hex: impl Into<String>) -> Self {
        self.root_checksum = hex.into();
        self
    }

    /// Set the highest accepted shard number
    #[must_use]
    pub const fn with_max_shard_number(mut self, max: u16) -> Self {
        self.max_shard_number = max;
        self
    }

    /// Enable or disable memory-mapped shard access
    #[must_use]
    pub const fn with_mmap(mut self, enable: bool) -> Self {
        self.enable_mmap = enable;
        self
    }

    /// Check that both table keys are present and well-formed hex.
    pub fn validate(&self) -> Result<()> {
        self.encoding_key()?;
        self.root_checksum()?;
        Ok(())
    }

    /// Parsed encoding table file key
    pub fn encoding_key(&self) -> Result<ChecksumKey> {
        parse_key("encoding_key", &self.encoding_key)
    }

    /// Parsed root table content checksum
    pub fn root_checksum(&self) -> Result<ChecksumKey> {
        parse_key("root_checksum", &self.root_checksum)
    }

    /// Directory holding `.idx` and `data.NNN` files: `<install>/Data/data`
    pub fn data_path(&self) -> PathBuf {
        self.install_path.join(DEFAULT_DATA_DIR).join(DATA_DIR)
    }

    /// Path of shard `number`
    pub fn shard_path(&self, number: u16) -> PathBuf {
        self.data_path().join(shard_filename(number))
    }
}

fn parse_key(field: &str, hex: &str) -> Result<ChecksumKey> {
    if hex.trim().is_empty() {
        return Err(StorageError::Config(format!("{field} is not set")));
    }
    ChecksumKey::from_hex(hex).map_err(|e| StorageError::Config(format!("{field}: {e}")))
}
