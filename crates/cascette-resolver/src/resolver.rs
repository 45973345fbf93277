//! Content resolution pipeline
//!
//! Resolves filename hashes to index entries through the CASC lookup chain:
//! Root (hash -> checksums), Encoding (checksum -> file key), then Index
//! (file key -> shard location). Each step is an explicit stage so a miss
//! reports where the chain broke.

use crate::encoding::EncodingTable;
use crate::index::{IndexEntry, IndexStore};
use crate::root::RootTable;
use crate::{Result, StorageError};
use cascette_crypto::Jenkins96;
use std::fmt;
use tracing::trace;

/// A step of the lookup chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Filename hash -> content checksums
    Root,
    /// Content checksum -> file key
    Encoding,
    /// File key -> shard location
    Index,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Root => "root",
            Self::Encoding => "encoding",
            Self::Index => "index",
        })
    }
}

/// Outcome of a staged lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// Every stage produced a value
    Found(T),
    /// The named stage had nothing for any remaining candidate
    MissingAt(Stage),
}

impl<T> Resolution<T> {
    /// The value, discarding which stage missed.
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::MissingAt(_) => None,
        }
    }

    /// Whether a value was found.
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Stage that missed, if any.
    pub const fn missing_stage(&self) -> Option<Stage> {
        match self {
            Self::Found(_) => None,
            Self::MissingAt(stage) => Some(*stage),
        }
    }

    /// Map the found value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolution<U> {
        match self {
            Self::Found(value) => Resolution::Found(f(value)),
            Self::MissingAt(stage) => Resolution::MissingAt(stage),
        }
    }

    /// Convert a miss into `EntryNotFound` naming `key`.
    pub fn into_result(self, key: impl fmt::Display) -> Result<T> {
        match self {
            Self::Found(value) => Ok(value),
            Self::MissingAt(stage) => Err(StorageError::EntryNotFound {
                stage,
                key: key.to_string(),
            }),
        }
    }
}

/// Normalize a logical path for hashing.
///
/// `/` becomes `\`, letters are uppercased and anything outside ASCII is
/// replaced by `?`.
pub fn normalize_path(path: &str) -> String {
    path.chars()
        .map(|c| match c {
            '/' => '\\',
            c if c.is_ascii() => c.to_ascii_uppercase(),
            _ => '?',
        })
        .collect()
}

/// 64-bit filename hash of a logical path.
pub fn filename_hash(path: &str) -> u64 {
    Jenkins96::hash(normalize_path(path).as_bytes()).hash64
}

/// Walk Root, Encoding and Index for `name_hash`.
///
/// Candidates are tried in root file order, each through its first file
/// key. The first candidate present in the index wins. On a miss the
/// furthest stage any candidate reached is reported.
pub fn locate(
    root: &RootTable,
    encoding: &EncodingTable,
    index: &IndexStore,
    name_hash: u64,
) -> Resolution<IndexEntry> {
    let checksums = root.get_content_checksums(name_hash);
    if checksums.is_empty() {
        trace!("Filename hash {name_hash:016x}: no root entries");
        return Resolution::MissingAt(Stage::Root);
    }

    let mut furthest = Stage::Encoding;
    for checksum in &checksums {
        let Some(file_key) = encoding.get_file_key(checksum) else {
            trace!("Filename hash {name_hash:016x}: checksum {checksum} missing from encoding");
            continue;
        };
        furthest = Stage::Index;
        match index.lookup(file_key) {
            Some(entry) => return Resolution::Found(entry.clone()),
            None => {
                trace!("Filename hash {name_hash:016x}: file key {file_key} missing from index");
            }
        }
    }

    Resolution::MissingAt(furthest)
}
