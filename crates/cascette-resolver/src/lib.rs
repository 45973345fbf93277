//! Read-only CASC storage resolution for local game installations.
//!
//! This crate turns a logical asset path into the framed payload stored in
//! an installation's `Data/data/` directory. Resolution walks three chained
//! lookup tables:
//!
//! - **Root**: filename hash -> content checksum(s)
//! - **Encoding**: content checksum -> file key(s)
//! - **Index**: truncated file key -> shard number, offset and size
//!
//! The located block inside a `data.NNN` shard is returned as a
//! [`BlockReader`]. Unwrapping the BLTE framing is left to a
//! [`PayloadDecoder`] supplied by the caller.
//!
//! # Example
//!
//! ```rust,no_run
//! use cascette_resolver::{RawPayload, StorageConfig, StorageContext};
//! use std::sync::Arc;
//!
//! # fn example() -> cascette_resolver::Result<()> {
//! let config = StorageConfig::new("/path/to/wow")
//!     .with_encoding_key("0123456789abcdef0123456789abcdef")
//!     .with_root_checksum("fedcba9876543210fedcba9876543210");
//! let context = StorageContext::open(config, Arc::new(RawPayload))?;
//! context.initialise()?;
//!
//! if let Some(block) = context.resolve("Interface/Glues/Models/UI_Human.m2")? {
//!     println!("framed payload: {} bytes", block.len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

use std::path::PathBuf;
use thiserror::Error;

// Value types and byte access
pub mod key;
pub mod reader;

// Lookup tables
pub mod encoding;
pub mod index;
pub mod root;

// Data shards
pub mod storage;

// Resolution pipeline
pub mod cell;
pub mod context;
pub mod resolver;

// Configuration and collaborators
pub mod config;
pub mod decoder;

pub use config::StorageConfig;
pub use context::{ContextStats, StorageContext, TableKind};
pub use decoder::{PayloadDecoder, RawPayload};
pub use encoding::{EncodingEntry, EncodingTable};
pub use index::{IndexEntry, IndexStore};
pub use key::ChecksumKey;
pub use reader::{BlockReader, Segment, SegmentedReader, TypedRead};
pub use resolver::{Resolution, Stage};
pub use root::{RootEntry, RootFlags, RootTable};
pub use storage::{BlockHeader, DataShard};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while opening or resolving a container.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A table or header violated its structural invariants.
    #[error("Malformed {table}: {detail}")]
    MalformedContainer {
        /// Table or structure being parsed
        table: &'static str,
        /// What was wrong
        detail: String,
    },

    /// A resolution stage found nothing for the key.
    #[error("Entry not found at {stage}: {key}")]
    EntryNotFound {
        /// Stage that missed
        stage: Stage,
        /// Key that was looked up, as hex
        key: String,
    },

    /// Reading from a data shard failed.
    #[error("I/O failure in shard {shard} ({}) at offset {offset:#x}: {source}", path.display())]
    IoFailure {
        /// Shard number
        shard: u16,
        /// Shard file path
        path: PathBuf,
        /// Byte offset of the failed read
        offset: u64,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Caller supplied an unusable argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error outside shard reads.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload decoder failed.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl StorageError {
    /// Build a `MalformedContainer` error.
    pub fn malformed(table: &'static str, detail: impl Into<String>) -> Self {
        Self::MalformedContainer {
            table,
            detail: detail.into(),
        }
    }

    /// Map a binrw parse failure into `MalformedContainer`.
    pub(crate) fn from_binrw(table: &'static str, err: &binrw::Error) -> Self {
        Self::malformed(table, err.to_string())
    }
}

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default data directory name (installation root).
pub const DEFAULT_DATA_DIR: &str = "Data";

/// Data subdirectory where both `.idx` and `data.NNN` files live.
pub const DATA_DIR: &str = "data";

/// Default inclusive upper bound for decoded shard numbers.
pub const DEFAULT_MAX_SHARD: u16 = 32;
