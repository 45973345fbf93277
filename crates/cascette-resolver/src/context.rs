//! Storage context: lazily loaded tables plus shard handles
//!
//! A [`StorageContext`] owns one installation's Index, Encoding and Root
//! tables. Each is parsed on first use, at most once, and shared read-only
//! afterwards. The Encoding blob is found through the Index by its file key;
//! the Root blob's content checksum is first translated through Encoding.

use crate::cell::{CellState, TableCell};
use crate::config::StorageConfig;
use crate::decoder::PayloadDecoder;
use crate::encoding::EncodingTable;
use crate::index::{IndexEntry, IndexStore};
use crate::key::ChecksumKey;
use crate::reader::BlockReader;
use crate::resolver::{self, Resolution, Stage};
use crate::root::RootTable;
use crate::storage::DataShard;
use crate::{Result, StorageError};
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// One of the three lazily loaded tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Index files
    Index,
    /// Encoding table
    Encoding,
    /// Root table
    Root,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Index => "index",
            Self::Encoding => "encoding",
            Self::Root => "root",
        })
    }
}

/// Snapshot of what a context has loaded. Counts are `None` for tables not
/// parsed yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    /// Distinct index keys
    pub index_entries: Option<usize>,
    /// Index files read
    pub index_files: Option<usize>,
    /// Encoding entries
    pub encoding_entries: Option<usize>,
    /// Root records
    pub root_entries: Option<usize>,
    /// Distinct filename hashes
    pub root_hashes: Option<usize>,
    /// Shards opened so far
    pub open_shards: usize,
}

/// Resolves logical paths against one installation.
///
/// Safe to share between threads; all methods take `&self`.
pub struct StorageContext {
    config: StorageConfig,
    data_path: PathBuf,
    encoding_key: ChecksumKey,
    root_checksum: ChecksumKey,
    decoder: Arc<dyn PayloadDecoder>,
    index: TableCell<IndexStore>,
    encoding: TableCell<EncodingTable>,
    root: TableCell<RootTable>,
    shards: DashMap<u16, Arc<DataShard>>,
}

impl fmt::Debug for StorageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageContext")
            .field("data_path", &self.data_path)
            .field("index", &self.index.state())
            .field("encoding", &self.encoding.state())
            .field("root", &self.root.state())
            .field("open_shards", &self.shards.len())
            .finish_non_exhaustive()
    }
}

impl StorageContext {
    /// Open an installation. No tables are read until needed.
    pub fn open(config: StorageConfig, decoder: Arc<dyn PayloadDecoder>) -> Result<Self> {
        let encoding_key = config.encoding_key()?;
        let root_checksum = config.root_checksum()?;
        let data_path = config.data_path();
        if !data_path.is_dir() {
            return Err(StorageError::Config(format!(
                "data directory {} does not exist",
                data_path.display()
            )));
        }
        info!("Opened storage context at {}", data_path.display());

        Ok(Self {
            config,
            data_path,
            encoding_key,
            root_checksum,
            decoder,
            index: TableCell::new(),
            encoding: TableCell::new(),
            root: TableCell::new(),
            shards: DashMap::new(),
        })
    }

    /// Configuration the context was opened with
    pub const fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Parse all three tables now. Repeated calls are no-ops once they
    /// succeed.
    pub fn initialise(&self) -> Result<()> {
        let index = self.index()?;
        let encoding = self.encoding()?;
        let root = self.root()?;
        info!(
            "Storage initialised: {} index entries, {} encoding entries, {} root entries",
            index.len(),
            encoding.len(),
            root.len()
        );
        Ok(())
    }

    /// Index store, loading it on first call.
    pub fn index(&self) -> Result<Arc<IndexStore>> {
        self.index.get_or_try_init(|| {
            IndexStore::load_dir(&self.data_path, self.config.max_shard_number)
        })
    }

    /// Encoding table, loading it on first call.
    pub fn encoding(&self) -> Result<Arc<EncodingTable>> {
        self.encoding.get_or_try_init(|| {
            let index = self.index()?;
            let entry = index
                .lookup(&self.encoding_key)
                .cloned()
                .ok_or_else(|| StorageError::EntryNotFound {
                    stage: Stage::Index,
                    key: self.encoding_key.to_hex(),
                })?;
            debug!(
                "Encoding blob {} in shard {} at {:#x}",
                self.encoding_key, entry.shard, entry.offset
            );
            EncodingTable::from_bytes(&self.read_entry(&entry)?)
        })
    }

    /// Root table, loading it on first call.
    pub fn root(&self) -> Result<Arc<RootTable>> {
        self.root.get_or_try_init(|| {
            let encoding = self.encoding()?;
            let index = self.index()?;
            let file_key = encoding.get_file_key(&self.root_checksum).ok_or_else(|| {
                StorageError::EntryNotFound {
                    stage: Stage::Encoding,
                    key: self.root_checksum.to_hex(),
                }
            })?;
            let entry = index
                .lookup(file_key)
                .cloned()
                .ok_or_else(|| StorageError::EntryNotFound {
                    stage: Stage::Index,
                    key: file_key.to_hex(),
                })?;
            debug!(
                "Root blob {} in shard {} at {:#x}",
                self.root_checksum, entry.shard, entry.offset
            );
            RootTable::from_bytes(&self.read_entry(&entry)?)
        })
    }

    /// Current state of one table.
    pub fn table_state(&self, kind: TableKind) -> CellState {
        match kind {
            TableKind::Index => self.index.state(),
            TableKind::Encoding => self.encoding.state(),
            TableKind::Root => self.root.state(),
        }
    }

    /// Sizes of whatever has been loaded, without loading anything.
    pub fn stats(&self) -> ContextStats {
        let index = self.index.get();
        let root = self.root.get();
        ContextStats {
            index_entries: index.as_ref().map(|t| t.len()),
            index_files: index.as_ref().map(|t| t.shard_files().len()),
            encoding_entries: self.encoding.get().map(|t| t.len()),
            root_entries: root.as_ref().map(|t| t.len()),
            root_hashes: root.as_ref().map(|t| t.get_hashes().count()),
            open_shards: self.shards.len(),
        }
    }

    /// Walk the lookup chain for a filename hash, reporting which stage
    /// missed.
    pub fn locate(&self, name_hash: u64) -> Result<Resolution<IndexEntry>> {
        let root = self.root()?;
        let encoding = self.encoding()?;
        let index = self.index()?;
        Ok(resolver::locate(&root, &encoding, &index, name_hash))
    }

    /// Framed payload for a logical path, or `None` if any stage misses.
    pub fn resolve(&self, path: &str) -> Result<Option<BlockReader>> {
        if path.is_empty() {
            return Err(StorageError::InvalidArgument("path must not be empty".into()));
        }
        let name_hash = resolver::filename_hash(path);
        debug!("Resolving {path} ({name_hash:016x})");
        self.resolve_hash(name_hash)
    }

    /// Framed payload for a filename hash, or `None` if any stage misses.
    pub fn resolve_hash(&self, name_hash: u64) -> Result<Option<BlockReader>> {
        match self.locate(name_hash)? {
            Resolution::Found(entry) => Ok(Some(self.shard(entry.shard)?.get_block(&entry)?)),
            Resolution::MissingAt(stage) => {
                debug!("Filename hash {name_hash:016x} not found: missing at {stage}");
                Ok(None)
            }
        }
    }

    /// Decoded file bytes for a logical path.
    pub fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.resolve(path)?
            .map(|block| self.decoder.decode(&block.into_bytes()))
            .transpose()
    }

    /// Content checksums listed in Root for a filename hash, in file order.
    pub fn list_content_checksums(&self, name_hash: u64) -> Result<Vec<ChecksumKey>> {
        Ok(self.root()?.get_content_checksums(name_hash))
    }

    /// Shard handle for `number`, opened once and cached.
    pub fn shard(&self, number: u16) -> Result<Arc<DataShard>> {
        if let Some(shard) = self.shards.get(&number) {
            return Ok(Arc::clone(shard.value()));
        }
        let shard = Arc::new(DataShard::open(
            number,
            self.config.shard_path(number),
            self.config.enable_mmap,
        )?);
        Ok(Arc::clone(self.shards.entry(number).or_insert(shard).value()))
    }

    /// Read and decode the block an index entry points at.
    fn read_entry(&self, entry: &IndexEntry) -> Result<Vec<u8>> {
        let block = self.shard(entry.shard)?.get_block(entry)?;
        self.decoder.decode(&block.into_bytes())
    }
}
