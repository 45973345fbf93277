//! Index file (.idx) loading
//!
//! Index files map truncated file keys to locations within `data.NNN`
//! shards. An installation keeps one index file per bucket, and rewrites
//! produce a new file with a higher version, so a directory may contain
//! several generations of the same bucket. Only the newest is read.
//!
//! File layout (IDX journal v7, little-endian header):
//!
//! ```text
//! [0x00] GuardedBlockHeader (8 bytes): header size + hash
//! [0x08] IndexHeaderV2 (16 bytes): version, bucket, field widths
//! [0x18] Padding (8 bytes)
//! [0x20] GuardedBlockHeader (8 bytes): entry data size + hash
//! [0x28] Entry data: packed records
//! ```
//!
//! Each record is `key (key_len) | location (5, big-endian) | size (4, LE)`.

use crate::key::{ChecksumKey, FILE_KEY_LEN};
use crate::{Result, StorageError};
use binrw::{BinRead, BinReaderExt, BinResult, Endian};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TABLE: &str = "index";

/// Offset of the first record in an index file.
pub const ENTRY_DATA_OFFSET: u64 = 0x28;

/// Expected journal version.
pub const INDEX_VERSION: u16 = 7;

/// Width of the packed location field.
const LOCATION_LEN: u8 = 5;

/// Width of the size field.
const SIZE_LEN: u8 = 4;

/// Guarded block header (size + hash)
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct GuardedBlockHeader {
    /// Size of the block data
    pub block_size: u32,
    /// Jenkins hash of the block data, not verified
    pub block_hash: u32,
}

/// IDX journal v7 header
#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct IndexHeaderV2 {
    /// Journal version (0x07)
    pub version: u16,
    /// Bucket the file belongs to
    pub bucket: u8,
    /// Extra bytes (0)
    pub extra_bytes: u8,
    /// Size field width
    pub encoded_size_length: u8,
    /// Location field width
    pub storage_offset_length: u8,
    /// Key field width
    pub ekey_length: u8,
    /// Offset bits within the location field
    pub file_offset_bits: u8,
    /// Size of one data segment
    pub segment_size: u64,
}

impl IndexHeaderV2 {
    fn record_len(&self) -> usize {
        usize::from(self.ekey_length)
            + usize::from(self.storage_offset_length)
            + usize::from(self.encoded_size_length)
    }

    fn validate(&self) -> Result<()> {
        if self.version != INDEX_VERSION {
            warn!("Unexpected index version: {}", self.version);
        }
        if self.ekey_length == 0 || usize::from(self.ekey_length) > crate::key::CHECKSUM_LEN {
            return Err(StorageError::malformed(
                TABLE,
                format!("invalid key size: {}", self.ekey_length),
            ));
        }
        if self.storage_offset_length != LOCATION_LEN || self.encoded_size_length != SIZE_LEN {
            return Err(StorageError::malformed(
                TABLE,
                format!(
                    "unsupported field widths: location {} size {}",
                    self.storage_offset_length, self.encoded_size_length
                ),
            ));
        }
        Ok(())
    }
}

/// Packed 5-byte storage location: high byte of the shard number, then a
/// big-endian word holding the two low shard bits and a 30-bit offset.
fn parse_location<R: Read + Seek>(reader: &mut R, _endian: Endian, _args: ()) -> BinResult<(u16, u32)> {
    let high = u16::from(reader.read_be::<u8>()?);
    let word = reader.read_be::<u32>()?;
    let shard = (high << 2) | (word >> 30) as u16;
    Ok((shard, word & 0x3FFF_FFFF))
}

/// One raw index record as laid out on disk.
#[derive(Debug, BinRead)]
#[br(import(key_len: u8))]
struct RawRecord {
    #[br(count = key_len)]
    key: Vec<u8>,
    #[br(parse_with = parse_location)]
    location: (u16, u32),
    #[br(little)]
    size: u32,
}

/// Physical location of a file key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// File key, truncated to 9 bytes
    pub key: ChecksumKey,
    /// `data.NNN` shard number
    pub shard: u16,
    /// Offset of the block header within the shard
    pub offset: u32,
    /// Encoded size including the block header
    pub size: u32,
}

/// Bucket and version decoded from an index filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexFileId {
    /// Index bucket (shard of the key space)
    pub bucket: u8,
    /// Generation; higher is newer
    pub version: u32,
}

/// Format an index filename: `{bucket:02x}{version:08x}.idx`.
pub fn index_filename(bucket: u8, version: u32) -> String {
    format!("{bucket:02x}{version:08x}.idx")
}

/// Parse an index filename of the form `{bucket:02x}{version:08x}.idx`.
pub fn parse_index_filename(filename: &str) -> Option<IndexFileId> {
    // 10 hex digits + ".idx"
    if filename.len() != 14
        || !Path::new(filename)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("idx"))
    {
        return None;
    }

    let bucket = u8::from_str_radix(filename.get(0..2)?, 16).ok()?;
    let version = u32::from_str_radix(filename.get(2..10)?, 16).ok()?;
    Some(IndexFileId { bucket, version })
}

/// Keep only the highest version per bucket, ordered by bucket.
pub fn select_latest(files: impl IntoIterator<Item = PathBuf>) -> Vec<(IndexFileId, PathBuf)> {
    let mut latest: BTreeMap<u8, (IndexFileId, PathBuf)> = BTreeMap::new();
    for path in files {
        let Some(id) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_index_filename)
        else {
            continue;
        };
        match latest.get(&id.bucket) {
            Some((current, _)) if current.version >= id.version => {
                debug!(
                    "Index bucket {:02x}: version {:08x} superseded by {:08x}",
                    id.bucket, id.version, current.version
                );
            }
            Some((current, _)) => {
                debug!(
                    "Index bucket {:02x}: version {:08x} superseded by {:08x}",
                    id.bucket, current.version, id.version
                );
                latest.insert(id.bucket, (id, path));
            }
            None => {
                latest.insert(id.bucket, (id, path));
            }
        }
    }
    latest.into_values().collect()
}

/// Parse the records of one index file.
///
/// All-zero keys mark unused slots and are skipped. A decoded shard number
/// above `max_shard` means the record offsets are misaligned and fails the
/// whole file.
pub fn parse_index(data: &[u8], max_shard: u16) -> Result<Vec<IndexEntry>> {
    let mut cursor = Cursor::new(data);

    let _header_block: GuardedBlockHeader = cursor
        .read_le()
        .map_err(|e| StorageError::from_binrw(TABLE, &e))?;
    let header: IndexHeaderV2 = cursor
        .read_le()
        .map_err(|e| StorageError::from_binrw(TABLE, &e))?;
    header.validate()?;

    cursor.set_position(ENTRY_DATA_OFFSET - 8);
    let entry_block: GuardedBlockHeader = cursor
        .read_le()
        .map_err(|e| StorageError::from_binrw(TABLE, &e))?;

    let block_len = entry_block.block_size as usize;
    let available = data.len().saturating_sub(ENTRY_DATA_OFFSET as usize);
    if block_len > available {
        return Err(StorageError::malformed(
            TABLE,
            format!("entry block of {block_len} bytes exceeds file ({available} available)"),
        ));
    }

    let record_len = header.record_len();
    let count = block_len / record_len;
    let mut entries = Vec::with_capacity(count);

    for i in 0..count {
        let record_start = ENTRY_DATA_OFFSET + (i * record_len) as u64;
        cursor.set_position(record_start);
        let raw = RawRecord::read_options(&mut cursor, Endian::Big, (header.ekey_length,))
            .map_err(|e| StorageError::from_binrw(TABLE, &e))?;

        if raw.key.iter().all(|&b| b == 0) {
            continue;
        }

        let (shard, offset) = raw.location;
        if shard > max_shard {
            return Err(StorageError::malformed(
                TABLE,
                format!(
                    "record {i} at {record_start:#x} decodes shard {shard}, above maximum {max_shard}"
                ),
            ));
        }

        entries.push(IndexEntry {
            key: ChecksumKey::new(&raw.key)?.trim(FILE_KEY_LEN),
            shard,
            offset,
            size: raw.size,
        });
    }

    Ok(entries)
}

/// Merged view over the newest index file of every bucket.
#[derive(Debug, Default)]
pub struct IndexStore {
    entries: HashMap<ChecksumKey, IndexEntry>,
    files: Vec<(IndexFileId, PathBuf)>,
}

impl IndexStore {
    /// Load every index file in `dir`.
    pub fn load_dir(dir: &Path, max_shard: u16) -> Result<Self> {
        info!("Loading index files from {}", dir.display());
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            paths.push(entry?.path());
        }
        Self::build(paths, max_shard)
    }

    /// Build from a set of index file paths.
    ///
    /// Files whose names do not match the index pattern are ignored. For
    /// each bucket only the highest version is read. Buckets are merged in
    /// ascending order and a key keeps the first location seen.
    pub fn build(paths: impl IntoIterator<Item = PathBuf>, max_shard: u16) -> Result<Self> {
        let files = select_latest(paths);
        let mut entries = HashMap::new();

        for (id, path) in &files {
            let data = fs::read(path)?;
            let parsed = parse_index(&data, max_shard).map_err(|e| match e {
                StorageError::MalformedContainer { table, detail } => StorageError::malformed(
                    table,
                    format!("{}: {detail}", path.display()),
                ),
                other => other,
            })?;
            let total = parsed.len();
            let mut kept = 0usize;
            for entry in parsed {
                if !entries.contains_key(&entry.key) {
                    entries.insert(entry.key.clone(), entry);
                    kept += 1;
                }
            }
            debug!(
                "Index {:02x} version {:08x}: {} records, {} new keys",
                id.bucket, id.version, total, kept
            );
        }

        info!(
            "Loaded {} index entries from {} index files",
            entries.len(),
            files.len()
        );
        Ok(Self { entries, files })
    }

    /// Look up a file key. Keys longer than 9 bytes are truncated first.
    pub fn lookup(&self, key: &ChecksumKey) -> Option<&IndexEntry> {
        let bytes = key.as_bytes();
        self.entries.get(&bytes[..bytes.len().min(FILE_KEY_LEN)])
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys were loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.entries.values()
    }

    /// The index files that were read, ordered by bucket.
    pub fn shard_files(&self) -> &[(IndexFileId, PathBuf)] {
        &self.files
    }
}
