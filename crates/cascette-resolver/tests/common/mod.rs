#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

//! Synthetic installation builder for integration tests.
//!
//! Lays out `<tmp>/Data/data/` with `data.NNN` shards, `.idx` files and the
//! encoding and root blobs, stored unframed so [`RawPayload`] reads them.

use cascette_crypto::content_checksum;
use cascette_resolver::index::index_filename;
use cascette_resolver::resolver::filename_hash;
use cascette_resolver::storage::shard_filename;
use cascette_resolver::{RawPayload, StorageConfig, StorageContext};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Bucket and version of the index file records go to by default.
pub const DEFAULT_INDEX: (u8, u32) = (0, 1);

/// Shard holding the encoding and root blobs.
pub const TABLE_SHARD: u16 = 0;

/// Locale flags applying to every locale.
pub const ALL_LOCALES: u64 = 0xFFFF_FFFF;

type IndexRecord = ([u8; 9], u16, u32, u32);

/// Location of a block written to a shard.
#[derive(Debug, Clone, Copy)]
pub struct Stored {
    pub shard: u16,
    pub offset: u32,
    pub size: u32,
}

/// Identifiers of a file added with [`InstallBuilder::add_file`].
#[derive(Debug, Clone, Copy)]
pub struct FileIds {
    pub name_hash: u64,
    pub checksum: [u8; 16],
    pub file_key: [u8; 16],
}

#[derive(Default)]
pub struct InstallBuilder {
    shards: BTreeMap<u16, Vec<u8>>,
    index_files: BTreeMap<(u8, u32), Vec<IndexRecord>>,
    encoding: Vec<(u32, [u8; 16], Vec<[u8; 16]>)>,
    root: Vec<(u64, [u8; 16], u64)>,
    raw_root: Option<Vec<u8>>,
}

impl InstallBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a 30-byte header plus `payload` to `shard`.
    pub fn store_block(&mut self, shard: u16, payload: &[u8]) -> Stored {
        let data = self.shards.entry(shard).or_default();
        // Leading filler so offsets are never zero
        if data.is_empty() {
            data.extend_from_slice(&[0xCC; 16]);
        }
        let offset = data.len() as u32;
        let size = (payload.len() + 30) as u32;
        data.extend_from_slice(&content_checksum(payload));
        data.extend_from_slice(&size.to_le_bytes());
        data.extend_from_slice(&[0; 10]);
        data.extend_from_slice(payload);
        Stored {
            shard,
            offset,
            size,
        }
    }

    /// Add a raw record to index file `(bucket, version)`.
    pub fn index_record(&mut self, file: (u8, u32), key: &[u8], stored: Stored) {
        let mut short = [0u8; 9];
        short.copy_from_slice(&key[..9]);
        self.index_files
            .entry(file)
            .or_default()
            .push((short, stored.shard, stored.offset, stored.size));
    }

    /// Store `payload` in `shard` and index it under its MD5. Returns the
    /// file key.
    pub fn store(&mut self, shard: u16, payload: &[u8]) -> [u8; 16] {
        let key = file_key_for(payload);
        let stored = self.store_block(shard, payload);
        self.index_record(DEFAULT_INDEX, &key, stored);
        key
    }

    /// Add an encoding entry.
    pub fn encode(&mut self, checksum: [u8; 16], size: u32, keys: &[[u8; 16]]) {
        self.encoding.push((size, checksum, keys.to_vec()));
    }

    /// Add a root entry.
    pub fn root_entry(&mut self, name_hash: u64, checksum: [u8; 16], flags: u64) {
        self.root.push((name_hash, checksum, flags));
    }

    /// Replace the generated root blob with raw bytes.
    pub fn raw_root(&mut self, bytes: Vec<u8>) {
        self.raw_root = Some(bytes);
    }

    /// Store `contents` in shard 1 and wire it through all three tables.
    pub fn add_file(&mut self, path: &str, contents: &[u8]) -> FileIds {
        let checksum = content_checksum(contents);
        let file_key = self.store(1, contents);
        self.encode(checksum, contents.len() as u32, &[file_key]);
        let name_hash = filename_hash(path);
        self.root_entry(name_hash, checksum, ALL_LOCALES);
        FileIds {
            name_hash,
            checksum,
            file_key,
        }
    }

    fn root_blob(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw_root {
            return raw.clone();
        }
        let mut out = Vec::new();
        for (hash, checksum, flags) in &self.root {
            out.extend_from_slice(&hash.to_le_bytes());
            out.extend_from_slice(checksum);
            out.extend_from_slice(&flags.to_le_bytes());
        }
        out
    }

    /// Write everything to a fresh temporary installation.
    pub fn build(mut self) -> Fixture {
        let root_blob = self.root_blob();
        let root_checksum = content_checksum(&root_blob);
        let root_key = self.store(TABLE_SHARD, &root_blob);
        self.encode(root_checksum, root_blob.len() as u32, &[root_key]);

        let encoding_blob = encoding_blob(&self.encoding);
        let encoding_key = self.store(TABLE_SHARD, &encoding_blob);

        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("Data").join("data");
        std::fs::create_dir_all(&data_path).unwrap();

        for (number, data) in &self.shards {
            std::fs::write(data_path.join(shard_filename(*number)), data).unwrap();
        }
        for ((bucket, version), records) in &self.index_files {
            std::fs::write(
                data_path.join(index_filename(*bucket, *version)),
                index_file(*bucket, records),
            )
            .unwrap();
        }

        let config = StorageConfig::new(dir.path())
            .with_encoding_key(hex::encode(encoding_key))
            .with_root_checksum(hex::encode(root_checksum));
        Fixture { dir, config }
    }
}

/// A built installation. The directory lives as long as the fixture.
pub struct Fixture {
    pub dir: TempDir,
    pub config: StorageConfig,
}

impl Fixture {
    pub fn context(&self) -> StorageContext {
        StorageContext::open(self.config.clone(), Arc::new(RawPayload)).unwrap()
    }

    pub fn data_path(&self) -> std::path::PathBuf {
        self.config.data_path()
    }
}

/// File key used for a stored payload: the MD5 of the payload, reversed so
/// it never collides with the payload's content checksum.
pub fn file_key_for(payload: &[u8]) -> [u8; 16] {
    let mut key = content_checksum(payload);
    key.reverse();
    key
}

/// Encode an index file with 9-byte keys.
pub fn index_file(bucket: u8, records: &[IndexRecord]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&7u16.to_le_bytes());
    out.extend_from_slice(&[bucket, 0, 4, 5, 9, 30]);
    out.extend_from_slice(&0x4000_0000u64.to_le_bytes());
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&((records.len() * 18) as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    for (key, shard, offset, size) in records {
        out.extend_from_slice(key);
        out.push((shard >> 2) as u8);
        let word = (u32::from(shard & 0x03) << 30) | (offset & 0x3FFF_FFFF);
        out.extend_from_slice(&word.to_be_bytes());
        out.extend_from_slice(&size.to_le_bytes());
    }
    out
}

/// Encode an encoding table holding all entries in one packed run.
pub fn encoding_blob(entries: &[(u32, [u8; 16], Vec<[u8; 16]>)]) -> Vec<u8> {
    let strings = b"b:{*=n}\0";
    let mut out = b"EN".to_vec();
    out.extend_from_slice(&[1, 16, 16]);
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.push(0);
    out.extend_from_slice(&(strings.len() as u32).to_be_bytes());
    out.extend_from_slice(strings);
    out.extend_from_slice(&[0; 32]);
    for (size, checksum, keys) in entries {
        out.extend_from_slice(&(keys.len() as u16).to_le_bytes());
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(checksum);
        for key in keys {
            out.extend_from_slice(key);
        }
    }
    out.extend_from_slice(&[0, 0]);
    out
}
