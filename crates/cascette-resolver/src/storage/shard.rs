//! One numbered `data.NNN` file

use super::block_header::{BLOCK_HEADER_SIZE, BlockHeader};
use crate::index::IndexEntry;
use crate::reader::{BlockReader, Segment, SegmentedReader};
use crate::{Result, StorageError};
use bytes::Bytes;
use dashmap::DashMap;
use memmap2::MmapOptions;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, trace};

/// Filename of shard `number`: `data.NNN`.
pub fn shard_filename(number: u16) -> String {
    format!("data.{number:03}")
}

enum ShardSource {
    /// Whole file mapped into memory
    Mapped(Bytes),
    /// Positional reads through a shared handle
    File { file: Mutex<File>, len: u64 },
}

impl ShardSource {
    fn len(&self) -> u64 {
        match self {
            Self::Mapped(bytes) => bytes.len() as u64,
            Self::File { len, .. } => *len,
        }
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Bytes> {
        let end = offset.checked_add(len as u64).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "read range overflows")
        })?;
        if end > self.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("range {offset}..{end} past end of file ({} bytes)", self.len()),
            ));
        }
        match self {
            Self::Mapped(bytes) => Ok(bytes.slice(offset as usize..end as usize)),
            Self::File { file, .. } => {
                let mut buf = vec![0u8; len];
                let mut file = file.lock();
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut buf)?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

/// Read-only handle on one data shard.
///
/// The file is opened on first use. Block headers are cached by offset.
pub struct DataShard {
    number: u16,
    path: PathBuf,
    use_mmap: bool,
    source: OnceLock<ShardSource>,
    headers: DashMap<u32, BlockHeader>,
}

impl std::fmt::Debug for DataShard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataShard")
            .field("number", &self.number)
            .field("path", &self.path)
            .field("use_mmap", &self.use_mmap)
            .field("opened", &self.source.get().is_some())
            .field("cached_headers", &self.headers.len())
            .finish()
    }
}

impl DataShard {
    /// Create a handle for shard `number` at `path`.
    ///
    /// Only checks that the file exists.
    pub fn open(number: u16, path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(StorageError::IoFailure {
                shard: number,
                path,
                offset: 0,
                source: io::Error::new(io::ErrorKind::NotFound, "shard file missing"),
            });
        }
        Ok(Self {
            number,
            path,
            use_mmap,
            source: OnceLock::new(),
            headers: DashMap::new(),
        })
    }

    /// Shard number
    pub const fn number(&self) -> u16 {
        self.number
    }

    /// Shard file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of block headers read so far.
    pub fn cached_headers(&self) -> usize {
        self.headers.len()
    }

    /// Payload of the block an index entry points at.
    ///
    /// The returned reader covers `[offset + 30, offset + block_size)`.
    pub fn get_block(&self, entry: &IndexEntry) -> Result<BlockReader> {
        if entry.shard != self.number {
            return Err(StorageError::InvalidArgument(format!(
                "entry {} belongs to shard {}, not {}",
                entry.key, entry.shard, self.number
            )));
        }

        let offset = u64::from(entry.offset);
        let header = self.header_at(entry.offset)?;
        if header.block_size != entry.size {
            trace!(
                "Shard {} offset {:#x}: header size {} differs from index size {}",
                self.number, offset, header.block_size, entry.size
            );
        }

        let start = header.data_start(offset);
        let payload = self
            .source()?
            .read_at(start, header.data_size() as usize)
            .map_err(|e| self.io_failure(start, e))?;
        let length = payload.len();
        Ok(SegmentedReader::new([Segment::new(payload, 0, length)?]))
    }

    /// Block header at `offset`, read once and cached.
    pub fn header_at(&self, offset: u32) -> Result<BlockHeader> {
        if let Some(header) = self.headers.get(&offset) {
            return Ok(header.value().clone());
        }
        let raw = self
            .source()?
            .read_at(u64::from(offset), BLOCK_HEADER_SIZE)
            .map_err(|e| self.io_failure(u64::from(offset), e))?;
        let header = BlockHeader::parse(&raw)?;
        // Concurrent readers may race here; both parse identical bytes
        Ok(self.headers.entry(offset).or_insert(header).value().clone())
    }

    fn source(&self) -> Result<&ShardSource> {
        if let Some(source) = self.source.get() {
            return Ok(source);
        }
        let opened = self.open_source().map_err(|e| self.io_failure(0, e))?;
        Ok(self.source.get_or_init(|| opened))
    }

    fn open_source(&self) -> io::Result<ShardSource> {
        let file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        debug!(
            "Opened shard {} ({} bytes, mmap={}) at {}",
            self.number,
            len,
            self.use_mmap,
            self.path.display()
        );
        if !self.use_mmap {
            return Ok(ShardSource::File {
                file: Mutex::new(file),
                len,
            });
        }
        if len == 0 {
            return Ok(ShardSource::Mapped(Bytes::new()));
        }
        // The shard is opened read-only and never written through this handle
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(ShardSource::Mapped(Bytes::from_owner(mmap)))
    }

    fn io_failure(&self, offset: u64, source: io::Error) -> StorageError {
        StorageError::IoFailure {
            shard: self.number,
            path: self.path.clone(),
            offset,
            source,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::key::ChecksumKey;

    fn block(payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0x11; 16];
        out.extend_from_slice(&((payload.len() + BLOCK_HEADER_SIZE) as u32).to_le_bytes());
        out.extend_from_slice(&[0; 10]);
        out.extend_from_slice(payload);
        out
    }

    fn entry(shard: u16, offset: u32, size: u32) -> IndexEntry {
        IndexEntry {
            key: ChecksumKey::new([1; 9]).unwrap(),
            shard,
            offset,
            size,
        }
    }

    fn shard_file(dir: &Path) -> (PathBuf, u32) {
        let mut data = vec![0xFFu8; 16];
        let offset = data.len() as u32;
        data.extend(block(b"framed payload"));
        let path = dir.join(shard_filename(3));
        std::fs::write(&path, data).unwrap();
        (path, offset)
    }

    #[test]
    fn filename_is_zero_padded() {
        assert_eq!(shard_filename(0), "data.000");
        assert_eq!(shard_filename(37), "data.037");
    }

    #[test]
    fn reads_block_with_and_without_mmap() {
        let dir = tempfile::tempdir().unwrap();
        let (path, offset) = shard_file(dir.path());

        for use_mmap in [true, false] {
            let shard = DataShard::open(3, &path, use_mmap).unwrap();
            let mut block = shard.get_block(&entry(3, offset, 44)).unwrap();
            assert_eq!(block.len(), 14);
            let mut out = Vec::new();
            block.read_to_end(&mut out).unwrap();
            assert_eq!(out, b"framed payload");
            assert_eq!(shard.cached_headers(), 1);

            shard.get_block(&entry(3, offset, 44)).unwrap();
            assert_eq!(shard.cached_headers(), 1);
        }
    }

    #[test]
    fn wrong_shard_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (path, offset) = shard_file(dir.path());
        let shard = DataShard::open(3, &path, true).unwrap();
        assert!(matches!(
            shard.get_block(&entry(4, offset, 44)),
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn missing_file_and_out_of_range_reads() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DataShard::open(9, dir.path().join("data.009"), true),
            Err(StorageError::IoFailure { shard: 9, .. })
        ));

        let (path, _) = shard_file(dir.path());
        let shard = DataShard::open(3, &path, false).unwrap();
        let err = shard.get_block(&entry(3, 1000, 44)).unwrap_err();
        match err {
            StorageError::IoFailure {
                shard,
                offset,
                source,
                ..
            } => {
                assert_eq!(shard, 3);
                assert_eq!(offset, 1000);
                assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn block_size_past_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(shard_filename(0));
        let mut data = block(b"abc");
        // Claim a larger block than the file holds
        data[16..20].copy_from_slice(&500u32.to_le_bytes());
        std::fs::write(&path, data).unwrap();

        let shard = DataShard::open(0, &path, true).unwrap();
        assert!(matches!(
            shard.get_block(&entry(0, 0, 500)),
            Err(StorageError::IoFailure { offset: 30, .. })
        ));
    }
}
