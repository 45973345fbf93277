//! 30-byte block header preceding each payload in `data.NNN` shards.
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 16   | Hash (not verified) |
//! | 0x10   | 4    | Block size including this header (LE) |
//! | 0x14   | 10   | Reserved |

use crate::{Result, StorageError};
use binrw::{BinRead, BinReaderExt};
use std::io::Cursor;

/// Size of the block header in bytes.
pub const BLOCK_HEADER_SIZE: usize = 0x1E;

/// Header at an index entry's offset.
#[derive(Debug, Clone, PartialEq, Eq, BinRead)]
#[br(little)]
pub struct BlockHeader {
    /// Hash of the block, stored as-is
    pub hash: [u8; 16],
    /// Size of header plus payload
    pub block_size: u32,
    /// Reserved bytes
    pub reserved: [u8; 10],
}

impl BlockHeader {
    /// Parse a header from the first 30 bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < BLOCK_HEADER_SIZE {
            return Err(StorageError::malformed(
                "block header",
                format!("need {BLOCK_HEADER_SIZE} bytes, got {}", data.len()),
            ));
        }
        let header: Self = Cursor::new(data)
            .read_le()
            .map_err(|e| StorageError::from_binrw("block header", &e))?;
        if (header.block_size as usize) < BLOCK_HEADER_SIZE {
            return Err(StorageError::malformed(
                "block header",
                format!(
                    "block size {} smaller than header ({BLOCK_HEADER_SIZE})",
                    header.block_size
                ),
            ));
        }
        Ok(header)
    }

    /// Offset of the payload for a header read at `offset`.
    pub const fn data_start(&self, offset: u64) -> u64 {
        offset.saturating_add(BLOCK_HEADER_SIZE as u64)
    }

    /// Payload size (block size minus the header), zero for undersized
    /// headers read without [`parse`](Self::parse).
    pub const fn data_size(&self) -> u32 {
        self.block_size.saturating_sub(BLOCK_HEADER_SIZE as u32)
    }
}
