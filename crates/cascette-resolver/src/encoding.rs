//! Encoding table: content checksum -> file keys
//!
//! Layout (big-endian header):
//!
//! ```text
//! [0x00] locale tag (2) | version (1) | ckey size (1) | ekey size (1)
//! [0x05] page size KiB (u16) | espec page size KiB (u16)
//! [0x09] run count (u32) | espec page count (u32) | flags (u8)
//! [0x12] string block size (u32)
//! [0x16] string block
//!        run index: run count x 32 bytes
//!        runs
//! ```
//!
//! A run is a sequence of records terminated by a two-byte zero sentinel:
//! `key count (u16 LE) | file size (u32 BE) | checksum (16) | keys (count x 16)`.
//!
//! Only the low byte of the key count word is the key count, so a record
//! holds at most 255 keys. The high byte is the top byte of a 40-bit file
//! size. A word such as `0x0101` therefore reads as one key and a size of
//! at least 4 GiB, never as 257 keys.
//!
//! Zero bytes after a run's sentinel are padding and are skipped; the next
//! run starts at the first non-zero byte. The header's page size is kept for
//! diagnostics only. Paged tables pad each run with zeros up to the page
//! boundary, so skipping zeros lands on the same place.

use crate::key::{CHECKSUM_LEN, ChecksumKey};
use crate::reader::TypedRead;
use crate::{Result, StorageError};
use binrw::{BinRead, BinReaderExt, Endian};
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};
use tracing::{debug, info, trace};

const TABLE: &str = "encoding";

/// Size of one run index record (first checksum + run checksum).
const RUN_INDEX_RECORD: u64 = 32;

/// Fixed-size encoding table header.
#[derive(Debug, Clone, BinRead)]
#[br(big)]
pub struct EncodingHeader {
    /// Two-byte tag, `EN` in practice
    pub locale: [u8; 2],
    /// Format version
    pub version: u8,
    /// Declared checksum width, informational
    pub ckey_hash_size: u8,
    /// Declared file key width, informational
    pub ekey_hash_size: u8,
    /// Run page size in KiB, informational
    pub page_size_kb: u16,
    /// Encoding-spec page size in KiB
    pub espec_page_size_kb: u16,
    /// Number of runs
    pub run_count: u32,
    /// Encoding-spec page count
    pub espec_page_count: u32,
    /// Flags
    pub flags: u8,
    /// Size of the string block following the header
    pub string_block_size: u32,
}

/// Size and file keys for one content checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingEntry {
    /// Decoded size of the file
    pub file_size: u64,
    /// Content checksum
    pub checksum: ChecksumKey,
    /// File keys, canonical first; never empty
    pub file_keys: Vec<ChecksumKey>,
}

/// Parsed encoding table.
#[derive(Debug, Default)]
pub struct EncodingTable {
    entries: Vec<EncodingEntry>,
    by_checksum: HashMap<ChecksumKey, usize>,
}

impl EncodingTable {
    /// Parse an encoding table from a byte slice.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse(&mut Cursor::new(data))
    }

    /// Parse an encoding table starting at the reader's cursor.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let header: EncodingHeader = reader
            .read_be()
            .map_err(|e| StorageError::from_binrw(TABLE, &e))?;
        debug!(
            "Encoding header: version {} page {} KiB, {} runs, string block {} bytes",
            header.version, header.page_size_kb, header.run_count, header.string_block_size
        );

        let skipped = u64::from(header.string_block_size)
            + u64::from(header.run_count) * RUN_INDEX_RECORD;
        let remaining = reader.remaining()?;
        if skipped > remaining {
            return Err(StorageError::malformed(
                TABLE,
                format!("declared blocks need {skipped} bytes, only {remaining} remain"),
            ));
        }
        reader.skip(skipped)?;

        let mut table = Self::default();

        for run in 0..header.run_count {
            if reader.remaining()? == 0 {
                return Err(StorageError::malformed(
                    TABLE,
                    format!("declared {} runs, input ends at run {run}", header.run_count),
                ));
            }
            let run_start = reader.position()?;
            let parsed = table.parse_run(reader)?;
            trace!("Encoding run {run} at {run_start:#x}: {parsed} records");
            skip_zero_padding(reader)?;
        }

        info!(
            "Loaded encoding table with {} entries from {} runs",
            table.entries.len(),
            header.run_count
        );
        Ok(table)
    }

    /// Read records until the sentinel or the end of input. Returns the
    /// number of records read.
    fn parse_run<R: Read + Seek>(&mut self, reader: &mut R) -> Result<usize> {
        let mut records = 0;
        loop {
            let pos = reader.position()?;
            if reader.remaining()? < 2 {
                break;
            }

            let word = reader.read_u16(Endian::Little)?;
            if word == 0 {
                break;
            }
            let key_count = usize::from(word & 0xFF);
            if key_count == 0 {
                return Err(StorageError::malformed(
                    TABLE,
                    format!("record at {pos:#x} has no file keys"),
                ));
            }

            let needed = (4 + CHECKSUM_LEN + key_count * CHECKSUM_LEN) as u64;
            if reader.remaining()? < needed {
                return Err(StorageError::malformed(
                    TABLE,
                    format!("record at {pos:#x} declares {key_count} keys past end of input"),
                ));
            }

            let size_low = reader.read_u32(Endian::Big)?;
            let file_size = (u64::from(word >> 8) << 32) | u64::from(size_low);
            let checksum = reader.read_key(CHECKSUM_LEN)?;
            let file_keys = (0..key_count)
                .map(|_| reader.read_key(CHECKSUM_LEN))
                .collect::<Result<Vec<_>>>()?;

            self.insert(EncodingEntry {
                file_size,
                checksum,
                file_keys,
            });
            records += 1;
        }
        Ok(records)
    }

    fn insert(&mut self, entry: EncodingEntry) {
        if self.by_checksum.contains_key(&entry.checksum) {
            trace!("Duplicate encoding checksum {} ignored", entry.checksum);
            return;
        }
        self.by_checksum
            .insert(entry.checksum.clone(), self.entries.len());
        self.entries.push(entry);
    }

    /// Entry for a content checksum.
    pub fn get_entry(&self, checksum: &ChecksumKey) -> Option<&EncodingEntry> {
        self.by_checksum
            .get(checksum)
            .and_then(|&idx| self.entries.get(idx))
    }

    /// Canonical (first) file key for a content checksum.
    pub fn get_file_key(&self, checksum: &ChecksumKey) -> Option<&ChecksumKey> {
        self.get_entry(checksum).and_then(|e| e.file_keys.first())
    }

    /// Stored file size for a content checksum.
    ///
    /// Not checked against anything during resolution.
    pub fn get_file_size(&self, checksum: &ChecksumKey) -> Option<u64> {
        self.get_entry(checksum).map(|e| e.file_size)
    }

    /// Number of distinct checksums.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in the order they were first seen.
    pub fn iter(&self) -> impl Iterator<Item = &EncodingEntry> + '_ {
        self.entries.iter()
    }
}

/// Advance past zero bytes, leaving the cursor on the next non-zero byte
/// or at end of input.
fn skip_zero_padding<R: Read + Seek>(reader: &mut R) -> Result<()> {
    let mut byte = [0u8; 1];
    loop {
        if reader.read(&mut byte)? == 0 {
            return Ok(());
        }
        if byte[0] != 0 {
            reader.seek(SeekFrom::Current(-1))?;
            return Ok(());
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(b: u8) -> [u8; 16] {
        [b; 16]
    }

    fn header(page_size_kb: u16, runs: u32, strings: &[u8]) -> Vec<u8> {
        let mut out = b"EN".to_vec();
        out.extend_from_slice(&[1, 16, 16]);
        out.extend_from_slice(&page_size_kb.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&runs.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.push(0);
        out.extend_from_slice(&(strings.len() as u32).to_be_bytes());
        out.extend_from_slice(strings);
        out.extend(std::iter::repeat_n(0xEE, runs as usize * 32));
        out
    }

    fn record(out: &mut Vec<u8>, size: u32, checksum: [u8; 16], keys: &[[u8; 16]]) {
        out.extend_from_slice(&(keys.len() as u16).to_le_bytes());
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(&checksum);
        for k in keys {
            out.extend_from_slice(k);
        }
    }

    #[test]
    fn two_records_stop_at_sentinel() {
        let mut data = header(0, 1, b"b:{*=z}\0");
        record(&mut data, 100, key(0xA0), &[key(0x01)]);
        record(&mut data, 200, key(0xB0), &[key(0x02), key(0x03)]);
        data.extend_from_slice(&[0, 0]);
        data.extend_from_slice(&[0; 6]);

        let table = EncodingTable::from_bytes(&data).unwrap();
        assert_eq!(table.len(), 2);

        let a = ChecksumKey::new(key(0xA0)).unwrap();
        let b = ChecksumKey::new(key(0xB0)).unwrap();
        assert_eq!(table.get_file_key(&a).unwrap().as_bytes(), &key(0x01));
        assert_eq!(table.get_file_key(&b).unwrap().as_bytes(), &key(0x02));
        assert_eq!(table.get_entry(&b).unwrap().file_keys.len(), 2);
        assert_eq!(table.get_file_size(&a), Some(100));
        assert_eq!(table.get_file_size(&b), Some(200));
    }

    #[test]
    fn sentinel_leaves_padding_unread() {
        let mut data = header(0, 1, b"");
        record(&mut data, 1, key(0xA0), &[key(0x01)]);
        data.extend_from_slice(&[0, 0]);
        let sentinel_end = data.len() as u64;
        data.extend_from_slice(&[0; 4]);

        let mut cursor = Cursor::new(&data[..]);
        let header: EncodingHeader = cursor.read_be().unwrap();
        cursor
            .seek(SeekFrom::Current(i64::from(header.string_block_size) + 32))
            .unwrap();
        let mut table = EncodingTable::default();
        assert_eq!(table.parse_run(&mut cursor).unwrap(), 1);
        assert_eq!(cursor.position(), sentinel_end);
    }

    #[test]
    fn paged_runs_realign_to_page_size() {
        let mut data = header(1, 2, b"");
        let first_run = data.len();
        record(&mut data, 10, key(0xA0), &[key(0x01)]);
        data.extend_from_slice(&[0, 0]);
        data.resize(first_run + 1024, 0);
        record(&mut data, 20, key(0xB0), &[key(0x02)]);
        data.resize(first_run + 2048, 0);

        let table = EncodingTable::from_bytes(&data).unwrap();
        assert_eq!(table.len(), 2);
        let order: Vec<u8> = table.iter().map(|e| e.checksum.as_bytes()[0]).collect();
        assert_eq!(order, vec![0xA0, 0xB0]);
    }

    #[test]
    fn nonzero_page_counter_with_packed_runs() {
        let mut data = header(1, 2, b"");
        record(&mut data, 10, key(0xA0), &[key(0x01)]);
        data.extend_from_slice(&[0, 0, 0, 0]);
        record(&mut data, 20, key(0xB0), &[key(0x02)]);
        data.extend_from_slice(&[0, 0, 0, 0]);

        let table = EncodingTable::from_bytes(&data).unwrap();
        assert_eq!(table.len(), 2);
        let b = ChecksumKey::new(key(0xB0)).unwrap();
        assert_eq!(table.get_file_key(&b).unwrap().as_bytes(), &key(0x02));
        assert_eq!(table.get_file_size(&b), Some(20));
    }

    #[test]
    fn packed_runs_skip_zero_padding() {
        let mut data = header(0, 2, b"");
        record(&mut data, 10, key(0xA0), &[key(0x01)]);
        data.extend_from_slice(&[0, 0, 0, 0, 0]);
        record(&mut data, 20, key(0xB0), &[key(0x02)]);
        data.extend_from_slice(&[0, 0]);

        let table = EncodingTable::from_bytes(&data).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn duplicate_checksum_keeps_first() {
        let mut data = header(0, 1, b"");
        record(&mut data, 10, key(0xA0), &[key(0x01)]);
        record(&mut data, 99, key(0xA0), &[key(0x09)]);
        data.extend_from_slice(&[0, 0]);

        let table = EncodingTable::from_bytes(&data).unwrap();
        let a = ChecksumKey::new(key(0xA0)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get_file_key(&a).unwrap().as_bytes(), &key(0x01));
        assert_eq!(table.get_file_size(&a), Some(10));
    }

    #[test]
    fn key_count_high_byte_extends_size() {
        // 0x0201 is one key with size byte 2, not 513 keys
        let mut data = header(0, 1, b"");
        data.extend_from_slice(&0x0201u16.to_le_bytes());
        data.extend_from_slice(&5u32.to_be_bytes());
        data.extend_from_slice(&key(0xA0));
        data.extend_from_slice(&key(0x01));
        data.extend_from_slice(&[0, 0]);

        let table = EncodingTable::from_bytes(&data).unwrap();
        let a = ChecksumKey::new(key(0xA0)).unwrap();
        assert_eq!(table.get_entry(&a).unwrap().file_keys.len(), 1);
        assert_eq!(table.get_file_size(&a), Some((2u64 << 32) | 5));
    }

    #[test]
    fn truncated_inputs_are_malformed() {
        let mut data = header(0, 1, b"");
        record(&mut data, 10, key(0xA0), &[key(0x01), key(0x02)]);
        data.truncate(data.len() - 4);
        assert!(matches!(
            EncodingTable::from_bytes(&data),
            Err(StorageError::MalformedContainer { table: "encoding", .. })
        ));

        let data = header(0, 3, b"");
        assert!(matches!(
            EncodingTable::from_bytes(&data[..data.len() - 1]),
            Err(StorageError::MalformedContainer { .. })
        ));

        assert!(EncodingTable::from_bytes(b"EN").is_err());
    }
}
