//! Root table: filename hash -> content checksums
//!
//! The table is a bare sequence of fixed-width records with no count or
//! header. Two widths exist:
//!
//! | Width | Layout |
//! |-------|--------|
//! | 32    | hash (u64 LE), checksum (16), flags (u64 LE) |
//! | 28    | hash (u64 LE), checksum (16), flags (u32 LE) |
//!
//! The width is inferred from the total length, preferring 32 when both
//! divide it.

use crate::key::ChecksumKey;
use crate::reader::TypedRead;
use crate::{Result, StorageError};
use binrw::BinRead;
use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read, Seek};
use tracing::{debug, info, warn};

const TABLE: &str = "root";

/// Record width with 64-bit flags.
pub const WIDE_RECORD: u64 = 32;

/// Record width with 32-bit flags.
pub const NARROW_RECORD: u64 = 28;

#[derive(Debug, BinRead)]
#[br(little, import(wide_flags: bool))]
struct RawRootRecord {
    name_hash: u64,
    checksum: [u8; 16],
    #[br(if(wide_flags))]
    flags_wide: u64,
    #[br(if(!wide_flags))]
    flags_narrow: u32,
}

/// Locale and content flags of a root entry.
///
/// The low 32 bits are a locale bit mask, the high 32 bits content flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RootFlags(pub u64);

impl RootFlags {
    /// Locale bit mask
    pub const fn locale(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// Content flags
    pub const fn content(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for RootFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "locale={:08x} content={:08x}", self.locale(), self.content())
    }
}

/// One root record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootEntry {
    /// Filename hash
    pub name_hash: u64,
    /// Content checksum of this variant
    pub checksum: ChecksumKey,
    /// Locale and content flags
    pub flags: RootFlags,
}

impl RootEntry {
    /// Whether the entry applies to any locale in `mask`.
    pub const fn matches_locale(&self, mask: u32) -> bool {
        self.flags.locale() & mask != 0
    }
}

/// Parsed root table.
#[derive(Debug, Default)]
pub struct RootTable {
    entries: Vec<RootEntry>,
    /// Entry indices per hash, in file order
    by_hash: HashMap<u64, Vec<usize>>,
    /// Distinct hashes in first-seen order
    hashes: Vec<u64>,
}

impl RootTable {
    /// Parse a root table from a byte slice.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse(&mut Cursor::new(data))
    }

    /// Parse records from the cursor to the end of the stream.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let total = reader.remaining()?;
        let width = record_width(total)?;
        let count = total / width;
        debug!("Root table: {total} bytes, {width}-byte records, {count} records");

        let mut table = Self::default();
        for _ in 0..count {
            let raw = RawRootRecord::read_options(reader, binrw::Endian::Little, (width == WIDE_RECORD,))
                .map_err(|e| StorageError::from_binrw(TABLE, &e))?;
            table.push(RootEntry {
                name_hash: raw.name_hash,
                checksum: ChecksumKey::new(raw.checksum)?,
                flags: RootFlags(raw.flags_wide | u64::from(raw.flags_narrow)),
            });
        }

        info!(
            "Loaded root table with {} entries for {} filename hashes",
            table.entries.len(),
            table.hashes.len()
        );
        Ok(table)
    }

    fn push(&mut self, entry: RootEntry) {
        let idx = self.entries.len();
        let slots = self.by_hash.entry(entry.name_hash).or_default();
        if slots.is_empty() {
            self.hashes.push(entry.name_hash);
        }
        slots.push(idx);
        self.entries.push(entry);
    }

    /// Entries for a filename hash, in file order.
    pub fn entries_for(&self, name_hash: u64) -> impl Iterator<Item = &RootEntry> + '_ {
        self.by_hash
            .get(&name_hash)
            .into_iter()
            .flatten()
            .filter_map(|&idx| self.entries.get(idx))
    }

    /// Content checksums for a filename hash, in file order.
    ///
    /// Locale and content variants are all returned; filtering is up to the
    /// caller.
    pub fn get_content_checksums(&self, name_hash: u64) -> Vec<ChecksumKey> {
        self.entries_for(name_hash)
            .map(|e| e.checksum.clone())
            .collect()
    }

    /// Distinct filename hashes in first-seen order.
    pub fn get_hashes(&self) -> impl Iterator<Item = u64> + '_ {
        self.hashes.iter().copied()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All records in file order.
    pub fn iter(&self) -> impl Iterator<Item = &RootEntry> + '_ {
        self.entries.iter()
    }
}

fn record_width(total: u64) -> Result<u64> {
    if ambiguous_width(total) {
        warn!(
            "Root table length {total} fits both {WIDE_RECORD}- and {NARROW_RECORD}-byte records; assuming {WIDE_RECORD}"
        );
    }
    if total % WIDE_RECORD == 0 {
        Ok(WIDE_RECORD)
    } else if total % NARROW_RECORD == 0 {
        Ok(NARROW_RECORD)
    } else {
        Err(StorageError::malformed(
            TABLE,
            format!("length {total} is not a multiple of {WIDE_RECORD} or {NARROW_RECORD}"),
        ))
    }
}

/// Whether a non-empty table length divides by both record widths.
fn ambiguous_width(total: u64) -> bool {
    total != 0 && total % WIDE_RECORD == 0 && total % NARROW_RECORD == 0
}
