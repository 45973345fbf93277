//! Composite reader over ordered byte ranges

use crate::{Result, StorageError};
use bytes::Bytes;
use std::io::{self, Read, Seek, SeekFrom};

/// One byte range of a composite stream: `length` bytes of `source`
/// starting at `skip`.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Backing bytes
    pub source: Bytes,
    /// Offset of the range within `source`
    pub skip: usize,
    /// Length of the range
    pub length: usize,
}

impl Segment {
    /// Create a segment, checking the range lies within `source`.
    pub fn new(source: Bytes, skip: usize, length: usize) -> Result<Self> {
        let end = skip.checked_add(length).ok_or_else(|| {
            StorageError::InvalidArgument(format!("segment range {skip}+{length} overflows"))
        })?;
        if end > source.len() {
            return Err(StorageError::InvalidArgument(format!(
                "segment range {skip}..{end} exceeds source of {} bytes",
                source.len()
            )));
        }
        Ok(Self {
            source,
            skip,
            length,
        })
    }

    /// Segment covering all of `source`.
    pub fn whole(source: Bytes) -> Self {
        let length = source.len();
        Self {
            source,
            skip: 0,
            length,
        }
    }

    /// The addressed range, clamped to `source`.
    fn bytes(&self) -> Bytes {
        let end = self.skip.saturating_add(self.length).min(self.source.len());
        self.source.slice(self.skip.min(end)..end)
    }
}

/// `Read + Seek` view presenting several segments as one contiguous stream.
///
/// Positions are logical: position 0 is the first byte of the first
/// segment, and the stream ends after the last byte of the last segment.
#[derive(Debug, Clone)]
pub struct SegmentedReader {
    segments: Vec<Bytes>,
    /// Logical start offset of each segment
    starts: Vec<u64>,
    total: u64,
    pos: u64,
}

/// Reader over a single data block, as returned by
/// [`DataShard::get_block`](crate::DataShard::get_block).
pub type BlockReader = SegmentedReader;

impl SegmentedReader {
    /// Build a reader over `segments` in order. Empty segments are dropped.
    pub fn new(segments: impl IntoIterator<Item = Segment>) -> Self {
        let mut parts = Vec::new();
        let mut starts = Vec::new();
        let mut total = 0u64;
        for segment in segments {
            let bytes = segment.bytes();
            if bytes.is_empty() {
                continue;
            }
            starts.push(total);
            total += bytes.len() as u64;
            parts.push(bytes);
        }
        Self {
            segments: parts,
            starts,
            total,
            pos: 0,
        }
    }

    /// Single-segment reader over `bytes`.
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self::new([Segment::whole(bytes)])
    }

    /// Total logical length.
    pub fn len(&self) -> u64 {
        self.total
    }

    /// Whether the stream has no bytes.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Number of non-empty segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Contiguous copy of the whole stream, independent of the cursor.
    ///
    /// Zero-copy when the stream has a single segment.
    pub fn into_bytes(self) -> Bytes {
        match self.segments.len() {
            0 => Bytes::new(),
            1 => self.segments.into_iter().next().unwrap_or_default(),
            _ => Bytes::from(self.to_vec()),
        }
    }

    /// Owned copy of the whole stream, independent of the cursor.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.segments.iter().map(Bytes::len).sum());
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out
    }

    /// Index of the segment containing logical position `pos`.
    fn locate(&self, pos: u64) -> Option<usize> {
        if pos >= self.total {
            return None;
        }
        // starts is sorted ascending and starts[0] == 0
        Some(self.starts.partition_point(|&start| start <= pos) - 1)
    }
}

impl Read for SegmentedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            let Some(idx) = self.locate(self.pos) else {
                break;
            };
            let segment = &self.segments[idx];
            let within = (self.pos - self.starts[idx]) as usize;
            let available = &segment[within..];
            let n = available.len().min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&available[..n]);
            written += n;
            self.pos += n as u64;
        }
        Ok(written)
    }
}

impl Seek for SegmentedReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::End(delta) => i128::from(self.total) + i128::from(delta),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
        };
        if target < 0 || target > i128::from(self.total) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "seek to {target} outside segmented stream of {} bytes",
                    self.total
                ),
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}
