//! Typed binary reads over seekable byte streams
//!
//! [`TypedRead`] adds endianness-explicit primitive reads to any
//! `Read + Seek`. [`SegmentedReader`] stitches several byte ranges into one
//! addressable stream.

mod segmented;

pub use segmented::{BlockReader, Segment, SegmentedReader};

use crate::key::ChecksumKey;
use crate::{Result, StorageError};
use binrw::{BinRead, Endian};
use std::io::{self, Read, Seek, SeekFrom};

/// Endianness-aware primitive reads.
///
/// Every method advances the cursor past the bytes it consumed. Short reads
/// surface as `io::ErrorKind::UnexpectedEof` wrapped in [`StorageError::Io`].
pub trait TypedRead: Read + Seek {
    /// Current cursor position.
    fn position(&mut self) -> Result<u64> {
        Ok(self.stream_position()?)
    }

    /// Bytes between the cursor and the end of the stream.
    fn remaining(&mut self) -> Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(end.saturating_sub(pos))
    }

    /// Read one byte.
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Read a `u16` in the given byte order.
    fn read_u16(&mut self, endian: Endian) -> Result<u16> {
        read_primitive(self, endian)
    }

    /// Read a `u32` in the given byte order.
    fn read_u32(&mut self, endian: Endian) -> Result<u32> {
        read_primitive(self, endian)
    }

    /// Read a `u64` in the given byte order.
    fn read_u64(&mut self, endian: Endian) -> Result<u64> {
        read_primitive(self, endian)
    }

    /// Read bytes up to a NUL or end of stream. The NUL is consumed but not
    /// returned. Invalid UTF-8 is replaced.
    fn read_cstring(&mut self) -> Result<String> {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.read(&mut byte)? {
                0 => break,
                _ if byte[0] == 0 => break,
                _ => out.push(byte[0]),
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Read exactly `len` bytes.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read a `len`-byte checksum key.
    fn read_key(&mut self, len: usize) -> Result<ChecksumKey> {
        ChecksumKey::new(self.read_bytes(len)?)
    }

    /// Advance the cursor by `len` bytes.
    ///
    /// Fails with `UnexpectedEof` if fewer than `len` bytes remain; the
    /// cursor is left unchanged in that case.
    fn skip(&mut self, len: u64) -> Result<()> {
        if self.remaining()? < len {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("cannot skip {len} bytes past end of stream"),
            )));
        }
        self.seek(SeekFrom::Current(signed(len)?))?;
        Ok(())
    }
}

impl<R: Read + Seek + ?Sized> TypedRead for R {}

fn read_primitive<T, R>(reader: &mut R, endian: Endian) -> Result<T>
where
    T: for<'a> BinRead<Args<'a> = ()>,
    R: Read + Seek + ?Sized,
{
    let mut reader = reader;
    T::read_options(&mut reader, endian, ()).map_err(|e| match e {
        binrw::Error::Io(io) => StorageError::Io(io),
        other => StorageError::Io(io::Error::new(io::ErrorKind::InvalidData, other.to_string())),
    })
}

pub(crate) fn signed(len: u64) -> Result<i64> {
    i64::try_from(len)
        .map_err(|_| StorageError::InvalidArgument(format!("seek distance {len} out of range")))
}
