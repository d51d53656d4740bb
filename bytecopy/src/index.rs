//! Reading byte offsets from an index, an external array of 64-bit integers.

use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom};

use binrw::{BinReaderExt, Endian};

use crate::error::IndexError;

const ENTRY_SIZE: u64 = 8;

/// Reads 8-byte entries from an offset index stream.
///
/// Entries are decoded with the configured byte order
/// and the additive bias is applied to every value.
pub struct IndexReader<R> {
    stream: R,
    endian: Endian,
    bias: i64,
}

impl<R> IndexReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            endian: Endian::NATIVE,
            bias: 0,
        }
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn with_bias(mut self, bias: i64) -> Self {
        self.bias = bias;
        self
    }

    /// The additive bias applied to every entry.
    pub fn bias(&self) -> i64 {
        self.bias
    }
}

impl<R: Read> IndexReader<R> {
    /// Reads the entry at the current cursor, advancing past it.
    ///
    /// Returns `Ok(None)` on a clean end of the stream.
    /// A partial entry is a [IndexError::TornRead].
    pub fn read_next(&mut self) -> Result<Option<i64>, IndexError> {
        let mut entry = [0u8; ENTRY_SIZE as usize];
        let mut filled = 0;
        while filled < entry.len() {
            match self.stream.read(&mut entry[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(IndexError::TornRead(filled)),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => return Err(e.into()),
            }
        }
        let value: i64 = Cursor::new(entry).read_type(self.endian)?;
        Ok(Some(value.wrapping_add(self.bias)))
    }
}

impl<R: Read + Seek> IndexReader<R> {
    /// Reads the entry at `base + position * 8` without disturbing the cursor.
    ///
    /// Repeated reads of the same position yield the same value.
    pub fn read_at(&mut self, base: u64, position: i64) -> Result<Option<i64>, IndexError> {
        let offset = position
            .checked_mul(ENTRY_SIZE as i64)
            .and_then(|o| base.checked_add_signed(o))
            .ok_or_else(|| {
                IndexError::Io(ErrorKind::InvalidInput.into())
            })?;

        let saved_pos = self.stream.stream_position()?;
        self.stream.seek(SeekFrom::Start(offset))?;
        let value = self.read_next();
        self.stream.seek(SeekFrom::Start(saved_pos))?;
        value
    }
}
