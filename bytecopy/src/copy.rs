//! The chunked copy engine.
//!
//! Copies the bytes of a resolved range from an input to an output
//! through a bounded buffer, one blocking read and at most one
//! blocking write per cycle.

use std::fs::File;
use std::io::{self, Cursor, Read, Write};

use log::warn;

use crate::error::CopyError;
use crate::range::ResolvedRange;

pub const BUFFER_DEFAULT: usize = 512 * 1024;

/// How a storage flush is requested after each write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Flush file data only, like `fdatasync`.
    Data,
    /// Flush data and metadata, like `fsync`.
    Full,
}

#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Buffer capacity per read/write cycle.
    pub buffer_len: usize,
    /// Write after every read instead of accumulating a full buffer.
    pub flush_each_cycle: bool,
    /// Issue a zero-length write when a flush has no bytes to write.
    pub write_empty: bool,
    /// Do not treat a short transfer of a finite range as an error.
    pub ignore_premature_end: bool,
    /// Request a storage flush after each successful write.
    pub sync: Option<SyncMode>,
    /// Reduced capacity for the first cycle so later reads land
    /// on a block boundary.
    pub first_cycle_len: Option<usize>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            buffer_len: BUFFER_DEFAULT,
            flush_each_cycle: true,
            write_empty: false,
            ignore_premature_end: false,
            sync: None,
            first_cycle_len: None,
        }
    }
}

/// Counters for one transfer, sampled by the progress callback
/// after every cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub reads: u64,
    pub writes: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// An output stream that can flush written data to storage.
pub trait Sink: Write {
    fn sync_storage(&mut self, mode: SyncMode) -> io::Result<()>;
}

impl Sink for File {
    fn sync_storage(&mut self, mode: SyncMode) -> io::Result<()> {
        match mode {
            SyncMode::Data => self.sync_data(),
            SyncMode::Full => self.sync_all(),
        }
    }
}

impl Sink for Vec<u8> {
    fn sync_storage(&mut self, _mode: SyncMode) -> io::Result<()> {
        Ok(())
    }
}

impl<T> Sink for Cursor<T>
where
    Cursor<T>: Write,
{
    fn sync_storage(&mut self, _mode: SyncMode) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn sync_storage(&mut self, mode: SyncMode) -> io::Result<()> {
        (**self).sync_storage(mode)
    }
}

/// Copies the bytes of `range` from `input` to `output`.
///
/// `initial_pos` is the input position the first read starts from,
/// `range.start` when the caller already seeked the input and usually 0
/// otherwise. Bytes read before `range.start` are discarded,
/// which implements skipping on non-seekable inputs.
///
/// `progress` is called with the running counters after every cycle.
/// Returns the final counters, or the error that terminated the loop.
/// When a finite range could not be fully copied and
/// [CopyOptions::ignore_premature_end] is unset,
/// the transfer fails with [CopyError::PrematureEnd] after the loop.
pub fn copy_range<R, W, F>(
    input: &mut R,
    output: &mut W,
    range: &ResolvedRange,
    initial_pos: i64,
    options: &CopyOptions,
    mut progress: F,
) -> Result<Counters, CopyError>
where
    R: Read,
    W: Sink,
    F: FnMut(&Counters),
{
    let mut counters = Counters::default();
    let mut pos = initial_pos;

    // Shrink the buffer when the whole remaining range fits,
    // so reads never request bytes past the end.
    let mut buffer_len = options.buffer_len.max(1);
    if let Some(end) = range.end {
        let total = (end - pos).max(1) as usize;
        if total < buffer_len {
            buffer_len = total;
        }
    }
    let mut block_len = match options.first_cycle_len {
        Some(len) if len > 0 => len.min(buffer_len),
        _ => buffer_len,
    };

    let mut buffer = vec![0u8; buffer_len];
    let mut buffer_pos = 0;

    loop {
        let capacity = match range.end {
            Some(end) if pos + buffer_len as i64 > end => (end - pos) as usize,
            _ => block_len,
        };
        let request = capacity.saturating_sub(buffer_pos);

        let read = input
            .read(&mut buffer[buffer_pos..buffer_pos + request])
            .map_err(CopyError::Read)?;
        counters.reads += 1;
        counters.bytes_in += read as u64;
        buffer_pos += read;

        // Flush on every cycle unless buffering, but always once the
        // buffer is full or the input is exhausted.
        if options.flush_each_cycle || read == 0 || read == request {
            let previous = pos;
            pos += buffer_pos as i64;
            if pos >= range.start {
                // Bytes accumulated before the range start are discarded.
                let skip = (range.start - previous).max(0) as usize;
                let request = buffer_pos - skip;
                let written = if request > 0 || options.write_empty {
                    let written = output
                        .write(&buffer[skip..buffer_pos])
                        .map_err(CopyError::Write)?;
                    counters.writes += 1;
                    if let Some(mode) = options.sync {
                        if let Err(e) = output.sync_storage(mode) {
                            warn!("sync failed: {e}");
                        }
                    }
                    written
                } else {
                    0
                };
                if written != request {
                    return Err(CopyError::WriteUnderrun { written, requested: request });
                }
                counters.bytes_out += written as u64;
            }
            buffer_pos = 0;
            block_len = buffer_len;
        }

        progress(&counters);

        if read == 0 {
            break;
        }
        if let Some(end) = range.end {
            if pos >= end {
                break;
            }
        }
    }

    if let Some(expected) = range.len() {
        let expected = expected as u64;
        if !options.ignore_premature_end && counters.bytes_out != expected {
            return Err(CopyError::PrematureEnd {
                written: counters.bytes_out,
                expected,
            });
        }
    }

    Ok(counters)
}
