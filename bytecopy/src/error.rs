use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("got empty string for number")]
    Empty,

    #[error("error parsing number {0:?}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    /// More than zero but fewer than eight bytes were available.
    #[error("index entry could not be fully read ({0} of 8 bytes)")]
    TornRead(usize),

    #[error("error decoding index entry: {0}")]
    Binrw(#[from] binrw::Error),

    #[error("error reading index: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum RangeError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("bad offset sign {0:?}")]
    BadSign(char),

    #[error("error reading index: {0}")]
    Index(#[from] IndexError),

    #[error("entry {0} is beyond the end of the index")]
    EntryPastEnd(i64),

    #[error("no further entries in the index")]
    IndexExhausted,

    #[error("failed to find end of {stream}: {source}")]
    StreamLen {
        stream: &'static str,
        source: io::Error,
    },

    #[error("invalid range ({end}<{start})")]
    InvalidRange { start: i64, end: i64 },

    #[error("invalid range start {0}")]
    NegativeStart(i64),

    #[error("superfluous argument {0:?}")]
    SuperfluousArgument(String),
}

#[derive(Debug, Error)]
pub enum SeekError {
    #[error("seeking to {pos} failed: {source}")]
    Io { pos: u64, source: io::Error },

    #[error("seeking to {pos} failed: actual position is {actual}")]
    Position { pos: u64, actual: u64 },
}

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("error reading input: {0}")]
    Read(io::Error),

    #[error("error writing output: {0}")]
    Write(io::Error),

    /// The output accepted fewer bytes than requested, e.g. a full device.
    #[error("no more space to write output ({written}<{requested})")]
    WriteUnderrun { written: usize, requested: usize },

    /// The input ended before the requested range was fully copied.
    #[error("premature end of input ({written} < {expected} bytes)")]
    PrematureEnd { written: u64, expected: u64 },
}
