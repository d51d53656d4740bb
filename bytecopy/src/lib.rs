//! A library for copying byte ranges between streams.
//!
//! Range boundaries may be given directly, computed relative to a
//! stream length or looked up in an index, an external array of
//! 64-bit byte offsets. The transfer itself runs through a bounded
//! buffer with optional write coalescing and works for both seekable
//! files and pipes.
//!
//! # Getting Started
//! Range arguments are parsed with [range::parse_args], resolved
//! against the open streams with [range::ResolveContext] and copied
//! with [copy::copy_range].
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::io::Cursor;
//!
//! use bytecopy::copy::{copy_range, CopyOptions};
//! use bytecopy::index::IndexReader;
//! use bytecopy::range::{parse_args, ResolveContext};
//!
//! let mut input = Cursor::new(b"hello world".to_vec());
//! let mut output = Cursor::new(Vec::new());
//! let mut index = IndexReader::new(Cursor::new(Vec::new()));
//!
//! // Copy bytes [6, 11) of the input.
//! let spec = parse_args(&["6", "11"])?;
//! let range = ResolveContext::new(&mut input, &mut output, &mut index).resolve(&spec)?;
//!
//! bytecopy::seek_to(&mut input, range.start as u64)?;
//! copy_range(
//!     &mut input,
//!     &mut output,
//!     &range,
//!     range.start,
//!     &CopyOptions::default(),
//!     |_| (),
//! )?;
//! assert_eq!(b"world", &output.get_ref()[..]);
//! # Ok(())
//! # }
//! ```
use std::io::{Seek, SeekFrom};

use error::SeekError;

pub mod copy;
pub mod error;
pub mod index;
pub mod num;
pub mod range;

/// Seeks to an absolute position and checks that the stream landed there.
pub fn seek_to<S: Seek>(stream: &mut S, pos: u64) -> Result<(), SeekError> {
    let actual = stream
        .seek(SeekFrom::Start(pos))
        .map_err(|source| SeekError::Io { pos, source })?;
    if actual != pos {
        return Err(SeekError::Position { pos, actual });
    }
    Ok(())
}
