//! Resolving range arguments into absolute byte positions.
//!
//! Resolution happens in two phases.
//! [parse_args] turns the residual command arguments into a [RangeSpec]
//! without touching any stream.
//! [ResolveContext::resolve] then turns the spec into a concrete
//! [ResolvedRange] using the index reader and the stream lengths,
//! which are probed lazily and cached.

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{ParseError, RangeError};
use crate::index::IndexReader;
use crate::num::parse_num;

/// An offset expression, either a literal value
/// or a distance from the end of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetExpr {
    Literal(i64),
    /// `i`, `i+N` or `i-N`, relative to the input length.
    FromInputLen(i64),
    /// `o`, `o+N` or `o-N`, relative to the initial output length.
    FromOutputLen(i64),
}

/// A reference into the offset index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRef {
    /// `:` or `*` without a position, consuming the next entry in sequence.
    Next,
    /// An explicit zero-based position, read by random access.
    At(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartSpec {
    /// No START argument, the first token was the END spec or absent.
    Omitted,
    /// `-`, copy from the current input position without seeking.
    Current,
    Offset(OffsetExpr),
    Index(IndexRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndSpec {
    /// Copy until the input is exhausted.
    Open,
    Offset(OffsetExpr),
    Index(IndexRef),
    /// `+LENGTH`, so end = start + LENGTH.
    Length(OffsetExpr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `^N`, the range between two adjacent index entries.
    IndexRange(i64),
    Explicit {
        start: StartSpec,
        end: EndSpec,
        slice: Option<i64>,
    },
}

/// An absolute `[start, end)` byte range, `end = None` meaning
/// "copy until the input is exhausted".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: i64,
    pub end: Option<i64>,
    /// Seek the input to `start` before copying.
    /// When unset the copy engine reads and discards bytes up to `start`.
    pub seek_start: bool,
}

impl ResolvedRange {
    /// The number of bytes the range demands, or `None` when unbounded.
    pub fn len(&self) -> Option<i64> {
        self.end.map(|end| end - self.start)
    }
}

/// Parses an offset expression: a literal number or an `i`/`o`
/// placeholder with an optional signed adjustment.
pub fn parse_offset(token: &str) -> Result<OffsetExpr, RangeError> {
    match token.as_bytes().first() {
        Some(b'i') | Some(b'o') => {
            let rest = &token[1..];
            let delta = if rest.is_empty() {
                0
            } else {
                match rest.as_bytes()[0] {
                    b'+' => parse_num(&rest[1..])?,
                    b'-' => -parse_num(&rest[1..])?,
                    sign => return Err(RangeError::BadSign(sign as char)),
                }
            };
            if token.starts_with('i') {
                Ok(OffsetExpr::FromInputLen(delta))
            } else {
                Ok(OffsetExpr::FromOutputLen(delta))
            }
        }
        _ => Ok(OffsetExpr::Literal(parse_num(token)?)),
    }
}

fn parse_index_ref(rest: &str) -> Result<IndexRef, ParseError> {
    if rest.is_empty() {
        Ok(IndexRef::Next)
    } else {
        parse_num(rest).map(IndexRef::At)
    }
}

fn strip_index_prefix(token: &str) -> Option<&str> {
    token
        .strip_prefix(':')
        .or_else(|| token.strip_prefix('*'))
}

/// Parses the residual `START [END|+LENGTH] [SLICE]` or `^N` arguments.
pub fn parse_args<S: AsRef<str>>(args: &[S]) -> Result<RangeSpec, RangeError> {
    let tokens: Vec<&str> = args.iter().map(AsRef::as_ref).collect();

    if let Some(first) = tokens.first() {
        if let Some(rest) = first.strip_prefix('^') {
            if let Some(extra) = tokens.get(1) {
                return Err(RangeError::SuperfluousArgument(extra.to_string()));
            }
            return Ok(RangeSpec::IndexRange(parse_num(rest)?));
        }
    }

    let mut next = 0;
    let start = match tokens.first() {
        None => StartSpec::Omitted,
        // A leading `+LENGTH` token is the END spec.
        Some(token) if token.starts_with('+') => StartSpec::Omitted,
        Some(&token) => {
            next = 1;
            if token == "-" {
                StartSpec::Current
            } else if let Some(rest) = strip_index_prefix(token) {
                StartSpec::Index(parse_index_ref(rest)?)
            } else {
                StartSpec::Offset(parse_offset(token)?)
            }
        }
    };

    let mut end = EndSpec::Open;
    if let Some(&token) = tokens.get(next) {
        if token != "-" {
            end = if let Some(rest) = token.strip_prefix('+') {
                EndSpec::Length(parse_offset(rest)?)
            } else if let Some(rest) = strip_index_prefix(token) {
                EndSpec::Index(parse_index_ref(rest)?)
            } else {
                EndSpec::Offset(parse_offset(token)?)
            };
        }
        next += 1;
    }

    // A third argument selects a slice, which is only meaningful
    // when END gave a length and START was omitted.
    let mut slice = None;
    if let Some(&token) = tokens.get(next) {
        if start == StartSpec::Omitted && matches!(end, EndSpec::Length(_)) {
            slice = Some(parse_num(token)?);
            next += 1;
        }
    }

    if let Some(extra) = tokens.get(next) {
        return Err(RangeError::SuperfluousArgument(extra.to_string()));
    }

    Ok(RangeSpec::Explicit { start, end, slice })
}

/// Streams and cached lengths needed to resolve a [RangeSpec].
///
/// Stream lengths are probed at most once by seeking to the end
/// and restoring the cursor.
pub struct ResolveContext<'a, I, O, X> {
    input: &'a mut I,
    output: &'a mut O,
    index: &'a mut IndexReader<X>,
    index_base: u64,
    input_len: Option<i64>,
    output_len: Option<i64>,
}

impl<'a, I, O, X> ResolveContext<'a, I, O, X> {
    pub fn new(input: &'a mut I, output: &'a mut O, index: &'a mut IndexReader<X>) -> Self {
        Self {
            input,
            output,
            index,
            index_base: 0,
            input_len: None,
            output_len: None,
        }
    }

    /// Base offset within the index stream for positional entry reads.
    pub fn with_index_base(mut self, base: u64) -> Self {
        self.index_base = base;
        self
    }

    /// Overrides the cached output length, e.g. after truncating the output.
    pub fn set_output_len(&mut self, len: i64) {
        self.output_len = Some(len);
    }
}

impl<I, O, X> ResolveContext<'_, I, O, X>
where
    I: Seek,
    O: Seek,
    X: Read + Seek,
{
    /// Resolves a parsed spec into absolute positions and validates it.
    pub fn resolve(&mut self, spec: &RangeSpec) -> Result<ResolvedRange, RangeError> {
        let range = match *spec {
            RangeSpec::IndexRange(position) => self.resolve_index_range(position)?,
            RangeSpec::Explicit { start, end, slice } => {
                self.resolve_explicit(start, end, slice)?
            }
        };

        if range.start < 0 {
            return Err(RangeError::NegativeStart(range.start));
        }
        match range.end {
            Some(end) if end < range.start => Err(RangeError::InvalidRange {
                start: range.start,
                end,
            }),
            _ => Ok(range),
        }
    }

    fn resolve_index_range(&mut self, position: i64) -> Result<ResolvedRange, RangeError> {
        let start = if position > 0 {
            self.index
                .read_at(self.index_base, position - 1)?
                .ok_or(RangeError::EntryPastEnd(position - 1))?
        } else {
            // Position zero is the range from the beginning of the input.
            0
        };
        // A missing entry means the last range, running to the end of input.
        let end = self.index.read_at(self.index_base, position)?;
        Ok(ResolvedRange {
            start,
            end,
            seek_start: true,
        })
    }

    fn resolve_explicit(
        &mut self,
        start: StartSpec,
        end: EndSpec,
        slice: Option<i64>,
    ) -> Result<ResolvedRange, RangeError> {
        let mut resolved_start = 0;
        match start {
            StartSpec::Omitted | StartSpec::Current => (),
            StartSpec::Offset(expr) => resolved_start = self.offset(expr)?,
            StartSpec::Index(entry) => resolved_start = self.index_value(entry)?,
        }

        let mut resolved_end = match end {
            EndSpec::Open => None,
            EndSpec::Offset(expr) => Some(self.offset(expr)?),
            EndSpec::Index(entry) => Some(self.index_value(entry)?),
            EndSpec::Length(expr) => Some(resolved_start + self.offset(expr)?),
        };

        let mut seek_start = !matches!(start, StartSpec::Omitted | StartSpec::Current);
        if let Some(n) = slice {
            // START was omitted, so the resolved end is the slice length.
            let length = resolved_end.unwrap_or(0);
            resolved_start = n * length + self.index.bias();
            resolved_end = Some(resolved_start + length);
            seek_start = true;
        }

        Ok(ResolvedRange {
            start: resolved_start,
            end: resolved_end,
            seek_start,
        })
    }

    /// Resolves a standalone offset expression,
    /// probing stream lengths as needed.
    pub fn offset(&mut self, expr: OffsetExpr) -> Result<i64, RangeError> {
        match expr {
            OffsetExpr::Literal(value) => Ok(value),
            OffsetExpr::FromInputLen(delta) => Ok(self.input_len()? + delta),
            OffsetExpr::FromOutputLen(delta) => Ok(self.output_len()? + delta),
        }
    }

    fn index_value(&mut self, entry: IndexRef) -> Result<i64, RangeError> {
        match entry {
            IndexRef::Next => self
                .index
                .read_next()?
                .ok_or(RangeError::IndexExhausted),
            IndexRef::At(position) => self
                .index
                .read_at(self.index_base, position)?
                .ok_or(RangeError::EntryPastEnd(position)),
        }
    }

    fn input_len(&mut self) -> Result<i64, RangeError> {
        if let Some(len) = self.input_len {
            return Ok(len);
        }
        let len = stream_len(self.input).map_err(|source| RangeError::StreamLen {
            stream: "input",
            source,
        })? as i64;
        self.input_len = Some(len);
        Ok(len)
    }

    fn output_len(&mut self) -> Result<i64, RangeError> {
        if let Some(len) = self.output_len {
            return Ok(len);
        }
        let len = stream_len(self.output).map_err(|source| RangeError::StreamLen {
            stream: "output",
            source,
        })? as i64;
        self.output_len = Some(len);
        Ok(len)
    }
}

fn stream_len<S: Seek>(stream: &mut S) -> io::Result<u64> {
    let saved_pos = stream.stream_position()?;
    let len = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(saved_pos))?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use binrw::Endian;

    fn index_le(values: &[i64]) -> IndexReader<Cursor<Vec<u8>>> {
        let mut data = Vec::new();
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        IndexReader::new(Cursor::new(data)).with_endian(Endian::Little)
    }

    fn resolve(
        args: &[&str],
        input_len: usize,
        output_len: usize,
        index: &mut IndexReader<Cursor<Vec<u8>>>,
    ) -> Result<ResolvedRange, RangeError> {
        let mut input = Cursor::new(vec![0u8; input_len]);
        let mut output = Cursor::new(vec![0u8; output_len]);
        let spec = parse_args(args)?;
        ResolveContext::new(&mut input, &mut output, index).resolve(&spec)
    }

    #[test]
    fn parse_explicit_forms() {
        assert_eq!(
            RangeSpec::Explicit {
                start: StartSpec::Offset(OffsetExpr::Literal(100)),
                end: EndSpec::Offset(OffsetExpr::Literal(200)),
                slice: None,
            },
            parse_args(&["100", "200"]).unwrap()
        );
        assert_eq!(
            RangeSpec::Explicit {
                start: StartSpec::Current,
                end: EndSpec::Length(OffsetExpr::Literal(1024)),
                slice: None,
            },
            parse_args(&["-", "+1K"]).unwrap()
        );
        assert_eq!(
            RangeSpec::Explicit {
                start: StartSpec::Index(IndexRef::At(4)),
                end: EndSpec::Index(IndexRef::Next),
                slice: None,
            },
            parse_args(&[":4", "*"]).unwrap()
        );
        assert_eq!(
            RangeSpec::Explicit {
                start: StartSpec::Offset(OffsetExpr::FromInputLen(-10)),
                end: EndSpec::Offset(OffsetExpr::FromOutputLen(2)),
                slice: None,
            },
            parse_args(&["i-10", "o+2"]).unwrap()
        );
        assert_eq!(
            RangeSpec::Explicit {
                start: StartSpec::Omitted,
                end: EndSpec::Open,
                slice: None,
            },
            parse_args::<&str>(&[]).unwrap()
        );
    }

    #[test]
    fn parse_slice_form() {
        assert_eq!(
            RangeSpec::Explicit {
                start: StartSpec::Omitted,
                end: EndSpec::Length(OffsetExpr::Literal(512)),
                slice: Some(3),
            },
            parse_args(&["+512", "3"]).unwrap()
        );
    }

    #[test]
    fn parse_index_range_form() {
        assert_eq!(RangeSpec::IndexRange(2), parse_args(&["^2"]).unwrap());
        assert!(matches!(
            parse_args(&["^1", "5"]),
            Err(RangeError::SuperfluousArgument(_))
        ));
    }

    #[test]
    fn parse_superfluous_argument() {
        // A third argument is only valid in slice form.
        assert!(matches!(
            parse_args(&["100", "200", "300"]),
            Err(RangeError::SuperfluousArgument(_))
        ));
        assert!(matches!(
            parse_args(&["100", "+50", "2"]),
            Err(RangeError::SuperfluousArgument(_))
        ));
    }

    #[test]
    fn parse_bad_sign() {
        assert!(matches!(parse_offset("i*5"), Err(RangeError::BadSign('*'))));
    }

    #[test]
    fn resolve_literals() {
        let mut index = index_le(&[]);
        let range = resolve(&["100", "200"], 1000, 0, &mut index).unwrap();
        assert_eq!(100, range.start);
        assert_eq!(Some(200), range.end);
        assert!(range.seek_start);
    }

    #[test]
    fn resolve_length_form() {
        let mut index = index_le(&[]);
        let range = resolve(&["100", "+50"], 1000, 0, &mut index).unwrap();
        assert_eq!(100, range.start);
        assert_eq!(Some(150), range.end);
    }

    #[test]
    fn resolve_relative_to_stream_len() {
        let mut index = index_le(&[]);
        let range = resolve(&["i-10", "i"], 1000, 0, &mut index).unwrap();
        assert_eq!(990, range.start);
        assert_eq!(Some(1000), range.end);

        let range = resolve(&["0", "o+5"], 1000, 100, &mut index).unwrap();
        assert_eq!(Some(105), range.end);
    }

    #[test]
    fn resolve_index_refs() {
        let mut index = index_le(&[10, 20, 30]);
        let range = resolve(&[":0", ":2"], 1000, 0, &mut index).unwrap();
        assert_eq!(10, range.start);
        assert_eq!(Some(30), range.end);
    }

    #[test]
    fn resolve_sequential_index_refs() {
        let mut index = index_le(&[10, 20, 30]);
        let range = resolve(&[":", "*"], 1000, 0, &mut index).unwrap();
        assert_eq!(10, range.start);
        assert_eq!(Some(20), range.end);
    }

    #[test]
    fn resolve_index_ref_past_end() {
        let mut index = index_le(&[10]);
        assert!(matches!(
            resolve(&[":5"], 1000, 0, &mut index),
            Err(RangeError::EntryPastEnd(5))
        ));
    }

    #[test]
    fn resolve_index_range() {
        let mut index = index_le(&[10, 20, 30]);
        let range = resolve(&["^1"], 1000, 0, &mut index).unwrap();
        assert_eq!(10, range.start);
        assert_eq!(Some(20), range.end);
    }

    #[test]
    fn resolve_index_range_first() {
        // `^0` always starts at the beginning of the input.
        let mut index = index_le(&[10, 20, 30]);
        let range = resolve(&["^0"], 1000, 0, &mut index).unwrap();
        assert_eq!(0, range.start);
        assert_eq!(Some(10), range.end);
    }

    #[test]
    fn resolve_index_range_last_is_unbounded() {
        let mut index = index_le(&[10, 20, 30]);
        let range = resolve(&["^3"], 1000, 0, &mut index).unwrap();
        assert_eq!(30, range.start);
        assert_eq!(None, range.end);
    }

    #[test]
    fn resolve_slice() {
        let mut index = index_le(&[]);
        let range = resolve(&["+512", "3"], 10000, 0, &mut index).unwrap();
        assert_eq!(1536, range.start);
        assert_eq!(Some(2048), range.end);
        assert!(range.seek_start);
    }

    #[test]
    fn resolve_slice_with_bias() {
        // The bias is applied once, to the slice start only.
        let mut index = index_le(&[]).with_bias(5);
        let range = resolve(&["+512", "3"], 10000, 0, &mut index).unwrap();
        assert_eq!(1541, range.start);
        assert_eq!(Some(2053), range.end);
    }

    #[test]
    fn resolve_invalid_range() {
        let mut index = index_le(&[]);
        assert!(matches!(
            resolve(&["200", "100"], 1000, 0, &mut index),
            Err(RangeError::InvalidRange { start: 200, end: 100 })
        ));
        assert!(matches!(
            resolve(&["-5"], 1000, 0, &mut index),
            Err(RangeError::NegativeStart(-5))
        ));
    }

    #[test]
    fn resolve_seek_start() {
        let mut index = index_le(&[]);
        assert!(!resolve(&["-"], 1000, 0, &mut index).unwrap().seek_start);
        assert!(!resolve(&["+100"], 1000, 0, &mut index).unwrap().seek_start);
        assert!(!resolve(&[], 1000, 0, &mut index).unwrap().seek_start);
        assert!(resolve(&["50"], 1000, 0, &mut index).unwrap().seek_start);
    }

    #[test]
    fn resolve_index_base() {
        let mut input = Cursor::new(vec![0u8; 1000]);
        let mut output = Cursor::new(Vec::new());
        let mut index = index_le(&[99, 10, 20]);
        let spec = parse_args(&["^1"]).unwrap();
        let range = ResolveContext::new(&mut input, &mut output, &mut index)
            .with_index_base(8)
            .resolve(&spec)
            .unwrap();
        assert_eq!(10, range.start);
        assert_eq!(Some(20), range.end);
    }
}
