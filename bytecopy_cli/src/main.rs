use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::os::unix::io::FromRawFd;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use binrw::Endian;
use bytecopy::copy::{copy_range, Counters, CopyOptions, SyncMode, BUFFER_DEFAULT};
use bytecopy::error::{ParseError, RangeError};
use bytecopy::index::IndexReader;
use bytecopy::num::parse_num;
use bytecopy::range::{parse_args, parse_offset, ResolveContext};
use bytecopy::seek_to;
use clap::Parser;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;

const FD_IDX_DEFAULT: i32 = 3;

/// Copy bytes from input, beginning at START up to END
/// or for LENGTH or till the end of input, to output.
#[derive(Parser)]
#[command(name = "bytecopy", version, about, long_about = None)]
struct Cli {
    /// Adjust buffer size for initial cycle by OFFSET (number or r: input, w: output)
    #[arg(short = 'a', value_name = "OFFSET")]
    align: Option<String>,

    /// Buffer up to SIZE bytes per read/write cycle (default: 512K)
    #[arg(short = 'b', value_name = "SIZE")]
    buffer: Option<String>,

    /// Force buffering, do not write after partial read
    #[arg(short = 'B')]
    force_buffer: bool,

    /// Write final buffer even if empty
    #[arg(short = 'e')]
    write_empty: bool,

    /// Do not consider premature end of input an error
    #[arg(short = 'E')]
    ignore_end: bool,

    /// Open FILE for input, instead of reading from standard input (overrides -I)
    #[arg(short = 'i', value_name = "FILE")]
    input: Option<PathBuf>,

    /// Read from the specified file descriptor (default: standard input)
    #[arg(short = 'I', value_name = "FD")]
    input_fd: Option<i32>,

    /// Print each progress report on a new line
    #[arg(short = 'n')]
    progress_newline: bool,

    /// Open FILE for output, instead of writing to standard output (overrides -O)
    #[arg(short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write to the specified file descriptor (default: standard output)
    #[arg(short = 'O', value_name = "FD")]
    output_fd: Option<i32>,

    /// Print progress but no status messages
    #[arg(short = 'p')]
    progress_only: bool,

    /// Use POS as offset for reading index values
    #[arg(short = 'P', value_name = "POS")]
    index_pos: Option<String>,

    /// Don't print progress, only status messages to standard error
    #[arg(short = 'q')]
    quiet: bool,

    /// Print no status, only errors to standard error
    #[arg(short = 'Q')]
    errors_only: bool,

    /// Skip input (read and discard) up to START instead of seeking
    #[arg(short = 's')]
    skip: bool,

    /// Synchronize storage (flush to device) after each write
    #[arg(short = 'S')]
    sync: bool,

    /// Truncate (overwrite) output file (only works with -o)
    #[arg(short = 't')]
    truncate: bool,

    /// Truncate or extend length of output file to SIZE, before copying
    #[arg(short = 'T', value_name = "SIZE")]
    truncate_to: Option<String>,

    /// Assume little-endian byte order for index values
    #[arg(short = 'u')]
    little_endian: bool,

    /// Assume big-endian byte order for index values
    #[arg(short = 'U')]
    big_endian: bool,

    /// Seek to POS in output before writing (- for none)
    #[arg(short = 'w', value_name = "POS", allow_hyphen_values = true)]
    output_seek: Option<String>,

    /// Open FILE for reading index values (overrides -X)
    #[arg(short = 'x', value_name = "FILE")]
    index_file: Option<PathBuf>,

    /// Read index values from the specified file descriptor (default: 3)
    #[arg(short = 'X', value_name = "FD")]
    index_fd: Option<i32>,

    /// Use data synchronized write mode (only works with -o)
    #[arg(short = 'y')]
    data_sync: bool,

    /// Use fully synchronized write mode (only works with -o)
    #[arg(short = 'Y')]
    full_sync: bool,

    /// Don't seek to end of output file (alias for -w '-')
    #[arg(short = 'z')]
    no_output_seek: bool,

    /// Add OFFSET (may be negative) to index values and SLICE positions
    #[arg(short = 'Z', value_name = "OFFSET", allow_hyphen_values = true)]
    index_bias: Option<String>,

    /// START [END|+LENGTH] [SLICE], or ^N for the N-th index range
    #[arg(value_name = "RANGE", num_args = 0..=3)]
    range: Vec<String>,
}

enum OutputSeek {
    None,
    To(i64),
    End,
}

/// Prints the running counters to standard error,
/// in place unless newline mode is set.
struct Progress {
    enabled: bool,
    show_total: bool,
    newline: bool,
    total: Option<i64>,
    printed: bool,
}

impl Progress {
    fn print(&mut self, counters: &Counters) {
        if !self.enabled {
            return;
        }
        if !self.newline {
            eprint!("\r");
        }
        eprint!(
            "reads/writes: {}/{}, bytes: {} in, {} out",
            counters.reads, counters.writes, counters.bytes_in, counters.bytes_out
        );
        if let Some(total) = self.total {
            if self.show_total {
                eprint!(", {total} total");
            }
            let percent = if total == 0 {
                100.0
            } else {
                (counters.bytes_in as f64 / total as f64 * 1000.0) as i64 as f64 / 10.0
            };
            eprint!(" ({percent:.1}%)");
        }
        if self.newline {
            eprintln!();
        } else {
            eprint!(" ");
        }
        self.printed = true;
    }

    fn finish(&self) {
        if self.printed && !self.newline {
            eprintln!();
        }
    }
}

fn file_from_fd(fd: i32) -> File {
    // The descriptor was handed to this process by its parent.
    // It is only closed again when the File drops at process exit.
    unsafe { File::from_raw_fd(fd) }
}

fn describe(path: Option<&PathBuf>, fd: i32) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => match fd {
            0 => "(stdin)".to_string(),
            1 => "(stdout)".to_string(),
            2 => "(stderr)".to_string(),
            fd => format!("(#{fd})"),
        },
    }
}

fn exit_code(error: &anyhow::Error) -> u8 {
    if error.downcast_ref::<RangeError>().is_some() || error.downcast_ref::<ParseError>().is_some()
    {
        2
    } else {
        1
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.errors_only || cli.progress_only {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };
    let _ = SimpleLogger::new().with_level(level).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.output.is_none() && (cli.truncate || cli.data_sync || cli.full_sync) {
        bail!("options -t, -y and -Y can only be used in combination with -o");
    }

    let buffer_len = match &cli.buffer {
        Some(size) => {
            let size = parse_num(size)?;
            if size < 1 {
                bail!("buffer size must be >0");
            }
            size as usize
        }
        None => BUFFER_DEFAULT,
    };
    let bias = match &cli.index_bias {
        Some(offset) => parse_num(offset)?,
        None => 0,
    };
    let index_base = match &cli.index_pos {
        Some(pos) => u64::try_from(parse_num(pos)?).ok().context("index offset must be >=0")?,
        None => 0,
    };

    // Open the index first so index backed range arguments can resolve.
    let mut index = {
        let stream = match &cli.index_file {
            Some(path) => {
                info!("index: {}", path.display());
                File::open(path)
                    .with_context(|| format!("failed to open index file: {}", path.display()))?
            }
            None => file_from_fd(cli.index_fd.unwrap_or(FD_IDX_DEFAULT)),
        };
        let endian = if cli.big_endian {
            Endian::Big
        } else if cli.little_endian {
            Endian::Little
        } else {
            Endian::NATIVE
        };
        IndexReader::new(stream).with_endian(endian).with_bias(bias)
    };

    let mut input = match &cli.input {
        Some(path) => File::open(path)
            .with_context(|| format!("failed to open input file: {}", path.display()))?,
        None => file_from_fd(cli.input_fd.unwrap_or(0)),
    };
    info!(
        "reading: {}",
        describe(cli.input.as_ref(), cli.input_fd.unwrap_or(0))
    );

    let mut output = match &cli.output {
        Some(path) => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(cli.truncate)
            .open(path)
            .with_context(|| format!("failed to open output file: {}", path.display()))?,
        None => file_from_fd(cli.output_fd.unwrap_or(1)),
    };
    info!(
        "writing: {}",
        describe(cli.output.as_ref(), cli.output_fd.unwrap_or(1))
    );

    // Resolve the range and the output placement before any stream
    // is repositioned.
    let spec = parse_args(&cli.range)?;
    let (range, truncate_len, output_seek) = {
        let mut ctx = ResolveContext::new(&mut input, &mut output, &mut index)
            .with_index_base(index_base);
        let range = ctx.resolve(&spec)?;
        let truncate_len = match &cli.truncate_to {
            Some(size) => {
                let len = ctx.offset(parse_offset(size)?)?;
                // The new length applies to later `o` placeholders.
                ctx.set_output_len(len);
                Some(len)
            }
            None => None,
        };
        let output_seek = match cli.output_seek.as_deref() {
            Some("-") => OutputSeek::None,
            Some(pos) => OutputSeek::To(ctx.offset(parse_offset(pos)?)?),
            None if cli.no_output_seek => OutputSeek::None,
            // Default for an output file is appending to its end.
            None if cli.output.is_some() && !cli.truncate => OutputSeek::End,
            None => OutputSeek::None,
        };
        (range, truncate_len, output_seek)
    };

    let initial_pos = if range.seek_start && !cli.skip {
        seek_to(&mut input, range.start as u64).context("input")?;
        range.start
    } else {
        0
    };

    if let Some(len) = truncate_len {
        let new_len = u64::try_from(len).ok().context("truncate length must be >=0")?;
        output
            .set_len(new_len)
            .with_context(|| format!("failed to truncate output to {len} bytes"))?;
        info!("output file truncated to {len} bytes");
    }

    let write_pos = match output_seek {
        OutputSeek::None => None,
        OutputSeek::To(pos) => {
            let pos = u64::try_from(pos).ok().context("output position must be >=0")?;
            seek_to(&mut output, pos).context("output")?;
            Some(pos as i64)
        }
        OutputSeek::End => Some(
            output
                .seek(SeekFrom::End(0))
                .context("failed to seek to end of output")? as i64,
        ),
    };

    let first_cycle_len = match cli.align.as_deref() {
        None => None,
        Some(align) => {
            let offset = if align.starts_with('r') {
                -range.start
            } else if align.starts_with('w') {
                -write_pos.unwrap_or(0)
            } else {
                parse_num(align)?
            };
            // Reduce the first cycle so later reads land on block boundaries.
            let len = buffer_len as i64;
            let block = ((offset % len) + len) % len;
            (block != 0).then_some(block as usize)
        }
    };

    let options = CopyOptions {
        buffer_len,
        flush_each_cycle: !cli.force_buffer,
        write_empty: cli.write_empty,
        ignore_premature_end: cli.ignore_end,
        sync: if cli.sync || cli.full_sync {
            Some(SyncMode::Full)
        } else if cli.data_sync {
            Some(SyncMode::Data)
        } else {
            None
        },
        first_cycle_len,
    };

    let start_desc = if range.seek_start && !cli.skip {
        range.start.to_string()
    } else if range.start > 0 {
        format!("(skipping)..{}", range.start)
    } else {
        "(initial)".to_string()
    };
    let end_desc = match range.end {
        Some(end) => end.to_string(),
        None => "(unbounded)".to_string(),
    };
    let write_desc = match write_pos {
        Some(pos) => pos.to_string(),
        None if cli.truncate => "(truncated)".to_string(),
        None => "(default)".to_string(),
    };
    info!("range: {start_desc}..{end_desc} -> {write_desc}.. at {buffer_len} bytes");

    let total = range.end.map(|end| end - initial_pos);
    let mut progress = Progress {
        enabled: cli.progress_only || !(cli.quiet || cli.errors_only),
        show_total: cli.progress_only,
        newline: cli.progress_newline,
        total,
        printed: false,
    };
    if cli.progress_only {
        progress.print(&Counters::default());
    }

    let result = copy_range(
        &mut input,
        &mut output,
        &range,
        initial_pos,
        &options,
        |counters| progress.print(counters),
    );
    progress.finish();
    let counters = result?;

    if !progress.enabled {
        info!(
            "reads/writes: {}/{}, bytes: {} in, {} out",
            counters.reads, counters.writes, counters.bytes_in, counters.bytes_out
        );
    }

    Ok(())
}
