//! Tome CLI - bounded reads of large files from the shell
//!
//! Usage:
//!   tome stat big.log
//!   tome tail big.log -n 50
//!   tome search big.log ERROR --context-lines 2
//!
//! Every subcommand prints a JSON envelope to stdout. Failures print the error
//! envelope and exit with the error's code. Command-line usage errors exit
//! with 64 and unusable configuration with 78, neither of which an error kind
//! uses.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tome::{
    AccessError, DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_LINES_PER_CHUNK, DEFAULT_MAX_MATCHES,
    DEFAULT_N_LINES, EncodingPolicy, ErrorEnvelope, FileAccess, ReadLimits, ReadLinesOptions,
    SearchRequest,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tome - inspect files too large to read in one go
#[derive(Parser, Debug)]
#[command(name = "tome")]
#[command(about = "Bounded, truncation-aware reads of large files")]
struct Args {
    /// JSON file with read limits; missing fields keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fail on invalid UTF-8 instead of substituting replacement characters
    #[arg(long, global = true)]
    strict_encoding: bool,

    /// Print single-line JSON
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Size, line count and encoding
    Stat {
        /// File to inspect
        path: PathBuf,
    },
    /// Lines START..=END (1-based)
    ReadLines {
        /// File to read
        path: PathBuf,
        /// First line
        #[arg(allow_negative_numbers = true)]
        start_line: i64,
        /// Last line (inclusive)
        #[arg(allow_negative_numbers = true)]
        end_line: i64,
        /// Per-line character cap
        #[arg(long)]
        max_line_length: Option<usize>,
        /// Count to the end of the file so the total is reported
        #[arg(long)]
        count_total: bool,
    },
    /// First lines of a file
    Head {
        /// File to read
        path: PathBuf,
        /// Number of lines
        #[arg(short = 'n', long, default_value_t = DEFAULT_N_LINES as i64, allow_negative_numbers = true)]
        n_lines: i64,
    },
    /// Last lines of a file
    Tail {
        /// File to read
        path: PathBuf,
        /// Number of lines
        #[arg(short = 'n', long, default_value_t = DEFAULT_N_LINES as i64, allow_negative_numbers = true)]
        n_lines: i64,
    },
    /// Raw bytes from an offset
    ReadBytes {
        /// File to read
        path: PathBuf,
        /// Byte offset
        #[arg(allow_negative_numbers = true)]
        start_offset: i64,
        /// Number of bytes
        #[arg(allow_negative_numbers = true)]
        length: i64,
    },
    /// Lines matching a substring or regular expression
    Search {
        /// File to search
        path: PathBuf,
        /// Substring, or regex with --regex
        pattern: String,
        /// Lines of context around each match
        #[arg(short = 'C', long, default_value_t = 0, allow_negative_numbers = true)]
        context_lines: i64,
        /// Stop after this many matches
        #[arg(short = 'm', long, default_value_t = DEFAULT_MAX_MATCHES as i64, allow_negative_numbers = true)]
        max_matches: i64,
        /// Treat the pattern as a regular expression
        #[arg(long = "regex")]
        use_regex: bool,
        /// Match case exactly
        #[arg(long)]
        case_sensitive: bool,
    },
    /// One fixed-size byte window
    ReadChunk {
        /// File to read
        path: PathBuf,
        /// Zero-based chunk index
        #[arg(allow_negative_numbers = true)]
        chunk_index: i64,
        /// Chunk size in bytes
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE_BYTES as i64, allow_negative_numbers = true)]
        chunk_size_bytes: i64,
    },
    /// One block of lines
    ReadLineChunk {
        /// File to read
        path: PathBuf,
        /// Zero-based chunk index
        #[arg(allow_negative_numbers = true)]
        chunk_index: i64,
        /// Lines per chunk
        #[arg(long, default_value_t = DEFAULT_LINES_PER_CHUNK as i64, allow_negative_numbers = true)]
        lines_per_chunk: i64,
    },
    /// deer.social URL to AT URI
    ConvertUrl {
        /// Profile or post URL
        url: String,
    },
}

fn load_limits(args: &Args) -> anyhow::Result<ReadLimits> {
    let mut limits = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ReadLimits::from_json(&json)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => ReadLimits::default(),
    };
    if args.strict_encoding {
        limits.encoding_policy = EncodingPolicy::Strict;
    }
    Ok(limits)
}

fn to_json<T: Serialize>(value: &T, compact: bool) -> serde_json::Result<String> {
    if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
}

/// Run one subcommand and serialize its envelope.
fn run(access: &FileAccess, command: Cmd, compact: bool) -> Result<String, AccessError> {
    let json = match command {
        Cmd::Stat { path } => to_json(&access.stat(&path)?, compact),
        Cmd::ReadLines {
            path,
            start_line,
            end_line,
            max_line_length,
            count_total,
        } => {
            let options = ReadLinesOptions {
                max_line_length,
                count_total,
            };
            to_json(&access.read_lines(&path, start_line, end_line, options)?, compact)
        }
        Cmd::Head { path, n_lines } => to_json(&access.head(&path, n_lines)?, compact),
        Cmd::Tail { path, n_lines } => to_json(&access.tail(&path, n_lines)?, compact),
        Cmd::ReadBytes {
            path,
            start_offset,
            length,
        } => to_json(&access.read_bytes(&path, start_offset, length)?, compact),
        Cmd::Search {
            path,
            pattern,
            context_lines,
            max_matches,
            use_regex,
            case_sensitive,
        } => {
            let request = SearchRequest {
                pattern,
                context_lines,
                max_matches,
                use_regex,
                ignore_case: !case_sensitive,
            };
            to_json(&access.search(&path, &request)?, compact)
        }
        Cmd::ReadChunk {
            path,
            chunk_index,
            chunk_size_bytes,
        } => to_json(
            &access.read_chunk(&path, chunk_index, chunk_size_bytes)?,
            compact,
        ),
        Cmd::ReadLineChunk {
            path,
            chunk_index,
            lines_per_chunk,
        } => to_json(
            &access.read_line_chunk(&path, chunk_index, lines_per_chunk)?,
            compact,
        ),
        Cmd::ConvertUrl { url } => to_json(&tome::convert_deer_url(&url)?, compact),
    };
    json.map_err(|e| AccessError::Io(e.into()))
}

/// Exit code for malformed command lines (sysexits `EX_USAGE`)
const EXIT_USAGE: u8 = 64;
/// Exit code for an unreadable or invalid `--config` (sysexits `EX_CONFIG`)
const EXIT_CONFIG: u8 = 78;

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries only the JSON result
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not failures
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    let limits = match load_limits(&args) {
        Ok(limits) => limits,
        Err(e) => {
            eprintln!("tome: {:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let access = FileAccess::new(limits);
    tracing::debug!(command = ?args.command, "running");

    let (result, code) = match run(&access, args.command, args.compact) {
        Ok(json) => (Ok(json), ExitCode::SUCCESS),
        Err(err) => {
            tracing::debug!(error = %err, "command failed");
            let code = ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1));
            (to_json(&ErrorEnvelope::from(&err), args.compact), code)
        }
    };
    match result {
        Ok(json) => {
            println!("{}", json);
            code
        }
        Err(e) => {
            eprintln!("tome: failed to encode output: {}", e);
            ExitCode::from(1)
        }
    }
}
