//! Bounded file access operations
//!
//! Each operation opens the file, performs bounded sequential or
//! reverse-chunked reads, and releases the handle before returning. Nothing is
//! shared between calls, so concurrent requests need no coordination.

use std::collections::VecDeque;
use std::fmt;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::encoding::{Encoding, LineDecoder, clip_chars};
use crate::error::AccessError;
use crate::handle::OpenFile;
use crate::limits::{OutputBudget, ReadLimits};
use crate::lines::{LineIndex, LineScanner, LineSpan};
use crate::observer::{NoopObserver, ReadObserver};
use crate::response::{
    ByteData, BytesMeta, Chunk, ChunkMeta, CountMethod, Envelope, FileStat, LineChunkMeta,
    LinesMeta, ReadResult, StatMeta,
};

/// Lines returned by head and tail when the caller does not say.
pub const DEFAULT_N_LINES: u64 = 10;
/// Default window for [`FileAccess::read_chunk`].
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 64 * 1024;
/// Default lines per chunk for [`FileAccess::read_line_chunk`].
pub const DEFAULT_LINES_PER_CHUNK: u64 = 1000;

/// Optional knobs for [`FileAccess::read_lines`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadLinesOptions {
    /// Per-line character cap, bounded by the configured limit
    pub max_line_length: Option<usize>,
    /// Keep counting to EOF so `total_lines` is always reported
    pub count_total: bool,
}

/// Entry point for every read operation.
///
/// Cheap to clone; holds only the limits and the observer.
#[derive(Clone)]
pub struct FileAccess {
    limits: ReadLimits,
    observer: Arc<dyn ReadObserver>,
}

impl fmt::Debug for FileAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileAccess")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Default for FileAccess {
    fn default() -> Self {
        Self::new(ReadLimits::default())
    }
}

/// Lines gathered by a forward scan.
struct Collected {
    lines: Vec<String>,
    index: LineIndex,
    truncated: bool,
    hit_eof: bool,
    total_lines: Option<u64>,
    encoding: Encoding,
}

impl FileAccess {
    /// Create an accessor with the given limits and no instrumentation.
    pub fn new(limits: ReadLimits) -> Self {
        Self {
            limits,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Replace the observer notified about every handle.
    pub fn with_observer(mut self, observer: Arc<dyn ReadObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The configured limits.
    pub fn limits(&self) -> &ReadLimits {
        &self.limits
    }

    pub(crate) fn open(&self, path: &Path) -> Result<OpenFile, AccessError> {
        OpenFile::open(path, self.observer.clone())
    }

    /// Size, line count and encoding of a file.
    ///
    /// Files at or below `exact_count_threshold_bytes` are counted exactly.
    /// Larger files have their count extrapolated from a `sample_bytes`
    /// prefix and reported with `line_count_exact = false`.
    pub fn stat(&self, path: impl AsRef<Path>) -> Result<Envelope<FileStat, StatMeta>, AccessError> {
        let path = path.as_ref();
        let mut file = self.open(path)?;
        let size = file.size();
        let encoding = file.encoding()?;

        let (line_count, method, scanned) = if encoding.is_binary() {
            (0, CountMethod::Skipped, 0)
        } else if size <= self.limits.exact_count_threshold_bytes
            || self.limits.sample_bytes as u64 >= size
        {
            file.seek_to(0)?;
            let reader = BufReader::with_capacity(self.block_size(), &mut file);
            let mut scanner = LineScanner::new(reader, 1, 0, 0);
            let count = scanner
                .count_remaining()
                .map_err(|e| AccessError::from_io(e, path))?;
            (count, CountMethod::Exact, size)
        } else {
            let sample = file.read_at(0, self.limits.sample_bytes)?;
            (
                estimate_lines(&sample, size),
                CountMethod::Sampled,
                sample.len() as u64,
            )
        };
        tracing::debug!(path = %path.display(), size, line_count, ?method, "stat");

        Ok(Envelope {
            data: FileStat {
                path: path.display().to_string(),
                size_bytes: size,
                line_count,
                line_count_exact: method == CountMethod::Exact,
                encoding,
                is_binary: encoding.is_binary(),
            },
            truncated: false,
            metadata: StatMeta {
                count_method: method,
                bytes_scanned: scanned,
            },
        })
    }

    /// Lines `start_line..=end_line` (1-based).
    ///
    /// A range reaching past EOF returns the available lines and the true
    /// line count. Scanning stops once `end_line` is collected unless
    /// `count_total` asks for the rest of the file to be counted.
    pub fn read_lines(
        &self,
        path: impl AsRef<Path>,
        start_line: i64,
        end_line: i64,
        options: ReadLinesOptions,
    ) -> Result<ReadResult, AccessError> {
        let path = path.as_ref();
        if start_line < 1 {
            return Err(AccessError::InvalidRange(format!(
                "start_line must be >= 1, got {}",
                start_line
            )));
        }
        if end_line < start_line {
            return Err(AccessError::InvalidRange(format!(
                "end_line ({}) must be >= start_line ({})",
                end_line, start_line
            )));
        }
        let (first, last) = (start_line as u64, end_line as u64);

        let mut file = self.open(path)?;
        file.require_text()?;
        let collected = self.collect(&mut file, first, last, options)?;
        Ok(self.lines_envelope(&file, collected))
    }

    /// First `n_lines` lines.
    pub fn head(&self, path: impl AsRef<Path>, n_lines: i64) -> Result<ReadResult, AccessError> {
        let path = path.as_ref();
        let n = validate_n_lines(n_lines)?;
        let mut file = self.open(path)?;
        file.require_text()?;
        let collected = self.collect(&mut file, 1, n, ReadLinesOptions::default())?;
        Ok(self.lines_envelope(&file, collected))
    }

    /// Last `n_lines` lines, located with a reverse chunked scan.
    ///
    /// Blocks of `block_size` bytes are read backward from EOF until enough
    /// line boundaries are found; only that suffix is then read forward.
    /// Line numbers are reported only when the scan reached the start of file.
    pub fn tail(&self, path: impl AsRef<Path>, n_lines: i64) -> Result<ReadResult, AccessError> {
        let path = path.as_ref();
        let requested = validate_n_lines(n_lines)?;
        let max_lines = self.limits.max_lines.max(1) as u64;
        let n = requested.min(max_lines);

        let mut file = self.open(path)?;
        file.require_text()?;
        let (offset, reached_start) = self.find_tail_start(&mut file, n)?;
        tracing::debug!(path = %path.display(), n, offset, reached_start, "tail start located");

        file.seek_to(offset)?;
        let reader = BufReader::with_capacity(self.block_size(), &mut file);
        let mut scanner = LineScanner::new(reader, 1, offset, self.limits.line_byte_cap());
        let mut decoder = LineDecoder::new(self.limits.encoding_policy);
        let mut kept: VecDeque<(LineSpan, String)> = VecDeque::new();
        let mut used = 0usize;
        let mut truncated = requested > n && !reached_start;

        while let Some(raw) = scanner.next_line().map_err(|e| AccessError::from_io(e, path))? {
            let number = reached_start.then_some(raw.span.number);
            let mut text = decoder.decode(number, &raw.bytes, raw.clipped)?;
            truncated |= clip_chars(&mut text, self.limits.max_line_length) || raw.clipped;
            used += text.len();
            kept.push_back((raw.span, text));
            // Over the output budget the oldest lines go first
            while used > self.limits.max_output_bytes {
                let Some((_, dropped)) = kept.pop_front() else {
                    break;
                };
                used -= dropped.len();
                truncated = true;
            }
        }
        drop(scanner);

        let mut index = LineIndex::new();
        let mut lines = Vec::with_capacity(kept.len());
        for (span, text) in kept {
            index.push(span);
            lines.push(text);
        }
        let range = index.byte_range();
        let numbered = |span: Option<&LineSpan>| span.filter(|_| reached_start).map(|s| s.number);

        Ok(Envelope {
            truncated,
            metadata: LinesMeta {
                path: path.display().to_string(),
                size_bytes: file.size(),
                encoding: decoder.encoding(),
                first_line: numbered(index.first()),
                last_line: numbered(index.last()),
                lines_returned: lines.len(),
                total_lines: reached_start.then(|| index.last().map_or(0, |s| s.number)),
                byte_start: range.map(|r| r.0),
                byte_end: range.map(|r| r.1),
            },
            data: lines,
        })
    }

    /// `length` bytes from `start_offset`, clamped to the file size and to
    /// `max_bytes`. No encoding assumptions are made.
    pub fn read_bytes(
        &self,
        path: impl AsRef<Path>,
        start_offset: i64,
        length: i64,
    ) -> Result<Envelope<ByteData, BytesMeta>, AccessError> {
        let path = path.as_ref();
        if start_offset < 0 {
            return Err(AccessError::InvalidRange(format!(
                "start_offset must be >= 0, got {}",
                start_offset
            )));
        }
        if length <= 0 {
            return Err(AccessError::InvalidRange(format!(
                "length must be > 0, got {}",
                length
            )));
        }
        let (offset, length) = (start_offset as u64, length as u64);

        let mut file = self.open(path)?;
        let size = file.size();
        let available = size.saturating_sub(offset).min(length);
        let max_bytes = self.limits.max_bytes as u64;
        let take = available.min(max_bytes);
        let data = file.read_at(offset, take as usize)?;

        Ok(Envelope {
            truncated: available > max_bytes,
            metadata: BytesMeta {
                path: path.display().to_string(),
                size_bytes: size,
                start_offset: offset,
                requested_length: length,
                returned_length: data.len() as u64,
            },
            data: ByteData(data),
        })
    }

    /// Fixed-size window `chunk_index` of the file.
    ///
    /// Concatenating every chunk in order reproduces the file, and exactly
    /// the final chunk is flagged `is_last_chunk`. An empty file has a
    /// single empty chunk.
    pub fn read_chunk(
        &self,
        path: impl AsRef<Path>,
        chunk_index: i64,
        chunk_size_bytes: i64,
    ) -> Result<Envelope<Chunk, ChunkMeta>, AccessError> {
        let path = path.as_ref();
        if chunk_index < 0 {
            return Err(AccessError::InvalidRange(format!(
                "chunk_index must be >= 0, got {}",
                chunk_index
            )));
        }
        if chunk_size_bytes < 1 {
            return Err(AccessError::InvalidRange(format!(
                "chunk_size_bytes must be >= 1, got {}",
                chunk_size_bytes
            )));
        }
        if chunk_size_bytes as u64 > self.limits.max_bytes as u64 {
            return Err(AccessError::InvalidRange(format!(
                "chunk_size_bytes ({}) exceeds the limit of {}",
                chunk_size_bytes, self.limits.max_bytes
            )));
        }
        let (index, chunk_size) = (chunk_index as u64, chunk_size_bytes as u64);

        let mut file = self.open(path)?;
        let size = file.size();
        let total_chunks = size.div_ceil(chunk_size).max(1);
        if index >= total_chunks {
            return Err(AccessError::InvalidRange(format!(
                "chunk_index ({}) is past the last chunk ({})",
                index,
                total_chunks - 1
            )));
        }
        let offset = index * chunk_size;
        let data = file.read_at(offset, chunk_size as usize)?;
        let is_last_chunk = offset + data.len() as u64 >= size;

        Ok(Envelope {
            data: Chunk {
                bytes: ByteData(data),
                is_last_chunk,
            },
            truncated: false,
            metadata: ChunkMeta {
                path: path.display().to_string(),
                size_bytes: size,
                chunk_index: index,
                chunk_size_bytes: chunk_size,
                offset,
                total_chunks,
            },
        })
    }

    /// Line-oriented chunk: lines `index * n + 1 ..= (index + 1) * n`.
    pub fn read_line_chunk(
        &self,
        path: impl AsRef<Path>,
        chunk_index: i64,
        lines_per_chunk: i64,
    ) -> Result<Envelope<Vec<String>, LineChunkMeta>, AccessError> {
        let path = path.as_ref();
        if chunk_index < 0 {
            return Err(AccessError::InvalidRange(format!(
                "chunk_index must be >= 0, got {}",
                chunk_index
            )));
        }
        if lines_per_chunk < 1 {
            return Err(AccessError::InvalidRange(format!(
                "lines_per_chunk must be >= 1, got {}",
                lines_per_chunk
            )));
        }
        let (index, per_chunk) = (chunk_index as u64, lines_per_chunk as u64);
        let first = index
            .checked_mul(per_chunk)
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| AccessError::InvalidRange("chunk_index is too large".into()))?;
        let last = first.saturating_add(per_chunk - 1);

        let mut file = self.open(path)?;
        file.require_text()?;
        let collected = self.collect(&mut file, first, last, ReadLinesOptions::default())?;
        if collected.lines.is_empty() && index > 0 {
            return Err(AccessError::InvalidRange(format!(
                "chunk_index ({}) is past the end of the file",
                index
            )));
        }
        let has_more = !collected.hit_eof;
        let envelope = self.lines_envelope(&file, collected);

        Ok(Envelope {
            data: envelope.data,
            truncated: envelope.truncated,
            metadata: LineChunkMeta {
                lines: envelope.metadata,
                chunk_index: index,
                lines_per_chunk: per_chunk,
                has_more,
            },
        })
    }

    pub(crate) fn block_size(&self) -> usize {
        self.limits.block_size.max(1)
    }

    /// Forward scan collecting lines `first..=last`, clipped to `max_lines`.
    fn collect(
        &self,
        file: &mut OpenFile,
        first: u64,
        last: u64,
        options: ReadLinesOptions,
    ) -> Result<Collected, AccessError> {
        let path = file.path().to_path_buf();
        let io_err = |e: std::io::Error| AccessError::from_io(e, &path);
        let max_lines = self.limits.max_lines.max(1) as u64;
        let clipped_last = last.min(first.saturating_add(max_lines - 1));
        // A caller may ask for shorter lines, never longer ones
        let max_line_length = options
            .max_line_length
            .map_or(self.limits.max_line_length, |n| n.min(self.limits.max_line_length));
        let keep_cap = max_line_length.saturating_mul(4).max(1);

        file.seek_to(0)?;
        let reader = BufReader::with_capacity(self.block_size(), &mut *file);
        let mut scanner = LineScanner::new(reader, 1, 0, keep_cap);
        let mut decoder = LineDecoder::new(self.limits.encoding_policy);
        let mut budget = OutputBudget::new(self.limits.max_output_bytes);
        let mut lines = Vec::new();
        let mut index = LineIndex::new();
        let mut truncated = false;
        let mut hit_eof = false;

        while scanner.next_number() < first {
            if scanner.skip_line().map_err(io_err)?.is_none() {
                hit_eof = true;
                break;
            }
        }

        if !hit_eof {
            while scanner.next_number() <= clipped_last {
                let Some(raw) = scanner.next_line().map_err(io_err)? else {
                    hit_eof = true;
                    break;
                };
                let mut text = decoder.decode(Some(raw.span.number), &raw.bytes, raw.clipped)?;
                let cut = clip_chars(&mut text, max_line_length) || raw.clipped;
                if !budget.admit(text.len()) {
                    truncated = true;
                    break;
                }
                truncated |= cut;
                index.push(raw.span);
                lines.push(text);
            }
        }

        if !hit_eof && !budget.was_exhausted() {
            hit_eof = scanner.at_eof().map_err(io_err)?;
            if clipped_last < last && !hit_eof {
                truncated = true;
            }
        }

        let total_lines = if hit_eof {
            Some(scanner.next_number() - 1)
        } else if options.count_total {
            let seen = scanner.next_number() - 1;
            Some(seen + scanner.count_remaining().map_err(io_err)?)
        } else {
            None
        };

        Ok(Collected {
            lines,
            index,
            truncated,
            hit_eof,
            total_lines,
            encoding: decoder.encoding(),
        })
    }

    fn lines_envelope(&self, file: &OpenFile, collected: Collected) -> ReadResult {
        let range = collected.index.byte_range();
        Envelope {
            truncated: collected.truncated,
            metadata: LinesMeta {
                path: file.path().display().to_string(),
                size_bytes: file.size(),
                encoding: collected.encoding,
                first_line: collected.index.first().map(|s| s.number),
                last_line: collected.index.last().map(|s| s.number),
                lines_returned: collected.lines.len(),
                total_lines: collected.total_lines,
                byte_start: range.map(|r| r.0),
                byte_end: range.map(|r| r.1),
            },
            data: collected.lines,
        }
    }

    /// Offset where the last `n` lines begin, and whether the scan had to go
    /// all the way back to the start of the file.
    fn find_tail_start(&self, file: &mut OpenFile, n: u64) -> Result<(u64, bool), AccessError> {
        let size = file.size();
        if size == 0 {
            return Ok((0, true));
        }
        let block = self.block_size() as u64;
        let mut buf = vec![0u8; block as usize];
        let mut end = size;
        let mut found = 0u64;

        while end > 0 {
            let start = end.saturating_sub(block);
            let len = (end - start) as usize;
            file.read_exact_at(start, &mut buf[..len])?;
            for i in (0..len).rev() {
                let pos = start + i as u64;
                // The file's final terminator ends the last line; it does not
                // start a new one.
                if buf[i] == b'\n' && pos != size - 1 {
                    found += 1;
                    if found == n {
                        return Ok((pos + 1, false));
                    }
                }
            }
            end = start;
        }
        Ok((0, true))
    }
}

fn validate_n_lines(n_lines: i64) -> Result<u64, AccessError> {
    if n_lines < 1 {
        return Err(AccessError::InvalidRange(format!(
            "n_lines must be >= 1, got {}",
            n_lines
        )));
    }
    Ok(n_lines as u64)
}

/// Extrapolate a file's line count from a prefix sample.
fn estimate_lines(sample: &[u8], size: u64) -> u64 {
    if sample.is_empty() {
        return 0;
    }
    let newlines = sample.iter().filter(|&&b| b == b'\n').count() as f64;
    let estimate = (newlines * size as f64 / sample.len() as f64).round() as u64;
    estimate.max(1)
}
