//! Line scanning over buffered readers

use std::io::{self, BufRead};

use serde::{Deserialize, Serialize};

/// Byte range of one line, terminator included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    /// 1-based line number
    pub number: u64,
    /// Offset of the first byte
    pub start: u64,
    /// Offset one past the last byte (after the `\n`, if any)
    pub end: u64,
}

/// Line number to byte range mapping for the lines touched by one request.
///
/// Filled lazily by the scanner as lines are collected; spans are contiguous.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    spans: Vec<LineSpan>,
}

impl LineIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next line's span.
    pub fn push(&mut self, span: LineSpan) {
        debug_assert!(self.spans.last().is_none_or(|last| last.end == span.start));
        self.spans.push(span);
    }

    /// Span of `number`, if it was indexed.
    pub fn get(&self, number: u64) -> Option<&LineSpan> {
        let first = self.spans.first()?.number;
        let idx = usize::try_from(number.checked_sub(first)?).ok()?;
        self.spans.get(idx)
    }

    /// Span of the first indexed line.
    pub fn first(&self) -> Option<&LineSpan> {
        self.spans.first()
    }

    /// Span of the last indexed line.
    pub fn last(&self) -> Option<&LineSpan> {
        self.spans.last()
    }

    /// Number of indexed lines.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether no lines were indexed.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Byte range covering every indexed line.
    pub fn byte_range(&self) -> Option<(u64, u64)> {
        Some((self.spans.first()?.start, self.spans.last()?.end))
    }
}

/// One line as read from disk, without its `\n`.
#[derive(Debug)]
pub(crate) struct RawLine {
    pub(crate) span: LineSpan,
    pub(crate) bytes: Vec<u8>,
    /// Bytes past the keep cap were dropped
    pub(crate) clipped: bool,
}

/// Forward line scanner that never holds more than `keep_cap` bytes of a line.
#[derive(Debug)]
pub(crate) struct LineScanner<R> {
    reader: R,
    next_number: u64,
    offset: u64,
    keep_cap: usize,
}

impl<R: BufRead> LineScanner<R> {
    /// Scan from `reader`, which is positioned at byte `offset`, the start of
    /// line `first_number`.
    pub(crate) fn new(reader: R, first_number: u64, offset: u64, keep_cap: usize) -> Self {
        Self {
            reader,
            next_number: first_number,
            offset,
            keep_cap,
        }
    }

    /// Number the next returned line will carry.
    pub(crate) fn next_number(&self) -> u64 {
        self.next_number
    }

    pub(crate) fn next_line(&mut self) -> io::Result<Option<RawLine>> {
        self.scan(true)
    }

    /// Advance past one line without keeping its bytes.
    pub(crate) fn skip_line(&mut self) -> io::Result<Option<LineSpan>> {
        Ok(self.scan(false)?.map(|line| line.span))
    }

    pub(crate) fn at_eof(&mut self) -> io::Result<bool> {
        Ok(self.reader.fill_buf()?.is_empty())
    }

    /// Count the lines left before EOF, consuming them.
    pub(crate) fn count_remaining(&mut self) -> io::Result<u64> {
        let mut count = 0u64;
        let mut last = None;
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                break;
            }
            count += buf.iter().filter(|&&b| b == b'\n').count() as u64;
            last = buf.last().copied();
            let len = buf.len();
            self.reader.consume(len);
            self.offset += len as u64;
        }
        if last.is_some_and(|b| b != b'\n') {
            count += 1;
        }
        self.next_number += count;
        Ok(count)
    }

    fn scan(&mut self, keep: bool) -> io::Result<Option<RawLine>> {
        let start = self.offset;
        let mut bytes = Vec::new();
        let mut clipped = false;
        let mut consumed = false;

        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                break;
            }
            let (len, done) = match buf.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (buf.len(), false),
            };
            if keep {
                let content = if done { &buf[..len - 1] } else { &buf[..len] };
                let room = self.keep_cap.saturating_sub(bytes.len());
                if content.len() > room {
                    clipped = true;
                    bytes.extend_from_slice(&content[..room]);
                } else {
                    bytes.extend_from_slice(content);
                }
            }
            self.reader.consume(len);
            self.offset += len as u64;
            consumed = true;
            if done {
                break;
            }
        }

        if !consumed {
            return Ok(None);
        }
        let span = LineSpan {
            number: self.next_number,
            start,
            end: self.offset,
        };
        self.next_number += 1;
        Ok(Some(RawLine {
            span,
            bytes,
            clipped,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::{BufReader, Cursor};

    use super::*;

    fn scanner(data: &[u8], cap: usize) -> LineScanner<BufReader<Cursor<Vec<u8>>>> {
        // Tiny buffer so lines straddle refills
        let reader = BufReader::with_capacity(3, Cursor::new(data.to_vec()));
        LineScanner::new(reader, 1, 0, cap)
    }

    #[test]
    fn test_lines_and_spans() {
        let mut s = scanner(b"ab\ncdef\n\nxyz", 100);

        let l1 = s.next_line().unwrap().unwrap();
        assert_eq!(l1.bytes, b"ab");
        assert_eq!(l1.span, LineSpan { number: 1, start: 0, end: 3 });

        let l2 = s.next_line().unwrap().unwrap();
        assert_eq!(l2.bytes, b"cdef");
        assert_eq!((l2.span.start, l2.span.end), (3, 8));

        let l3 = s.next_line().unwrap().unwrap();
        assert!(l3.bytes.is_empty());

        let l4 = s.next_line().unwrap().unwrap();
        assert_eq!(l4.bytes, b"xyz");
        assert_eq!(l4.span.number, 4);
        assert_eq!(l4.span.end, 12);

        assert!(s.next_line().unwrap().is_none());
        assert!(s.at_eof().unwrap());
    }

    #[test]
    fn test_keep_cap_clips_long_line() {
        let mut s = scanner(b"0123456789\nnext\n", 4);
        let line = s.next_line().unwrap().unwrap();
        assert_eq!(line.bytes, b"0123");
        assert!(line.clipped);
        // The rest of the long line is skipped, not returned as a new line
        let next = s.next_line().unwrap().unwrap();
        assert_eq!(next.bytes, b"next");
        assert_eq!(next.span.number, 2);
    }

    #[test]
    fn test_skip_then_count_remaining() {
        let mut s = scanner(b"a\nb\nc\nd", 10);
        assert_eq!(s.skip_line().unwrap().unwrap().number, 1);
        assert_eq!(s.count_remaining().unwrap(), 3);
        assert_eq!(s.next_number(), 5);
    }

    #[test]
    fn test_count_remaining_with_trailing_newline() {
        let mut s = scanner(b"a\nb\n", 10);
        assert_eq!(s.count_remaining().unwrap(), 2);
    }

    #[test]
    fn test_empty_input_has_no_lines() {
        let mut s = scanner(b"", 10);
        assert!(s.next_line().unwrap().is_none());
        assert_eq!(s.count_remaining().unwrap(), 0);
    }

    #[test]
    fn test_line_index_lookup() {
        let mut index = LineIndex::new();
        index.push(LineSpan { number: 5, start: 40, end: 50 });
        index.push(LineSpan { number: 6, start: 50, end: 55 });

        assert_eq!(index.get(6).unwrap().start, 50);
        assert!(index.get(4).is_none());
        assert!(index.get(7).is_none());
        assert_eq!(index.byte_range(), Some((40, 55)));
        assert_eq!(index.len(), 2);
    }
}
