//! Line search with context
//!
//! [`SearchIter`] is a lazy, finite sequence of matches. Each call to
//! [`FileAccess::search_iter`] starts again from the top of the file; there is
//! no cursor kept between calls.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use regex_lite::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::access::FileAccess;
use crate::encoding::{Encoding, LineDecoder, clip_chars};
use crate::error::AccessError;
use crate::handle::OpenFile;
use crate::limits::OutputBudget;
use crate::lines::LineScanner;
use crate::response::{ContextLine, Envelope, SearchMatch, SearchMeta};

/// Matches returned when the caller does not say.
pub const DEFAULT_MAX_MATCHES: usize = 100;

/// A search request
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    /// Substring, or a regular expression when `use_regex` is set
    pub pattern: String,
    /// Lines of context on each side of a match
    #[serde(default)]
    pub context_lines: i64,
    /// Stop after this many matches
    #[serde(default = "default_max_matches")]
    pub max_matches: i64,
    /// Treat `pattern` as a regular expression
    #[serde(default)]
    pub use_regex: bool,
    /// Match without regard to case
    #[serde(default = "default_ignore_case")]
    pub ignore_case: bool,
}

fn default_max_matches() -> i64 {
    DEFAULT_MAX_MATCHES as i64
}

fn default_ignore_case() -> bool {
    true
}

impl SearchRequest {
    /// A case-insensitive substring search with default limits.
    pub fn substring(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            context_lines: 0,
            max_matches: DEFAULT_MAX_MATCHES as i64,
            use_regex: false,
            ignore_case: true,
        }
    }

    /// A case-insensitive regex search with default limits.
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            use_regex: true,
            ..Self::substring(pattern)
        }
    }

    fn compile(&self) -> Result<Regex, AccessError> {
        if self.pattern.is_empty() {
            return Err(AccessError::InvalidPattern(
                "pattern must not be empty".to_string(),
            ));
        }
        let source = if self.use_regex {
            self.pattern.clone()
        } else {
            regex_lite::escape(&self.pattern)
        };
        RegexBuilder::new(&source)
            .case_insensitive(self.ignore_case)
            .build()
            .map_err(|e| AccessError::InvalidPattern(e.to_string()))
    }
}

/// Lazy iterator over the matches of one search.
///
/// Reading stops as soon as a match beyond `max_matches` is seen (or EOF),
/// once the after-context of the returned matches has been filled. It also
/// stops outright when the returned text would exceed `max_output_bytes`.
pub struct SearchIter<R> {
    scanner: LineScanner<R>,
    matcher: Regex,
    decoder: LineDecoder,
    path: PathBuf,
    context_lines: usize,
    max_matches: usize,
    max_line_length: usize,
    /// Recent lines, each with whether it was cut
    before: VecDeque<(ContextLine, bool)>,
    pending: VecDeque<SearchMatch>,
    budget: OutputBudget,
    found: usize,
    overflow: bool,
    clipped: bool,
    exhausted: bool,
    lines_scanned: u64,
}

impl<R> std::fmt::Debug for SearchIter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIter")
            .field("path", &self.path)
            .field("found", &self.found)
            .field("lines_scanned", &self.lines_scanned)
            .finish_non_exhaustive()
    }
}

impl<R: BufRead> SearchIter<R> {
    /// True once a limit cut the results: a match past `max_matches` was
    /// seen, a returned line was shortened, or the output budget ran out.
    pub fn truncated(&self) -> bool {
        self.overflow || self.clipped || self.budget.was_exhausted()
    }

    /// Lines read so far.
    pub fn lines_scanned(&self) -> u64 {
        self.lines_scanned
    }

    /// Encoding of the text produced so far.
    pub fn encoding(&self) -> Encoding {
        self.decoder.encoding()
    }

    fn advance(&mut self) -> Result<(), AccessError> {
        if self.overflow && self.pending.is_empty() {
            self.exhausted = true;
            return Ok(());
        }
        let Some(raw) = self
            .scanner
            .next_line()
            .map_err(|e| AccessError::from_io(e, &self.path))?
        else {
            self.exhausted = true;
            return Ok(());
        };
        self.lines_scanned += 1;

        let number = raw.span.number;
        let full = self.decoder.decode(Some(number), &raw.bytes, raw.clipped)?;
        let mut shown = full.clone();
        let cut = clip_chars(&mut shown, self.max_line_length) || raw.clipped;

        for open in self.pending.iter_mut() {
            if open.context_after.len() < self.context_lines {
                if !self.budget.admit(shown.len()) {
                    self.exhausted = true;
                    return Ok(());
                }
                self.clipped |= cut;
                open.context_after.push(ContextLine {
                    line_number: number,
                    text: shown.clone(),
                });
            }
        }

        if !self.overflow && self.matcher.is_match(&full) {
            if self.found == self.max_matches {
                self.overflow = true;
            } else {
                let before_len: usize = self.before.iter().map(|(c, _)| c.text.len()).sum();
                if !self.budget.admit(shown.len() + before_len) {
                    self.exhausted = true;
                    return Ok(());
                }
                self.found += 1;
                self.clipped |= cut || self.before.iter().any(|(_, c)| *c);
                self.pending.push_back(SearchMatch {
                    line_number: number,
                    line_text: shown.clone(),
                    context_before: self.before.iter().map(|(c, _)| c.clone()).collect(),
                    context_after: Vec::new(),
                });
            }
        }

        if self.context_lines > 0 {
            if self.before.len() == self.context_lines {
                self.before.pop_front();
            }
            self.before.push_back((
                ContextLine {
                    line_number: number,
                    text: shown,
                },
                cut,
            ));
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for SearchIter<R> {
    type Item = Result<SearchMatch, AccessError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(front) = self.pending.front()
                && (front.context_after.len() >= self.context_lines || self.exhausted)
            {
                return self.pending.pop_front().map(Ok);
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.advance() {
                self.exhausted = true;
                self.pending.clear();
                return Some(Err(e));
            }
        }
    }
}

impl FileAccess {
    /// Start a lazy search over `path`.
    ///
    /// `max_matches` must be at least 1 and `context_lines` at least 0.
    /// They are capped by `max_matches_cap` and `max_context_lines`.
    pub fn search_iter(
        &self,
        path: impl AsRef<Path>,
        request: &SearchRequest,
    ) -> Result<SearchIter<BufReader<OpenFile>>, AccessError> {
        let path = path.as_ref();
        if request.max_matches < 1 {
            return Err(AccessError::InvalidRange(format!(
                "max_matches must be >= 1, got {}",
                request.max_matches
            )));
        }
        if request.context_lines < 0 {
            return Err(AccessError::InvalidRange(format!(
                "context_lines must be >= 0, got {}",
                request.context_lines
            )));
        }
        let max_matches = usize::try_from(request.max_matches).unwrap_or(usize::MAX);
        let context_lines = usize::try_from(request.context_lines).unwrap_or(usize::MAX);
        let matcher = request.compile()?;
        let limits = self.limits();

        let mut file = self.open(path)?;
        file.require_text()?;
        file.seek_to(0)?;
        let reader = BufReader::with_capacity(self.block_size(), file);

        Ok(SearchIter {
            scanner: LineScanner::new(reader, 1, 0, limits.line_byte_cap()),
            matcher,
            decoder: LineDecoder::new(limits.encoding_policy),
            path: path.to_path_buf(),
            context_lines: context_lines.min(limits.max_context_lines),
            max_matches: max_matches.min(limits.max_matches_cap.max(1)),
            max_line_length: limits.max_line_length,
            before: VecDeque::new(),
            pending: VecDeque::new(),
            budget: OutputBudget::new(limits.max_output_bytes),
            found: 0,
            overflow: false,
            clipped: false,
            exhausted: false,
            lines_scanned: 0,
        })
    }

    /// Run a search to completion.
    ///
    /// `truncated` is set when the file holds more matches than the effective
    /// `max_matches`, a returned line was cut, or the output budget ran out.
    pub fn search(
        &self,
        path: impl AsRef<Path>,
        request: &SearchRequest,
    ) -> Result<Envelope<Vec<SearchMatch>, SearchMeta>, AccessError> {
        let path = path.as_ref();
        let mut iter = self.search_iter(path, request)?;
        let matches = iter.by_ref().collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            path = %path.display(),
            matches = matches.len(),
            lines_scanned = iter.lines_scanned(),
            truncated = iter.truncated(),
            "search finished"
        );

        Ok(Envelope {
            truncated: iter.truncated(),
            metadata: SearchMeta {
                path: path.display().to_string(),
                pattern: request.pattern.clone(),
                use_regex: request.use_regex,
                max_matches: iter.max_matches,
                matches_returned: matches.len(),
                lines_scanned: iter.lines_scanned(),
                encoding: iter.encoding(),
            },
            data: matches,
        })
    }
}
