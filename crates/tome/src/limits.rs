//! Configured maxima for read operations

use serde::{Deserialize, Serialize};

/// How invalid UTF-8 inside a text line is handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingPolicy {
    /// Replace undecodable sequences with U+FFFD
    #[default]
    Lossy,
    /// Fail the request with an encoding error
    Strict,
}

/// Limits applied to every read operation
///
/// Any field missing from a deserialized document takes its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadLimits {
    /// Maximum number of lines returned by a line-oriented read
    pub max_lines: usize,
    /// Maximum characters kept per returned line
    pub max_line_length: usize,
    /// Maximum total bytes of line text in one response
    pub max_output_bytes: usize,
    /// Maximum bytes returned by a byte-oriented read
    pub max_bytes: usize,
    /// Upper bound on the `max_matches` a search may request
    pub max_matches_cap: usize,
    /// Upper bound on the context lines around a search match
    pub max_context_lines: usize,
    /// Block size used for buffered and reverse scans
    pub block_size: usize,
    /// Files at or below this size get an exact line count
    pub exact_count_threshold_bytes: u64,
    /// Prefix size sampled to estimate the line count of larger files
    pub sample_bytes: usize,
    /// Handling of invalid UTF-8 in text lines
    pub encoding_policy: EncodingPolicy,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            max_lines: 10_000,
            max_line_length: 4096,
            max_output_bytes: 1024 * 1024, // 1 MB of line text
            max_bytes: 1024 * 1024,        // 1 MB of raw bytes
            max_matches_cap: 1000,
            max_context_lines: 100,
            block_size: 64 * 1024,
            exact_count_threshold_bytes: 8 * 1024 * 1024,
            sample_bytes: 1024 * 1024,
            encoding_policy: EncodingPolicy::Lossy,
        }
    }
}

impl ReadLimits {
    /// Parse limits from a JSON document.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Bytes of a single line kept in memory while scanning.
    pub(crate) fn line_byte_cap(&self) -> usize {
        // 4 bytes is the longest UTF-8 encoding of one char
        self.max_line_length.saturating_mul(4).max(1)
    }
}

/// Running tally of line text admitted into a response
#[derive(Debug, Clone)]
pub(crate) struct OutputBudget {
    used: usize,
    limit: usize,
    exhausted: bool,
}

impl OutputBudget {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            used: 0,
            limit,
            exhausted: false,
        }
    }

    /// Reserve `len` bytes, returning false once the limit would be crossed.
    pub(crate) fn admit(&mut self, len: usize) -> bool {
        if self.exhausted || self.used.saturating_add(len) > self.limit {
            self.exhausted = true;
            return false;
        }
        self.used += len;
        true
    }

    pub(crate) fn was_exhausted(&self) -> bool {
        self.exhausted
    }
}
