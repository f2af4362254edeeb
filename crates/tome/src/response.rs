//! Response envelope and payload types
//!
//! Every successful operation returns an [`Envelope`] of
//! `{ data, truncated, metadata }`; failures render as an [`ErrorEnvelope`].

use std::ops::Deref;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::encoding::Encoding;
use crate::error::{AccessError, ErrorKind};

/// Uniform success envelope
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<D, M> {
    /// Requested content
    pub data: D,
    /// Whether a configured maximum cut the result short
    pub truncated: bool,
    /// Facts about the file and what was returned
    pub metadata: M,
}

/// Result of a line-oriented read.
pub type ReadResult = Envelope<Vec<String>, LinesMeta>;

/// Metadata for line-oriented reads
#[derive(Debug, Clone, Serialize)]
pub struct LinesMeta {
    /// Path as requested
    pub path: String,
    /// File size in bytes
    pub size_bytes: u64,
    /// Encoding of the returned text
    pub encoding: Encoding,
    /// Number of the first returned line, when known
    pub first_line: Option<u64>,
    /// Number of the last returned line, when known
    pub last_line: Option<u64>,
    /// Number of lines returned
    pub lines_returned: usize,
    /// True line count of the file, when the scan established it
    pub total_lines: Option<u64>,
    /// Offset of the first returned byte
    pub byte_start: Option<u64>,
    /// Offset one past the last returned byte
    pub byte_end: Option<u64>,
}

/// File statistics
#[derive(Debug, Clone, Serialize)]
pub struct FileStat {
    /// Path as requested
    pub path: String,
    /// File size in bytes
    pub size_bytes: u64,
    /// Line count, exact or estimated
    pub line_count: u64,
    /// False when `line_count` was extrapolated from a prefix sample
    pub line_count_exact: bool,
    /// Detected encoding
    pub encoding: Encoding,
    /// Whether only byte-oriented reads are allowed
    pub is_binary: bool,
}

/// How a line count was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMethod {
    /// Whole file scanned
    Exact,
    /// Prefix sampled and extrapolated
    Sampled,
    /// Binary file, not counted
    Skipped,
}

/// Metadata for [`FileStat`]
#[derive(Debug, Clone, Serialize)]
pub struct StatMeta {
    /// How the line count was obtained
    pub count_method: CountMethod,
    /// Bytes examined to count lines
    pub bytes_scanned: u64,
}

/// Raw bytes, rendered as text when they are valid UTF-8 and base64 otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteData(pub Vec<u8>);

impl ByteData {
    /// Consume and return the bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for ByteData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ByteData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ByteData", 2)?;
        match std::str::from_utf8(&self.0) {
            Ok(text) => {
                state.serialize_field("content_encoding", "utf-8")?;
                state.serialize_field("content", text)?;
            }
            Err(_) => {
                state.serialize_field("content_encoding", "base64")?;
                state.serialize_field("content", &STANDARD.encode(&self.0))?;
            }
        }
        state.end()
    }
}

/// Metadata for byte-range reads
#[derive(Debug, Clone, Serialize)]
pub struct BytesMeta {
    /// Path as requested
    pub path: String,
    /// File size in bytes
    pub size_bytes: u64,
    /// Requested start offset
    pub start_offset: u64,
    /// Requested length
    pub requested_length: u64,
    /// Bytes actually returned after clamping
    pub returned_length: u64,
}

/// One fixed-size window of a file
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    /// Window contents
    #[serde(flatten)]
    pub bytes: ByteData,
    /// Set when the window reaches EOF
    pub is_last_chunk: bool,
}

/// Metadata for chunk reads
#[derive(Debug, Clone, Serialize)]
pub struct ChunkMeta {
    /// Path as requested
    pub path: String,
    /// File size in bytes
    pub size_bytes: u64,
    /// Requested chunk index
    pub chunk_index: u64,
    /// Window size in bytes
    pub chunk_size_bytes: u64,
    /// Offset of the window
    pub offset: u64,
    /// Chunks needed to cover the file
    pub total_chunks: u64,
}

/// Metadata for line-chunk reads
#[derive(Debug, Clone, Serialize)]
pub struct LineChunkMeta {
    /// Line metadata of the underlying read
    #[serde(flatten)]
    pub lines: LinesMeta,
    /// Requested chunk index
    pub chunk_index: u64,
    /// Lines per chunk
    pub lines_per_chunk: u64,
    /// Whether lines remain after this chunk
    pub has_more: bool,
}

/// One search hit with its surrounding lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    /// 1-based number of the matching line
    pub line_number: u64,
    /// Text of the matching line
    pub line_text: String,
    /// Lines immediately before the match, in file order
    pub context_before: Vec<ContextLine>,
    /// Lines immediately after the match, in file order
    pub context_after: Vec<ContextLine>,
}

/// A numbered context line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextLine {
    /// 1-based line number
    pub line_number: u64,
    /// Line text
    pub text: String,
}

/// Metadata for searches
#[derive(Debug, Clone, Serialize)]
pub struct SearchMeta {
    /// Path as requested
    pub path: String,
    /// Pattern as requested
    pub pattern: String,
    /// Whether the pattern was a regular expression
    pub use_regex: bool,
    /// Effective match limit after capping
    pub max_matches: usize,
    /// Matches returned
    pub matches_returned: usize,
    /// Lines read before the scan stopped
    pub lines_scanned: u64,
    /// Encoding of the returned text
    pub encoding: Encoding,
}

/// Error object returned in place of an [`Envelope`]
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    /// The failure
    pub error: ErrorBody,
}

/// Typed failure details
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Stable kind
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Process exit code for this kind
    pub exit_code: i32,
}

impl From<&AccessError> for ErrorEnvelope {
    fn from(err: &AccessError) -> Self {
        Self {
            error: ErrorBody {
                kind: err.kind(),
                message: err.to_string(),
                exit_code: err.exit_code(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_text_bytes_serialize_as_utf8() {
        let value = serde_json::to_value(ByteData(b"hello".to_vec())).unwrap();
        assert_eq!(value, json!({"content_encoding": "utf-8", "content": "hello"}));
    }

    #[test]
    fn test_binary_bytes_serialize_as_base64() {
        let value = serde_json::to_value(ByteData(vec![0xff, 0x00, 0x10])).unwrap();
        assert_eq!(value["content_encoding"], "base64");
        assert_eq!(value["content"], "/wAQ");
    }

    #[test]
    fn test_chunk_flattens_bytes() {
        let chunk = Chunk {
            bytes: ByteData(b"abc".to_vec()),
            is_last_chunk: true,
        };
        let value = serde_json::to_value(chunk).unwrap();
        assert_eq!(value["content"], "abc");
        assert_eq!(value["is_last_chunk"], true);
    }

    #[test]
    fn test_error_envelope_shape() {
        let err = AccessError::InvalidRange("start_line must be >= 1".into());
        let value = serde_json::to_value(ErrorEnvelope::from(&err)).unwrap();
        assert_eq!(value["error"]["kind"], "invalid_range");
        assert_eq!(value["error"]["exit_code"], 4);
        assert!(
            value["error"]["message"]
                .as_str()
                .unwrap()
                .contains("start_line")
        );
    }
}
