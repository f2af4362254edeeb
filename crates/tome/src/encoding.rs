//! Text encoding detection and line decoding

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AccessError;
use crate::limits::EncodingPolicy;

/// Bytes inspected at the start of a file to classify it.
pub const SNIFF_BYTES: usize = 8 * 1024;

/// Encoding reported for a file or a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    /// Valid UTF-8 text
    #[serde(rename = "utf-8")]
    Utf8,
    /// UTF-8 text in which some sequences were replaced with U+FFFD
    #[serde(rename = "utf-8 (lossy)")]
    Utf8Lossy,
    /// Contains NUL bytes; only byte-oriented reads are allowed
    #[serde(rename = "binary")]
    Binary,
}

impl Encoding {
    /// Whether line-oriented operations are refused for this encoding.
    pub fn is_binary(self) -> bool {
        self == Encoding::Binary
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf8Lossy => "utf-8 (lossy)",
            Encoding::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// Classify a file from its leading bytes.
///
/// A NUL byte marks the file as binary. Everything else is treated as UTF-8
/// text; stray invalid sequences are dealt with per line by [`LineDecoder`].
pub fn sniff(prefix: &[u8]) -> Encoding {
    if prefix.contains(&0) {
        Encoding::Binary
    } else {
        Encoding::Utf8
    }
}

/// Decodes raw line bytes into text under an [`EncodingPolicy`].
#[derive(Debug, Clone)]
pub(crate) struct LineDecoder {
    policy: EncodingPolicy,
    replaced: bool,
}

impl LineDecoder {
    pub(crate) fn new(policy: EncodingPolicy) -> Self {
        Self {
            policy,
            replaced: false,
        }
    }

    /// Decode one line, without its terminator.
    ///
    /// `clipped` says the bytes were cut short while scanning, so a partial
    /// multi-byte sequence at the very end is dropped instead of reported.
    pub(crate) fn decode(
        &mut self,
        line_number: Option<u64>,
        bytes: &[u8],
        clipped: bool,
    ) -> Result<String, AccessError> {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        let bytes = match std::str::from_utf8(bytes) {
            Ok(text) => return Ok(text.to_owned()),
            Err(e) if clipped && e.error_len().is_none() => &bytes[..e.valid_up_to()],
            Err(_) => bytes,
        };
        if let Ok(text) = std::str::from_utf8(bytes) {
            return Ok(text.to_owned());
        }

        match self.policy {
            EncodingPolicy::Lossy => {
                self.replaced = true;
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
            EncodingPolicy::Strict => Err(AccessError::Encoding(match line_number {
                Some(n) => format!("line {} is not valid UTF-8", n),
                None => "line is not valid UTF-8".to_string(),
            })),
        }
    }

    /// Encoding to report for everything decoded so far.
    pub(crate) fn encoding(&self) -> Encoding {
        if self.replaced {
            Encoding::Utf8Lossy
        } else {
            Encoding::Utf8
        }
    }
}

/// Cut `text` to at most `max_chars` characters.
///
/// Returns whether anything was removed.
pub(crate) fn clip_chars(text: &mut String, max_chars: usize) -> bool {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            text.truncate(idx);
            true
        }
        None => false,
    }
}
