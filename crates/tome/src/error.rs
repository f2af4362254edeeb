//! Error types for file access

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while serving a read request
#[derive(Debug, Error)]
pub enum AccessError {
    /// Path does not exist
    #[error("file not found: {0}")]
    NotFound(String),
    /// Path exists but cannot be read
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Path is a directory or some other non-regular file
    #[error("not a file: {0}")]
    NotAFile(String),
    /// Malformed numeric bounds
    #[error("invalid range: {0}")]
    InvalidRange(String),
    /// Malformed search pattern
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    /// Content requested as text could not be decoded
    #[error("encoding error: {0}")]
    Encoding(String),
    /// URL does not match any known conversion
    #[error("unrecognized URL: {0}")]
    UnrecognizedUrl(String),
    /// Any other IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Stable, serializable classification of an [`AccessError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`AccessError::NotFound`]
    NotFound,
    /// See [`AccessError::PermissionDenied`]
    PermissionDenied,
    /// See [`AccessError::NotAFile`]
    NotAFile,
    /// See [`AccessError::InvalidRange`]
    InvalidRange,
    /// See [`AccessError::InvalidPattern`]
    InvalidPattern,
    /// See [`AccessError::Encoding`]
    Encoding,
    /// See [`AccessError::UnrecognizedUrl`]
    UnrecognizedUrl,
    /// See [`AccessError::Io`]
    Io,
}

impl ErrorKind {
    /// Process exit code for this kind. Success is always 0.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Io => 1,
            ErrorKind::NotFound => 2,
            ErrorKind::PermissionDenied => 3,
            ErrorKind::InvalidRange => 4,
            ErrorKind::InvalidPattern => 5,
            ErrorKind::Encoding => 6,
            ErrorKind::NotAFile => 7,
            ErrorKind::UnrecognizedUrl => 8,
        }
    }
}

impl AccessError {
    /// Classify an IO error raised while touching `path`.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        let shown = path.display().to_string();
        match err.kind() {
            io::ErrorKind::NotFound => AccessError::NotFound(shown),
            io::ErrorKind::PermissionDenied => AccessError::PermissionDenied(shown),
            io::ErrorKind::IsADirectory => AccessError::NotAFile(shown),
            _ => AccessError::Io(err),
        }
    }

    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::NotFound(_) => ErrorKind::NotFound,
            AccessError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            AccessError::NotAFile(_) => ErrorKind::NotAFile,
            AccessError::InvalidRange(_) => ErrorKind::InvalidRange,
            AccessError::InvalidPattern(_) => ErrorKind::InvalidPattern,
            AccessError::Encoding(_) => ErrorKind::Encoding,
            AccessError::UnrecognizedUrl(_) => ErrorKind::UnrecognizedUrl,
            AccessError::Io(_) => ErrorKind::Io,
        }
    }

    /// Shorthand for `self.kind().exit_code()`.
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let mapped = AccessError::from_io(err, Path::new("/nope"));
        assert!(matches!(mapped, AccessError::NotFound(ref p) if p == "/nope"));
        assert_eq!(mapped.exit_code(), 2);
    }

    #[test]
    fn test_io_permission_maps_to_permission_denied() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "no");
        let mapped = AccessError::from_io(err, Path::new("/secret"));
        assert_eq!(mapped.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_other_io_stays_io() {
        let err = io::Error::new(io::ErrorKind::UnexpectedEof, "short");
        let mapped = AccessError::from_io(err, Path::new("/x"));
        assert_eq!(mapped.kind(), ErrorKind::Io);
        assert_eq!(mapped.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let kinds = [
            ErrorKind::Io,
            ErrorKind::NotFound,
            ErrorKind::PermissionDenied,
            ErrorKind::InvalidRange,
            ErrorKind::InvalidPattern,
            ErrorKind::Encoding,
            ErrorKind::NotAFile,
            ErrorKind::UnrecognizedUrl,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(|k| k.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::InvalidRange).unwrap_or_default();
        assert_eq!(json, "\"invalid_range\"");
    }
}
