//! Tome: bounded access to large files
//!
//! Partial reads of files that may be arbitrarily large, without loading them
//! wholly into memory. Every operation reports what was and was not returned
//! through a uniform [`Envelope`] with a `truncated` flag.
//!
//! ```no_run
//! use tome::{FileAccess, ReadLimits, SearchRequest};
//!
//! let access = FileAccess::new(ReadLimits::default());
//! let tail = access.tail("/var/log/syslog", 20)?;
//! let hits = access.search("/var/log/syslog", &SearchRequest::substring("error"))?;
//! println!("{} lines, {} matches", tail.data.len(), hits.data.len());
//! # Ok::<(), tome::AccessError>(())
//! ```

mod access;
mod convert;
mod encoding;
mod error;
mod handle;
mod limits;
mod lines;
mod observer;
mod response;
mod search;


pub use access::{
    DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_LINES_PER_CHUNK, DEFAULT_N_LINES, FileAccess,
    ReadLinesOptions,
};
pub use convert::{ConvertMeta, ConvertedUrl, LinkKind, convert_deer_url};
pub use encoding::{Encoding, SNIFF_BYTES, sniff};
pub use error::{AccessError, ErrorKind};
pub use handle::OpenFile;
pub use limits::{EncodingPolicy, ReadLimits};
pub use lines::{LineIndex, LineSpan};
pub use observer::{CountingReader, NoopObserver, ReadCounter, ReadObserver};
pub use response::{
    ByteData, BytesMeta, Chunk, ChunkMeta, ContextLine, CountMethod, Envelope, ErrorBody,
    ErrorEnvelope, FileStat, LineChunkMeta, LinesMeta, ReadResult, SearchMatch, SearchMeta,
    StatMeta,
};
pub use search::{DEFAULT_MAX_MATCHES, SearchIter, SearchRequest};
