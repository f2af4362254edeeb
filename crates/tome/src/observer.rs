//! Read instrumentation
//!
//! Every file opened by [`FileAccess`](crate::FileAccess) is wrapped in a
//! [`CountingReader`] that reports to a [`ReadObserver`]. Observers are passed
//! in explicitly; nothing process-wide is patched.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives notifications about file handles and the bytes read through them.
///
/// All methods default to doing nothing.
pub trait ReadObserver: Send + Sync {
    /// A file was opened.
    fn on_open(&self, _path: &Path, _size: u64) {}

    /// `bytes` were read from the file.
    fn on_read(&self, _path: &Path, _bytes: usize) {}

    /// The handle was released after `total_bytes` were read through it.
    fn on_close(&self, _path: &Path, _total_bytes: u64) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ReadObserver for NoopObserver {}

/// Observer that accumulates totals across every handle it sees.
#[derive(Debug, Default)]
pub struct ReadCounter {
    opens: AtomicU64,
    closes: AtomicU64,
    bytes: AtomicU64,
}

impl ReadCounter {
    /// Create a counter with all totals at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles opened.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    /// Number of handles released.
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }

    /// Bytes read across all handles.
    pub fn bytes_read(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl ReadObserver for ReadCounter {
    fn on_open(&self, _path: &Path, _size: u64) {
        self.opens.fetch_add(1, Ordering::Relaxed);
    }

    fn on_read(&self, _path: &Path, bytes: usize) {
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn on_close(&self, _path: &Path, _total_bytes: u64) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Reader decorator that reports every read to an observer.
///
/// Dropping the reader reports the close, so the observer sees a release on
/// every exit path.
pub struct CountingReader<R> {
    inner: R,
    path: PathBuf,
    total: u64,
    observer: Arc<dyn ReadObserver>,
}

impl<R> std::fmt::Debug for CountingReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingReader")
            .field("path", &self.path)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

impl<R> CountingReader<R> {
    /// Wrap `inner`, announcing the open to `observer`.
    pub fn new(inner: R, path: &Path, size: u64, observer: Arc<dyn ReadObserver>) -> Self {
        observer.on_open(path, size);
        Self {
            inner,
            path: path.to_path_buf(),
            total: 0,
            observer,
        }
    }

    /// Bytes read through this handle so far.
    pub fn total(&self) -> u64 {
        self.total
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.total += n as u64;
            self.observer.on_read(&self.path, n);
        }
        Ok(n)
    }
}

impl<R: Seek> Seek for CountingReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl<R> Drop for CountingReader<R> {
    fn drop(&mut self) {
        tracing::trace!(path = %self.path.display(), bytes = self.total, "closing file");
        self.observer.on_close(&self.path, self.total);
    }
}
