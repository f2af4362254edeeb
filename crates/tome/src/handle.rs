//! Scoped file handles

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::encoding::{self, Encoding, SNIFF_BYTES};
use crate::error::AccessError;
use crate::observer::{CountingReader, ReadObserver};

/// An open file owned by a single request.
///
/// The size is fixed at open time; reads never go past it even if the file
/// grows underneath. The encoding is sniffed on first use.
#[derive(Debug)]
pub struct OpenFile {
    reader: CountingReader<File>,
    path: PathBuf,
    size: u64,
    encoding: Option<Encoding>,
}

impl OpenFile {
    pub(crate) fn open(path: &Path, observer: Arc<dyn ReadObserver>) -> Result<Self, AccessError> {
        let meta = std::fs::metadata(path).map_err(|e| AccessError::from_io(e, path))?;
        if !meta.is_file() {
            return Err(AccessError::NotAFile(path.display().to_string()));
        }
        let file = File::open(path).map_err(|e| AccessError::from_io(e, path))?;
        let size = meta.len();
        tracing::trace!(path = %path.display(), size, "opened file");

        Ok(Self {
            reader: CountingReader::new(file, path, size, observer),
            path: path.to_path_buf(),
            size,
            encoding: None,
        })
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Encoding detected from the first [`SNIFF_BYTES`] bytes.
    pub(crate) fn encoding(&mut self) -> Result<Encoding, AccessError> {
        if let Some(enc) = self.encoding {
            return Ok(enc);
        }
        let prefix = self.read_at(0, SNIFF_BYTES)?;
        let enc = encoding::sniff(&prefix);
        self.encoding = Some(enc);
        Ok(enc)
    }

    /// Fail with an encoding error unless the file is text.
    pub(crate) fn require_text(&mut self) -> Result<(), AccessError> {
        if self.encoding()?.is_binary() {
            return Err(AccessError::Encoding(format!(
                "{} is binary; use a byte-oriented read",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Position the handle at `offset` for sequential reads.
    pub(crate) fn seek_to(&mut self, offset: u64) -> Result<(), AccessError> {
        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| AccessError::from_io(e, &self.path))?;
        Ok(())
    }

    /// Read up to `len` bytes starting at `offset`, clamped to the file size.
    pub(crate) fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, AccessError> {
        let available = self.size.saturating_sub(offset);
        let len = (len as u64).min(available);
        let mut buf = Vec::with_capacity(len as usize);
        if len == 0 {
            return Ok(buf);
        }
        self.seek_to(offset)?;
        (&mut self.reader)
            .take(len)
            .read_to_end(&mut buf)
            .map_err(|e| AccessError::from_io(e, &self.path))?;
        Ok(buf)
    }

    /// Fill `buf` with the bytes at `offset`.
    pub(crate) fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), AccessError> {
        self.seek_to(offset)?;
        self.reader
            .read_exact(buf)
            .map_err(|e| AccessError::from_io(e, &self.path))
    }
}

impl Read for OpenFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}
