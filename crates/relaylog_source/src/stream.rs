//! Raw byte streams over physical replica files.

use crate::error::{SourceError, SourceResult};
use std::fs::File;
use std::io::{IoSliceMut, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sequential byte access to one physical replica file.
///
/// A stream is an opaque byte source with a movable cursor. It knows nothing
/// about the binlog format, compression framing, or encryption; those are
/// layered on top by the buffer engine.
///
/// # Invariants
///
/// - `read`/`read_vectored` advance the cursor by the bytes returned
/// - a return of 0 with non-empty buffers means end of file
/// - `seek_to` positions the cursor at an absolute file offset
pub trait SliceStream: Send {
    /// Moves the cursor to an absolute offset within the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying seek fails.
    fn seek_to(&mut self, offset: u64) -> SourceResult<()>;

    /// Reads into `buf` at the cursor, returning the bytes obtained.
    ///
    /// A short read is not an error; 0 means end of file.
    ///
    /// # Errors
    ///
    /// Returns an error on an OS-level read failure.
    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize>;

    /// Reads into a scatter/gather descriptor list with a single operation.
    ///
    /// # Errors
    ///
    /// Returns an error on an OS-level read failure.
    fn read_vectored(&mut self, bufs: &mut [IoSliceMut<'_>]) -> SourceResult<usize>;

    /// Returns the total file length in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn len(&self) -> SourceResult<u64>;

    /// Returns `true` if the file is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn is_empty(&self) -> SourceResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Reads exactly `buf.len()` bytes unless end of file intervenes.
///
/// Returns the bytes obtained, which is less than `buf.len()` only at EOF.
///
/// # Errors
///
/// Returns an error on an OS-level read failure.
pub fn read_full(stream: &mut dyn SliceStream, buf: &mut [u8]) -> SourceResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// A stream over an ordinary file on the local filesystem.
#[derive(Debug)]
pub struct FileStream {
    path: PathBuf,
    file: File,
}

impl FileStream {
    /// Opens a file for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> SourceResult<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SliceStream for FileStream {
    fn seek_to(&mut self, offset: u64) -> SourceResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        Ok(self.file.read(buf)?)
    }

    fn read_vectored(&mut self, bufs: &mut [IoSliceMut<'_>]) -> SourceResult<usize> {
        Ok(self.file.read_vectored(bufs)?)
    }

    fn len(&self) -> SourceResult<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// A stream over an in-memory byte buffer, for tests and ephemeral replicas.
///
/// An optional per-call read cap simulates a source that delivers data in
/// small increments, which tests use to drive the buffer through many pump
/// cycles.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    data: Arc<Vec<u8>>,
    pos: usize,
    read_cap: Option<usize>,
}

impl MemoryStream {
    /// Creates a stream over the given bytes.
    #[must_use]
    pub fn new(data: Arc<Vec<u8>>) -> Self {
        Self {
            data,
            pos: 0,
            read_cap: None,
        }
    }

    /// Limits every read call to at most `cap` bytes.
    #[must_use]
    pub fn with_read_cap(mut self, cap: usize) -> Self {
        self.read_cap = Some(cap);
        self
    }
}

impl SliceStream for MemoryStream {
    fn seek_to(&mut self, offset: u64) -> SourceResult<()> {
        if offset > self.data.len() as u64 {
            return Err(SourceError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "seek to {offset} beyond end of {}-byte stream",
                    self.data.len()
                ),
            )));
        }
        self.pos = offset as usize;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        let remaining = self.data.len() - self.pos;
        let mut n = buf.len().min(remaining);
        if let Some(cap) = self.read_cap {
            n = n.min(cap);
        }
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn read_vectored(&mut self, bufs: &mut [IoSliceMut<'_>]) -> SourceResult<usize> {
        let mut budget = self.data.len() - self.pos;
        if let Some(cap) = self.read_cap {
            budget = budget.min(cap);
        }
        let mut total = 0;
        for buf in bufs {
            if budget == 0 {
                break;
            }
            let n = buf.len().min(budget);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            budget -= n;
            total += n;
        }
        Ok(total)
    }

    fn len(&self) -> SourceResult<u64> {
        Ok(self.data.len() as u64)
    }
}
