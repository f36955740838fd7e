//! Replica provider trait and opened-slice handles.

use crate::block;
use crate::cipher::StreamCipher;
use crate::error::SourceResult;
use crate::stream::SliceStream;

/// One opened physical file of the replicated binlog.
///
/// A handle couples a raw byte stream with the metadata the buffer engine
/// needs to place the file inside the logical stream: the logical position
/// of its first content byte (`base_position`), the length of any physical
/// header to skip (`content_offset`), and whether the content is compressed
/// or encrypted.
pub struct SliceHandle {
    file_name: String,
    base_position: i64,
    content_offset: u64,
    compressed: bool,
    max_block_size: usize,
    cipher: Option<StreamCipher>,
    stream: Box<dyn SliceStream>,
}

impl SliceHandle {
    /// Creates a handle over a plain, unencrypted stream.
    #[must_use]
    pub fn new(file_name: impl Into<String>, base_position: i64, stream: Box<dyn SliceStream>) -> Self {
        Self {
            file_name: file_name.into(),
            base_position,
            content_offset: 0,
            compressed: false,
            max_block_size: block::MAX_BLOCK_SIZE,
            cipher: None,
            stream,
        }
    }

    /// Sets the number of physical header bytes preceding the content.
    #[must_use]
    pub fn with_content_offset(mut self, offset: u64) -> Self {
        self.content_offset = offset;
        self
    }

    /// Marks the content as block-compressed.
    #[must_use]
    pub fn with_compression(mut self) -> Self {
        self.compressed = true;
        self
    }

    /// Marks the content as encrypted with the given stream cipher.
    #[must_use]
    pub fn with_cipher(mut self, cipher: StreamCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Returns the file name, for diagnostics.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns the logical position of the first content byte.
    #[must_use]
    pub fn base_position(&self) -> i64 {
        self.base_position
    }

    /// Returns the physical offset of the first content byte.
    #[must_use]
    pub fn content_offset(&self) -> u64 {
        self.content_offset
    }

    /// Returns `true` if the content is block-compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Returns the maximum decoded size of one compressed block.
    #[must_use]
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Returns the stream cipher, if the content is encrypted.
    #[must_use]
    pub fn cipher(&self) -> Option<&StreamCipher> {
        self.cipher.as_ref()
    }

    /// Returns the raw byte stream.
    pub fn stream_mut(&mut self) -> &mut dyn SliceStream {
        self.stream.as_mut()
    }

    /// Decodes the next compressed block into `out`.
    ///
    /// Returns `Ok(None)` at a clean end of file.
    ///
    /// # Errors
    ///
    /// Returns an error if the block framing or payload is corrupted.
    pub fn decode_next_block(&mut self, out: &mut [u8]) -> SourceResult<Option<usize>> {
        block::decode_block(self.stream.as_mut(), out)
    }
}

impl std::fmt::Debug for SliceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceHandle")
            .field("file_name", &self.file_name)
            .field("base_position", &self.base_position)
            .field("content_offset", &self.content_offset)
            .field("compressed", &self.compressed)
            .finish_non_exhaustive()
    }
}

/// Access to the physical files of one replicated binlog.
///
/// The provider maps logical stream positions to physical files and walks
/// the file sequence during rotation. Implementations own the replica's
/// metadata (file index, base positions, encryption parameters); the buffer
/// engine owns all interpretation of the bytes.
///
/// # Implementors
///
/// - [`crate::LocalReplica`] - files in a local directory
/// - [`crate::MemoryReplica`] - in-memory slices for tests
pub trait ReplicaProvider: Send {
    /// Opens the file containing the given logical position.
    ///
    /// The returned stream is positioned at offset 0; the caller seeks.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SourceError::NoSuchPosition`] if no file covers the
    /// position, or an I/O error if the file cannot be opened.
    fn open(&mut self, position: i64) -> SourceResult<SliceHandle>;

    /// Opens the file following `current` in the stream, if it exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be opened.
    fn next_file(&mut self, current: &SliceHandle) -> SourceResult<Option<SliceHandle>>;

    /// Re-reads the replica's metadata (file index, new arrivals).
    ///
    /// Called before a rotation retry when the next file was absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be refreshed.
    fn refresh_replica_metadata(&mut self) -> SourceResult<()>;
}
