//! In-memory replica for testing.

use crate::cipher::StreamCipher;
use crate::error::{SourceError, SourceResult};
use crate::provider::{ReplicaProvider, SliceHandle};
use crate::stream::MemoryStream;
use crate::block;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared control and observation surface for a [`MemoryReplica`].
///
/// The replica is usually boxed and moved into the buffer engine; tests keep
/// a clone of this handle to change file visibility mid-run (simulating a
/// replica whose next file has not arrived yet) and to count provider calls.
#[derive(Debug, Default)]
pub struct ReplicaControl {
    visible_limit: Mutex<Option<usize>>,
    open_calls: Mutex<u32>,
    next_file_calls: Mutex<u32>,
    refresh_calls: Mutex<u32>,
    handles_created: Mutex<u32>,
}

impl ReplicaControl {
    /// Limits the replica to its first `limit` files; `None` shows all.
    pub fn set_visible_limit(&self, limit: Option<usize>) {
        *self.visible_limit.lock() = limit;
    }

    /// Returns how many times `open` was called.
    #[must_use]
    pub fn open_calls(&self) -> u32 {
        *self.open_calls.lock()
    }

    /// Returns how many times `next_file` was called.
    #[must_use]
    pub fn next_file_calls(&self) -> u32 {
        *self.next_file_calls.lock()
    }

    /// Returns how many times `refresh_replica_metadata` was called.
    #[must_use]
    pub fn refresh_calls(&self) -> u32 {
        *self.refresh_calls.lock()
    }

    /// Returns how many slice handles were handed out, across `open` and
    /// successful `next_file` calls.
    #[must_use]
    pub fn handles_created(&self) -> u32 {
        *self.handles_created.lock()
    }
}

struct MemorySlice {
    name: String,
    base_position: i64,
    logical_len: u64,
    data: Arc<Vec<u8>>,
    content_offset: u64,
    compressed: bool,
    cipher: Option<StreamCipher>,
}

/// An in-memory replica holding its binlog files as byte vectors.
///
/// Suitable for unit and integration tests of the buffer engine: slices can
/// be plain, compressed, or encrypted, a per-call read cap throttles
/// delivery, and the [`ReplicaControl`] handle withholds tail files to
/// exercise rotation retries.
#[derive(Default)]
pub struct MemoryReplica {
    slices: Vec<MemorySlice>,
    read_cap: Option<usize>,
    control: Arc<ReplicaControl>,
}

impl MemoryReplica {
    /// Creates an empty replica.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared control handle.
    #[must_use]
    pub fn control(&self) -> Arc<ReplicaControl> {
        Arc::clone(&self.control)
    }

    /// Limits every stream read call to at most `cap` bytes.
    pub fn set_read_cap(&mut self, cap: usize) {
        self.read_cap = Some(cap);
    }

    /// Adds a plain file whose content starts at logical `base_position`.
    pub fn add_slice(&mut self, name: impl Into<String>, base_position: i64, content: Vec<u8>) {
        self.slices.push(MemorySlice {
            name: name.into(),
            base_position,
            logical_len: content.len() as u64,
            data: Arc::new(content),
            content_offset: 0,
            compressed: false,
            cipher: None,
        });
    }

    /// Adds a plain file with a physical header preceding the content.
    pub fn add_slice_with_header(
        &mut self,
        name: impl Into<String>,
        base_position: i64,
        header: &[u8],
        content: &[u8],
    ) {
        let mut data = header.to_vec();
        data.extend_from_slice(content);
        self.slices.push(MemorySlice {
            name: name.into(),
            base_position,
            logical_len: content.len() as u64,
            data: Arc::new(data),
            content_offset: header.len() as u64,
            compressed: false,
            cipher: None,
        });
    }

    /// Adds a block-compressed file holding `raw` split into `block_size` blocks.
    pub fn add_compressed_slice(
        &mut self,
        name: impl Into<String>,
        base_position: i64,
        raw: &[u8],
        block_size: usize,
    ) {
        let framed = block::encode_stream(raw, block_size);
        self.slices.push(MemorySlice {
            name: name.into(),
            base_position,
            logical_len: raw.len() as u64,
            data: Arc::new(framed),
            content_offset: 0,
            compressed: true,
            cipher: None,
        });
    }

    /// Adds an encrypted file with a physical header preceding the content.
    ///
    /// The content is encrypted at keystream offsets starting at
    /// `header.len()`, matching how the buffer engine derives decryption
    /// offsets from `content_offset`.
    pub fn add_encrypted_slice(
        &mut self,
        name: impl Into<String>,
        base_position: i64,
        header: &[u8],
        content: &[u8],
        cipher: StreamCipher,
    ) {
        let mut encrypted = content.to_vec();
        cipher.apply_keystream(&mut encrypted, header.len() as u64);
        let mut data = header.to_vec();
        data.extend_from_slice(&encrypted);
        self.slices.push(MemorySlice {
            name: name.into(),
            base_position,
            logical_len: content.len() as u64,
            data: Arc::new(data),
            content_offset: header.len() as u64,
            compressed: false,
            cipher: Some(cipher),
        });
    }

    fn visible(&self) -> &[MemorySlice] {
        let limit = *self.control.visible_limit.lock();
        let limit = limit.unwrap_or(self.slices.len());
        &self.slices[..limit.min(self.slices.len())]
    }

    fn make_handle(&self, slice: &MemorySlice) -> SliceHandle {
        *self.control.handles_created.lock() += 1;
        let mut stream = MemoryStream::new(Arc::clone(&slice.data));
        if let Some(cap) = self.read_cap {
            stream = stream.with_read_cap(cap);
        }
        let mut handle = SliceHandle::new(slice.name.clone(), slice.base_position, Box::new(stream))
            .with_content_offset(slice.content_offset);
        if slice.compressed {
            handle = handle.with_compression();
        }
        if let Some(cipher) = &slice.cipher {
            handle = handle.with_cipher(cipher.clone());
        }
        handle
    }
}

impl ReplicaProvider for MemoryReplica {
    fn open(&mut self, position: i64) -> SourceResult<SliceHandle> {
        *self.control.open_calls.lock() += 1;
        let slice = self
            .visible()
            .iter()
            .find(|s| {
                position >= s.base_position && (position as u64) < s.base_position as u64 + s.logical_len
            })
            .ok_or(SourceError::NoSuchPosition { position })?;
        Ok(self.make_handle(slice))
    }

    fn next_file(&mut self, current: &SliceHandle) -> SourceResult<Option<SliceHandle>> {
        *self.control.next_file_calls.lock() += 1;
        let visible = self.visible();
        let index = visible
            .iter()
            .position(|s| s.name == current.file_name())
            .ok_or_else(|| {
                SourceError::corrupted(format!("unknown replica file {}", current.file_name()))
            })?;
        match visible.get(index + 1) {
            Some(slice) => Ok(Some(self.make_handle(slice))),
            None => Ok(None),
        }
    }

    fn refresh_replica_metadata(&mut self) -> SourceResult<()> {
        *self.control.refresh_calls.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{KEY_SIZE, NONCE_SIZE};
    use crate::stream::read_full;

    fn replica_with_two_files() -> MemoryReplica {
        let mut replica = MemoryReplica::new();
        replica.add_slice("bin.000001", 0, b"first file".to_vec());
        replica.add_slice("bin.000002", 10, b"second".to_vec());
        replica
    }

    #[test]
    fn open_finds_containing_file() {
        let mut replica = replica_with_two_files();
        let handle = replica.open(3).unwrap();
        assert_eq!(handle.file_name(), "bin.000001");
        assert_eq!(handle.base_position(), 0);

        let handle = replica.open(12).unwrap();
        assert_eq!(handle.file_name(), "bin.000002");
        assert_eq!(handle.base_position(), 10);
    }

    #[test]
    fn open_past_end_fails() {
        let mut replica = replica_with_two_files();
        let result = replica.open(16);
        assert!(matches!(result, Err(SourceError::NoSuchPosition { position: 16 })));
    }

    #[test]
    fn next_file_walks_sequence() {
        let mut replica = replica_with_two_files();
        let first = replica.open(0).unwrap();
        let second = replica.next_file(&first).unwrap().unwrap();
        assert_eq!(second.file_name(), "bin.000002");
        assert!(replica.next_file(&second).unwrap().is_none());
    }

    #[test]
    fn visibility_limit_hides_tail_files() {
        let mut replica = replica_with_two_files();
        let control = replica.control();
        control.set_visible_limit(Some(1));

        let first = replica.open(0).unwrap();
        assert!(replica.next_file(&first).unwrap().is_none());

        control.set_visible_limit(None);
        assert!(replica.next_file(&first).unwrap().is_some());
    }

    #[test]
    fn call_counters_track_provider_usage() {
        let mut replica = replica_with_two_files();
        let control = replica.control();
        let first = replica.open(0).unwrap();
        replica.next_file(&first).unwrap();
        replica.refresh_replica_metadata().unwrap();

        assert_eq!(control.open_calls(), 1);
        assert_eq!(control.next_file_calls(), 1);
        assert_eq!(control.refresh_calls(), 1);
    }

    #[test]
    fn header_sets_content_offset() {
        let mut replica = MemoryReplica::new();
        replica.add_slice_with_header("bin.000001", 0, b"MAGC", b"content");
        let mut handle = replica.open(0).unwrap();
        assert_eq!(handle.content_offset(), 4);

        handle.stream_mut().seek_to(4).unwrap();
        let mut buf = [0u8; 7];
        read_full(handle.stream_mut(), &mut buf).unwrap();
        assert_eq!(&buf, b"content");
    }

    #[test]
    fn encrypted_slice_decrypts_at_content_offsets() {
        let cipher = StreamCipher::new(&[9u8; KEY_SIZE], &[3u8; NONCE_SIZE]).unwrap();
        let mut replica = MemoryReplica::new();
        replica.add_encrypted_slice("bin.000001", 0, b"HDR", b"secret payload", cipher);

        let mut handle = replica.open(0).unwrap();
        assert!(handle.cipher().is_some());
        handle.stream_mut().seek_to(3).unwrap();
        let mut buf = [0u8; 14];
        read_full(handle.stream_mut(), &mut buf).unwrap();
        assert_ne!(&buf, b"secret payload");

        let cipher = handle.cipher().unwrap().clone();
        cipher.apply_keystream(&mut buf, 3);
        assert_eq!(&buf, b"secret payload");
    }

    #[test]
    fn compressed_slice_decodes_to_raw() {
        let raw: Vec<u8> = (0..=255u8).cycle().take(2000).collect();
        let mut replica = MemoryReplica::new();
        replica.add_compressed_slice("bin.000001", 0, &raw, 512);

        let mut handle = replica.open(0).unwrap();
        assert!(handle.is_compressed());

        let mut decoded = Vec::new();
        let mut out = [0u8; block::MAX_BLOCK_SIZE];
        while let Some(n) = handle.decode_next_block(&mut out).unwrap() {
            decoded.extend_from_slice(&out[..n]);
        }
        assert_eq!(decoded, raw);
    }
}
