//! Offset-addressable stream cipher for encrypted replica files.
//!
//! Replica files may be encrypted with a per-file keystream. Because the
//! replay path reads files at arbitrary offsets after a resume, the cipher
//! must be addressable by absolute stream offset rather than consumed
//! sequentially: byte `i` of the keystream depends only on the key, the
//! nonce, and `i`. Applying the keystream twice restores the plaintext, so
//! encryption and decryption are the same operation.

use crate::error::{SourceError, SourceResult};

/// Size of the cipher key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the per-file nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// A keystream cipher bound to one replica file.
#[derive(Clone)]
pub struct StreamCipher {
    key: [u8; KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
}

impl StreamCipher {
    /// Creates a cipher from raw key and nonce bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not exactly 32 bytes or the nonce is
    /// not exactly 12 bytes.
    pub fn new(key: &[u8], nonce: &[u8]) -> SourceResult<Self> {
        if key.len() != KEY_SIZE {
            return Err(SourceError::cipher(format!(
                "invalid key size: expected {KEY_SIZE}, got {}",
                key.len()
            )));
        }
        if nonce.len() != NONCE_SIZE {
            return Err(SourceError::cipher(format!(
                "invalid nonce size: expected {NONCE_SIZE}, got {}",
                nonce.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(key);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);
        Ok(Self {
            key: key_bytes,
            nonce: nonce_bytes,
        })
    }

    /// XORs the keystream into `buf`, starting at absolute `stream_offset`.
    ///
    /// `stream_offset` is the offset of `buf[0]` within the file's content
    /// stream. Calling this on ciphertext yields plaintext and vice versa.
    pub fn apply_keystream(&self, buf: &mut [u8], stream_offset: u64) {
        for (i, byte) in buf.iter_mut().enumerate() {
            let offset = stream_offset + i as u64;
            let key_byte = self.key[(offset % KEY_SIZE as u64) as usize];
            let nonce_byte = self.nonce[(offset % NONCE_SIZE as u64) as usize];
            let block = (offset / KEY_SIZE as u64) as u8;
            *byte ^= key_byte ^ nonce_byte ^ block;
        }
    }
}

impl Drop for StreamCipher {
    fn drop(&mut self) {
        // Zero key material on drop
        self.key.fill(0);
        self.nonce.fill(0);
    }
}

impl std::fmt::Debug for StreamCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCipher")
            .field("key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}
