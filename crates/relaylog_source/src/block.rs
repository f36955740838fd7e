//! LZ4 block framing for compressed replica files.
//!
//! Compressed replica files are a sequence of independently decodable
//! blocks:
//!
//! ```text
//! | raw_len (4, LE) | comp_len (4, LE) | lz4 payload (comp_len) |
//! ```
//!
//! `raw_len` is the decoded size of the block, which never exceeds
//! [`MAX_BLOCK_SIZE`]. Blocks are decoded one at a time; a reader that wants
//! byte N of the decoded stream must decode from the start of the file, so
//! the buffer engine treats compressed files as unseekable.

use crate::error::{SourceError, SourceResult};
use crate::stream::{read_full, SliceStream};

/// Block header size: raw_len (4) + comp_len (4).
const BLOCK_HEADER_SIZE: usize = 8;

/// Maximum decoded size of a single block.
pub const MAX_BLOCK_SIZE: usize = 64 * 1024;

/// Encodes one block of raw bytes into the framed compressed form.
///
/// Used by test fixtures and archival tooling; the replay path only decodes.
///
/// # Panics
///
/// Panics if `raw` exceeds [`MAX_BLOCK_SIZE`].
#[must_use]
pub fn encode_block(raw: &[u8]) -> Vec<u8> {
    assert!(
        raw.len() <= MAX_BLOCK_SIZE,
        "block of {} bytes exceeds maximum of {MAX_BLOCK_SIZE}",
        raw.len()
    );
    let compressed = lz4_flex::block::compress(raw);
    let mut framed = Vec::with_capacity(BLOCK_HEADER_SIZE + compressed.len());
    framed.extend_from_slice(&(raw.len() as u32).to_le_bytes());
    framed.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    framed.extend_from_slice(&compressed);
    framed
}

/// Decodes the next block from `stream` into `out`.
///
/// Returns `Ok(None)` at a clean end of file, or `Ok(Some(raw_len))` with
/// the decoded bytes in `out[..raw_len]`.
///
/// # Errors
///
/// Returns an error if the header is truncated, the payload is truncated,
/// the declared size exceeds `out`, or the LZ4 payload is malformed.
pub fn decode_block(stream: &mut dyn SliceStream, out: &mut [u8]) -> SourceResult<Option<usize>> {
    let mut header = [0u8; BLOCK_HEADER_SIZE];
    let got = read_full(stream, &mut header)?;
    if got == 0 {
        return Ok(None);
    }
    if got < BLOCK_HEADER_SIZE {
        return Err(SourceError::corrupted(format!(
            "truncated block header: {got} of {BLOCK_HEADER_SIZE} bytes"
        )));
    }

    let raw_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let comp_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

    if raw_len > out.len() {
        return Err(SourceError::corrupted(format!(
            "block declares {raw_len} decoded bytes, caller buffer holds {}",
            out.len()
        )));
    }
    if raw_len > MAX_BLOCK_SIZE {
        return Err(SourceError::corrupted(format!(
            "block declares {raw_len} decoded bytes, maximum is {MAX_BLOCK_SIZE}"
        )));
    }

    let mut payload = vec![0u8; comp_len];
    let got = read_full(stream, &mut payload)?;
    if got < comp_len {
        return Err(SourceError::corrupted(format!(
            "truncated block payload: {got} of {comp_len} bytes"
        )));
    }

    let written = lz4_flex::block::decompress_into(&payload, &mut out[..raw_len])
        .map_err(|e| SourceError::corrupted(format!("lz4 decode failed: {e}")))?;
    if written != raw_len {
        return Err(SourceError::corrupted(format!(
            "block decoded to {written} bytes, header declared {raw_len}"
        )));
    }

    Ok(Some(raw_len))
}

/// Encodes a byte stream into framed blocks of at most `block_size` raw bytes.
///
/// # Panics
///
/// Panics if `block_size` is 0 or exceeds [`MAX_BLOCK_SIZE`].
#[must_use]
pub fn encode_stream(raw: &[u8], block_size: usize) -> Vec<u8> {
    assert!(block_size > 0 && block_size <= MAX_BLOCK_SIZE);
    let mut framed = Vec::new();
    for chunk in raw.chunks(block_size) {
        framed.extend_from_slice(&encode_block(chunk));
    }
    framed
}

/// Walks the block headers of a framed stream and returns the decoded length.
///
/// # Errors
///
/// Returns an error if a header or payload is truncated.
pub fn decoded_len(stream: &mut dyn SliceStream) -> SourceResult<u64> {
    stream.seek_to(0)?;
    let mut total = 0u64;
    let mut offset = 0u64;
    loop {
        let mut header = [0u8; BLOCK_HEADER_SIZE];
        let got = read_full(stream, &mut header)?;
        if got == 0 {
            break;
        }
        if got < BLOCK_HEADER_SIZE {
            return Err(SourceError::corrupted("truncated block header"));
        }
        let raw_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let comp_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;
        total += raw_len;
        offset += BLOCK_HEADER_SIZE as u64 + comp_len;
        stream.seek_to(offset)?;
    }
    stream.seek_to(0)?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;
    use std::sync::Arc;

    fn stream_of(bytes: Vec<u8>) -> MemoryStream {
        MemoryStream::new(Arc::new(bytes))
    }

    #[test]
    fn block_roundtrip() {
        let raw = b"some bytes worth compressing, repeated: some bytes worth compressing";
        let framed = encode_block(raw);
        let mut stream = stream_of(framed);

        let mut out = [0u8; MAX_BLOCK_SIZE];
        let n = decode_block(&mut stream, &mut out).unwrap().unwrap();
        assert_eq!(&out[..n], raw.as_slice());

        // Stream is exhausted after one block.
        assert!(decode_block(&mut stream, &mut out).unwrap().is_none());
    }

    #[test]
    fn multiple_blocks_decode_in_order() {
        let raw: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let framed = encode_stream(&raw, 1024);
        let mut stream = stream_of(framed);

        let mut decoded = Vec::new();
        let mut out = [0u8; MAX_BLOCK_SIZE];
        while let Some(n) = decode_block(&mut stream, &mut out).unwrap() {
            decoded.extend_from_slice(&out[..n]);
        }
        assert_eq!(decoded, raw);
    }

    #[test]
    fn truncated_header_is_corruption() {
        let framed = encode_block(b"data");
        let mut stream = stream_of(framed[..5].to_vec());
        let mut out = [0u8; MAX_BLOCK_SIZE];
        let result = decode_block(&mut stream, &mut out);
        assert!(matches!(result, Err(SourceError::Corrupted(_))));
    }

    #[test]
    fn truncated_payload_is_corruption() {
        let framed = encode_block(b"block payload data");
        let mut stream = stream_of(framed[..framed.len() - 3].to_vec());
        let mut out = [0u8; MAX_BLOCK_SIZE];
        let result = decode_block(&mut stream, &mut out);
        assert!(matches!(result, Err(SourceError::Corrupted(_))));
    }

    #[test]
    fn oversized_declaration_is_corruption() {
        let mut framed = encode_block(b"data");
        // Inflate raw_len past the caller's buffer.
        framed[..4].copy_from_slice(&(1024u32).to_le_bytes());
        let mut stream = stream_of(framed);
        let mut out = [0u8; 16];
        let result = decode_block(&mut stream, &mut out);
        assert!(matches!(result, Err(SourceError::Corrupted(_))));
    }

    #[test]
    fn decoded_len_sums_blocks() {
        let raw: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
        let framed = encode_stream(&raw, 700);
        let mut stream = stream_of(framed);
        assert_eq!(decoded_len(&mut stream).unwrap(), 3000);

        // Cursor is rewound for the subsequent sequential decode.
        let mut out = [0u8; MAX_BLOCK_SIZE];
        assert_eq!(decode_block(&mut stream, &mut out).unwrap(), Some(700));
    }

    #[test]
    fn empty_stream_is_clean_eof() {
        let mut stream = stream_of(Vec::new());
        let mut out = [0u8; 16];
        assert!(decode_block(&mut stream, &mut out).unwrap().is_none());
        assert_eq!(decoded_len(&mut stream).unwrap(), 0);
    }
}
