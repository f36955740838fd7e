//! Append/consume byte queue for not-yet-replayed log bytes.
//!
//! The accumulator sits between the writer role (which appends bytes pulled
//! from the physical source) and the reader role (which drains them through
//! the replay callback). Bytes live in a list of chunks; the front of the
//! queue always corresponds to the buffer's last retired position and the
//! back to the last written position.
//!
//! Range operations visit the underlying chunks in place - checksum
//! extension and decryption never copy. A reservation appends one
//! zero-filled contiguous chunk that a vectored read fills afterwards;
//! [`ByteAccumulator::trunc`] discards the unfilled tail when the read came
//! up short.

use std::collections::VecDeque;
use std::io::IoSliceMut;

struct Chunk {
    data: Vec<u8>,
    /// Consumed prefix; live bytes are `data[start..]`.
    start: usize,
}

impl Chunk {
    fn live(&self) -> usize {
        self.data.len() - self.start
    }
}

/// A chunked byte queue with in-place range access.
#[derive(Default)]
pub struct ByteAccumulator {
    chunks: VecDeque<Chunk>,
    total: u64,
}

impl ByteAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of buffered bytes.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    /// Appends bytes to the back of the queue.
    pub fn push(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.total += bytes.len() as u64;
        self.chunks.push_back(Chunk {
            data: bytes.to_vec(),
            start: 0,
        });
    }

    /// Appends one zero-filled contiguous chunk of `len` bytes.
    ///
    /// The reservation is filled in place via [`Self::fill_back`] or
    /// [`Self::process_range`]; the unused tail is discarded with
    /// [`Self::trunc`].
    pub fn reserve(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        self.total += len as u64;
        self.chunks.push_back(Chunk {
            data: vec![0u8; len],
            start: 0,
        });
    }

    /// Visits the chunk windows covering `[offset, offset + len)` in place.
    ///
    /// The visitor receives each window in stream order and may mutate it;
    /// the accumulator never copies.
    ///
    /// # Panics
    ///
    /// Panics if the range extends past the buffered bytes.
    pub fn process_range<F>(&mut self, offset: u64, len: u64, mut visitor: F)
    where
        F: FnMut(&mut [u8]),
    {
        assert!(
            offset + len <= self.total,
            "range [{offset}, {}) outside {} buffered bytes",
            offset + len,
            self.total
        );
        let mut skip = offset;
        let mut remaining = len;
        for chunk in self.chunks.iter_mut() {
            if remaining == 0 {
                break;
            }
            let live = chunk.live() as u64;
            if skip >= live {
                skip -= live;
                continue;
            }
            let begin = chunk.start + skip as usize;
            let take = (live - skip).min(remaining) as usize;
            skip = 0;
            remaining -= take as u64;
            visitor(&mut chunk.data[begin..begin + take]);
        }
    }

    /// Exposes the trailing `len` bytes as a scatter/gather descriptor list.
    ///
    /// Used to fill a reservation with a single vectored read.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `len` bytes are buffered.
    pub fn fill_back<R>(&mut self, len: u64, f: impl FnOnce(&mut [IoSliceMut<'_>]) -> R) -> R {
        assert!(len <= self.total, "fill_back of {len} exceeds {} buffered", self.total);
        let mut skip = self.total - len;
        let mut descriptors: Vec<IoSliceMut<'_>> = Vec::new();
        for chunk in self.chunks.iter_mut() {
            let live = chunk.live() as u64;
            if skip >= live {
                skip -= live;
                continue;
            }
            let begin = chunk.start + skip as usize;
            skip = 0;
            descriptors.push(IoSliceMut::new(&mut chunk.data[begin..]));
        }
        f(&mut descriptors)
    }

    /// Returns the contiguous span starting at `offset`.
    ///
    /// The span ends at its chunk boundary, so it may be shorter than the
    /// bytes buffered past `offset`; an offset at or past the back returns
    /// an empty slice.
    #[must_use]
    pub fn span_at(&self, offset: u64) -> &[u8] {
        let mut skip = offset;
        for chunk in &self.chunks {
            let live = chunk.live() as u64;
            if skip >= live {
                skip -= live;
                continue;
            }
            return &chunk.data[chunk.start + skip as usize..];
        }
        &[]
    }

    /// Merges front chunks until at least `len` bytes are contiguous.
    ///
    /// Capped at the buffered total. Only called when a replay span was cut
    /// short by a chunk boundary, so the copy is the exception, not the
    /// rule.
    pub fn coalesce_front(&mut self, len: u64) {
        let target = len.min(self.total);
        if target == 0 {
            return;
        }
        if self.chunks.front().map(|c| c.live() as u64 >= target) == Some(true) {
            return;
        }
        let mut merged: Vec<u8> = Vec::with_capacity(target as usize);
        while (merged.len() as u64) < target {
            let chunk = self.chunks.pop_front().expect("target within total");
            merged.extend_from_slice(&chunk.data[chunk.start..]);
        }
        self.chunks.push_front(Chunk {
            data: merged,
            start: 0,
        });
    }

    /// Discards the most recently appended `n` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the buffered total.
    pub fn trunc(&mut self, mut n: u64) {
        assert!(n <= self.total, "trunc of {n} exceeds {} buffered", self.total);
        self.total -= n;
        while n > 0 {
            let back = self.chunks.back_mut().expect("bytes remain while n > 0");
            let live = back.live() as u64;
            if n >= live {
                n -= live;
                self.chunks.pop_back();
            } else {
                let keep = back.data.len() - n as usize;
                back.data.truncate(keep);
                n = 0;
            }
        }
    }

    /// Consumes and frees `n` bytes from the front.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the buffered total.
    pub fn advance_and_discard(&mut self, mut n: u64) {
        assert!(n <= self.total, "discard of {n} exceeds {} buffered", self.total);
        self.total -= n;
        while n > 0 {
            let front = self.chunks.front_mut().expect("bytes remain while n > 0");
            let live = front.live() as u64;
            if n >= live {
                n -= live;
                self.chunks.pop_front();
            } else {
                front.start += n as usize;
                n = 0;
            }
        }
    }
}

impl std::fmt::Debug for ByteAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteAccumulator")
            .field("total", &self.total)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(acc: &ByteAccumulator) -> Vec<u8> {
        let mut out = Vec::new();
        let mut offset = 0;
        loop {
            let span = acc.span_at(offset);
            if span.is_empty() {
                break;
            }
            out.extend_from_slice(span);
            offset += span.len() as u64;
        }
        out
    }

    #[test]
    fn push_and_total() {
        let mut acc = ByteAccumulator::new();
        assert_eq!(acc.total_bytes(), 0);
        acc.push(b"hello");
        acc.push(b" world");
        assert_eq!(acc.total_bytes(), 11);
        assert_eq!(collect(&acc), b"hello world");
    }

    #[test]
    fn advance_consumes_from_front() {
        let mut acc = ByteAccumulator::new();
        acc.push(b"abc");
        acc.push(b"defg");

        acc.advance_and_discard(2);
        assert_eq!(acc.total_bytes(), 5);
        assert_eq!(collect(&acc), b"cdefg");

        // Across the chunk boundary.
        acc.advance_and_discard(3);
        assert_eq!(collect(&acc), b"fg");
    }

    #[test]
    fn trunc_discards_from_back() {
        let mut acc = ByteAccumulator::new();
        acc.push(b"abc");
        acc.push(b"defg");

        acc.trunc(2);
        assert_eq!(collect(&acc), b"abcde");

        // Across the chunk boundary.
        acc.trunc(3);
        assert_eq!(collect(&acc), b"ab");
    }

    #[test]
    fn reserve_and_fill_back() {
        let mut acc = ByteAccumulator::new();
        acc.push(b"head");
        acc.reserve(8);

        let filled = acc.fill_back(8, |descriptors| {
            assert_eq!(descriptors.len(), 1);
            let n = descriptors[0].len().min(5);
            descriptors[0][..n].copy_from_slice(&b"12345"[..n]);
            n
        });
        assert_eq!(filled, 5);

        // Undo the speculative part of the reservation.
        acc.trunc(8 - filled as u64);
        assert_eq!(collect(&acc), b"head12345");
    }

    #[test]
    fn fill_back_spans_chunks() {
        let mut acc = ByteAccumulator::new();
        acc.reserve(3);
        acc.reserve(4);

        acc.fill_back(7, |descriptors| {
            assert_eq!(descriptors.len(), 2);
            descriptors[0].copy_from_slice(b"abc");
            descriptors[1].copy_from_slice(b"defg");
        });
        assert_eq!(collect(&acc), b"abcdefg");
    }

    #[test]
    fn process_range_visits_windows_in_order() {
        let mut acc = ByteAccumulator::new();
        acc.push(b"aaa");
        acc.push(b"bbbb");
        acc.push(b"cc");

        let mut seen = Vec::new();
        acc.process_range(2, 6, |window| seen.push(window.to_vec()));
        assert_eq!(seen, vec![b"a".to_vec(), b"bbbb".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn process_range_mutates_in_place() {
        let mut acc = ByteAccumulator::new();
        acc.push(b"abc");
        acc.push(b"def");

        acc.process_range(1, 4, |window| {
            for byte in window.iter_mut() {
                *byte = byte.to_ascii_uppercase();
            }
        });
        assert_eq!(collect(&acc), b"aBCDEf");
    }

    #[test]
    fn process_range_respects_consumed_front() {
        let mut acc = ByteAccumulator::new();
        acc.push(b"xxabc");
        acc.advance_and_discard(2);

        let mut seen = Vec::new();
        acc.process_range(0, 3, |window| seen.push(window.to_vec()));
        assert_eq!(seen, vec![b"abc".to_vec()]);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn process_range_past_end_panics() {
        let mut acc = ByteAccumulator::new();
        acc.push(b"abc");
        acc.process_range(1, 3, |_| {});
    }

    #[test]
    fn span_at_is_chunk_bounded() {
        let mut acc = ByteAccumulator::new();
        acc.push(b"abc");
        acc.push(b"def");

        assert_eq!(acc.span_at(0), b"abc");
        assert_eq!(acc.span_at(2), b"c");
        assert_eq!(acc.span_at(3), b"def");
        assert_eq!(acc.span_at(6), b"");
    }

    #[test]
    fn coalesce_front_merges_chunks() {
        let mut acc = ByteAccumulator::new();
        acc.push(b"ab");
        acc.push(b"cd");
        acc.push(b"ef");

        acc.coalesce_front(5);
        assert_eq!(acc.span_at(0), b"abcdef");
        assert_eq!(acc.total_bytes(), 6);
    }

    #[test]
    fn coalesce_front_noop_when_contiguous() {
        let mut acc = ByteAccumulator::new();
        acc.push(b"abcdef");
        acc.coalesce_front(4);
        assert_eq!(acc.span_at(0), b"abcdef");
    }

    #[test]
    fn coalesce_front_caps_at_total() {
        let mut acc = ByteAccumulator::new();
        acc.push(b"ab");
        acc.push(b"cd");
        acc.coalesce_front(100);
        assert_eq!(acc.span_at(0), b"abcd");
    }
}
