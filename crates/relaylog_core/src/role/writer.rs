//! Local replica file writer role.

use crate::error::{CoreResult, ReplicationError};
use crate::ring::{RotationKind, RotationPointId};
use crate::role::{BufferCtx, RotateOutcome, WriterRole};
use crate::types::LogPosition;
use relaylog_source::{ReplicaProvider, SliceHandle, SourceResult, StreamCipher};
use tracing::{debug, error, info, warn};

/// Seconds a missing successor file is tolerated before rotation turns
/// fatal.
pub const ROTATION_GRACE_SECS: i64 = 120;

/// Writer role over a replica file provider.
///
/// Pulls bytes from the current physical file into the accumulator,
/// decrypting or decoding as the file's metadata demands, and parks on a
/// slice-end rotation point when the file is exhausted until the reader
/// catches up and triggers rotation.
pub struct ReplicaStreamWriter {
    provider: Box<dyn ReplicaProvider>,
    slice: Option<SliceHandle>,
    point: Option<RotationPointId>,
    cipher: Option<StreamCipher>,
    /// Decoded bytes still to discard after a seek into a compressed file.
    skip_remaining: u64,
    at_end: bool,
    sought: bool,
    rotate_failed_since: Option<i64>,
    rotate_attempts: u32,
}

impl ReplicaStreamWriter {
    /// Creates a writer over the given replica.
    #[must_use]
    pub fn new(provider: Box<dyn ReplicaProvider>) -> Self {
        Self {
            provider,
            slice: None,
            point: None,
            cipher: None,
            skip_remaining: 0,
            at_end: false,
            sought: false,
            rotate_failed_since: None,
            rotate_attempts: 0,
        }
    }

    /// Allocates the slice-end point for the exhausted file and parks on it.
    fn mark_end_of_slice(&mut self, ctx: &mut BufferCtx<'_>) {
        let position = ctx.state.log_last_wpos;
        let timestamp = if ctx.state.config.disable_timestamp_write {
            0
        } else {
            ctx.state.last_timestamp
        };
        let id = ctx.ring.allocate(RotationKind::SliceEnd, position);
        {
            let node = ctx.ring.get_mut(id);
            node.timestamp = timestamp;
            node.next_position = position;
        }
        ctx.ring.assign(&mut self.point, Some(id));
        self.at_end = true;
        debug!(position = %position, "end of slice, awaiting rotation");
    }

    fn read_plain(&mut self, ctx: &mut BufferCtx<'_>, max_len: u64) -> CoreResult<u64> {
        let want = max_len as usize;
        if want == 0 {
            return Ok(0);
        }

        let slice = self.slice.as_mut().expect("sought writer has a slice");
        ctx.accumulator.reserve(want);
        let read_result: SourceResult<usize> = ctx
            .accumulator
            .fill_back(want as u64, |descriptors| {
                slice.stream_mut().read_vectored(descriptors)
            });
        let got = match read_result {
            Ok(n) => n,
            Err(e) => {
                ctx.accumulator.trunc(want as u64);
                return Err(e.into());
            }
        };
        ctx.accumulator.trunc((want - got) as u64);

        if got == 0 {
            self.mark_end_of_slice(ctx);
            return Ok(0);
        }

        if let Some(cipher) = &self.cipher {
            let point = self.point.expect("sought writer holds a rotation point");
            let slice_start = ctx.ring.get(point).slice_start;
            let content_offset = self
                .slice
                .as_ref()
                .expect("sought writer has a slice")
                .content_offset();
            let mut offset = ctx.state.log_last_wpos.distance_from(slice_start) + content_offset;
            let total = ctx.accumulator.total_bytes();
            ctx.accumulator
                .process_range(total - got as u64, got as u64, |window| {
                    cipher.apply_keystream(window, offset);
                    offset += window.len() as u64;
                });
        }

        ctx.state.log_last_wpos = ctx.state.log_last_wpos.advance(got as u64);
        Ok(got as u64)
    }

    fn read_compressed(&mut self, ctx: &mut BufferCtx<'_>) -> CoreResult<u64> {
        let max_block = self
            .slice
            .as_ref()
            .expect("sought writer has a slice")
            .max_block_size();

        // Decode and discard until the seek target is reached.
        while self.skip_remaining > 0 {
            let mut scratch = vec![0u8; max_block];
            let decoded = self
                .slice
                .as_mut()
                .expect("sought writer has a slice")
                .decode_next_block(&mut scratch)?;
            let Some(n) = decoded else {
                self.mark_end_of_slice(ctx);
                return Ok(0);
            };
            let skip = self.skip_remaining.min(n as u64) as usize;
            self.skip_remaining -= skip as u64;
            if skip < n {
                ctx.accumulator.push(&scratch[skip..n]);
                let delivered = (n - skip) as u64;
                ctx.state.log_last_wpos = ctx.state.log_last_wpos.advance(delivered);
                return Ok(delivered);
            }
        }

        // Decode exactly one block into a speculative reservation sized for
        // the worst case, then give back the unused tail.
        let reserved_at = ctx.accumulator.total_bytes();
        ctx.accumulator.reserve(max_block);
        let mut decoded: SourceResult<Option<usize>> = Ok(None);
        {
            let slice = self.slice.as_mut().expect("sought writer has a slice");
            ctx.accumulator
                .process_range(reserved_at, max_block as u64, |window| {
                    decoded = slice.decode_next_block(window);
                });
        }
        match decoded {
            Ok(Some(n)) => {
                ctx.accumulator.trunc((max_block - n) as u64);
                ctx.state.log_last_wpos = ctx.state.log_last_wpos.advance(n as u64);
                Ok(n as u64)
            }
            Ok(None) => {
                ctx.accumulator.trunc(max_block as u64);
                self.mark_end_of_slice(ctx);
                Ok(0)
            }
            Err(e) => {
                ctx.accumulator.trunc(max_block as u64);
                Err(e.into())
            }
        }
    }
}

impl WriterRole for ReplicaStreamWriter {
    fn seek(&mut self, ctx: &mut BufferCtx<'_>, point: RotationPointId) -> CoreResult<()> {
        let target = ctx.ring.get(point).position;
        let mut handle = self.provider.open(target.as_i64())?;
        let base = LogPosition::new(handle.base_position());
        let in_slice = target.distance_from(base);
        let content_offset = handle.content_offset();

        if handle.is_compressed() {
            handle.stream_mut().seek_to(content_offset)?;
            self.skip_remaining = in_slice;
        } else {
            handle.stream_mut().seek_to(in_slice + content_offset)?;
            self.skip_remaining = 0;
        }

        ctx.ring.get_mut(point).slice_start = base;
        self.cipher = handle.cipher().cloned();
        info!(position = %target, file = handle.file_name(), "writer sought");
        self.slice = Some(handle);
        self.at_end = false;
        self.sought = true;
        ctx.ring.assign(&mut self.point, Some(point));
        Ok(())
    }

    fn rotate(&mut self, ctx: &mut BufferCtx<'_>, prev: RotationPointId) -> CoreResult<RotateOutcome> {
        let current = self.slice.as_ref().expect("rotation requires an open slice");
        let mut next = self.provider.next_file(current)?;
        if next.is_none() {
            // The replica may simply not have published the file yet.
            self.provider.refresh_replica_metadata()?;
            let current = self.slice.as_ref().expect("rotation requires an open slice");
            next = self.provider.next_file(current)?;
        }

        let Some(mut handle) = next else {
            let now = ctx.state.now();
            let since = *self.rotate_failed_since.get_or_insert(now);
            self.rotate_attempts += 1;
            let waited = now - since;
            if waited < ROTATION_GRACE_SECS {
                warn!(
                    attempts = self.rotate_attempts,
                    waited, "next binlog file not available yet"
                );
                return Ok(RotateOutcome::StopReading);
            }
            let file_name = self
                .slice
                .as_ref()
                .map(|s| s.file_name().to_string())
                .unwrap_or_default();
            error!(file = %file_name, waited, "rotation stalled beyond grace period");
            return Err(ReplicationError::RotationStalled {
                file_name,
                position: ctx.ring.get(prev).position,
                waited_secs: waited,
            });
        };

        // The boundary bookkeeping must agree exactly with the buffer's
        // last-seen state; divergence means corrupted rotation tracking.
        {
            let node = ctx.ring.get(prev);
            assert!(
                node.kind == RotationKind::SliceEnd,
                "rotating a {:?} point at {}",
                node.kind,
                node.position
            );
            assert!(
                node.position == ctx.state.log_last_wpos,
                "rotation position mismatch: point at {}, written to {}",
                node.position,
                ctx.state.log_last_wpos
            );
            if !ctx.state.config.disable_timestamp_write {
                assert!(
                    node.timestamp == ctx.state.last_timestamp,
                    "rotation timestamp mismatch: point at {}, buffer at {}",
                    node.timestamp,
                    ctx.state.last_timestamp
                );
            }
            assert!(
                handle.base_position() == node.next_position.as_i64(),
                "successor file based at {} does not continue at {}",
                handle.base_position(),
                node.next_position
            );
        }

        let content_offset = handle.content_offset();
        handle.stream_mut().seek_to(content_offset)?;
        ctx.ring.get_mut(prev).slice_start = LogPosition::new(handle.base_position());

        self.cipher = handle.cipher().cloned();
        debug!(
            file = handle.file_name(),
            position = %ctx.state.log_last_wpos,
            "rotated to next binlog file"
        );
        self.slice = Some(handle);
        self.skip_remaining = 0;
        self.at_end = false;
        self.rotate_failed_since = None;
        self.rotate_attempts = 0;
        ctx.ring.assign(&mut self.point, Some(prev));
        Ok(RotateOutcome::Rotated)
    }

    fn try_read(&mut self, ctx: &mut BufferCtx<'_>, max_len: u64) -> CoreResult<u64> {
        if !self.sought || self.at_end || self.slice.is_none() {
            return Ok(0);
        }
        if self
            .slice
            .as_ref()
            .expect("checked above")
            .is_compressed()
        {
            self.read_compressed(ctx)
        } else {
            self.read_plain(ctx, max_len)
        }
    }

    fn is_sought(&self) -> bool {
        self.sought
    }

    fn pending_rotation(&self) -> Option<RotationPointId> {
        if self.at_end {
            self.point
        } else {
            None
        }
    }
}

impl std::fmt::Debug for ReplicaStreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaStreamWriter")
            .field("sought", &self.sought)
            .field("at_end", &self.at_end)
            .field("skip_remaining", &self.skip_remaining)
            .finish_non_exhaustive()
    }
}
