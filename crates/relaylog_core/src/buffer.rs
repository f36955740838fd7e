//! Buffer coordinator: the seek → rotate → replay → collect pump cycle.

use crate::accumulator::ByteAccumulator;
use crate::config::BufferConfig;
use crate::crc::crc32_partial;
use crate::error::{CoreResult, ReplicationError};
use crate::ring::{RotationKind, RotationRing};
use crate::role::{BufferCtx, ReaderRole, ReplayFn, ReplicaStreamReader, ReplicaStreamWriter, WriterRole};
use crate::types::{LogPosition, PumpProgress};
use relaylog_source::ReplicaProvider;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, trace};

/// Position and checksum counters of one replication buffer.
///
/// The counters order themselves along the stream:
/// `log_pos ≤ log_last_rpos ≤ log_crc32_pos ≤ log_last_wpos`.
#[derive(Debug)]
pub struct BufferState {
    /// The seek origin.
    pub log_pos: LogPosition,
    /// Retirement frontier: bytes below are discarded from the buffer.
    pub log_last_rpos: LogPosition,
    /// Write frontier: bytes below have been delivered by the writer.
    pub log_last_wpos: LogPosition,
    /// Checksum frontier: bytes below are folded into the running CRC.
    pub log_crc32_pos: LogPosition,
    /// Position reached by the last replay-to-completion run.
    pub log_readto_pos: LogPosition,
    /// Running CRC-32 of the stream from the seed through `log_crc32_pos`,
    /// kept as the complement of the raw register - the finalized value.
    pub crc32_complement: u32,
    /// Timestamp seeded at seek time.
    pub first_timestamp: i64,
    /// Newest replayed event timestamp.
    pub last_timestamp: i64,
    /// Configuration applied to this buffer.
    pub config: BufferConfig,
    /// Whether `seek` has been performed.
    pub sought: bool,
    pub(crate) virtual_now: Option<i64>,
}

impl BufferState {
    fn new(config: BufferConfig) -> Self {
        Self {
            log_pos: LogPosition::new(0),
            log_last_rpos: LogPosition::new(0),
            log_last_wpos: LogPosition::new(0),
            log_crc32_pos: LogPosition::new(0),
            log_readto_pos: LogPosition::new(0),
            crc32_complement: 0,
            first_timestamp: 0,
            last_timestamp: 0,
            config,
            sought: false,
            virtual_now: None,
        }
    }

    /// Returns the buffer's notion of the current unix time in seconds.
    ///
    /// A virtual override, when set, replaces the system clock; rotation
    /// grace timing runs against this value.
    #[must_use]
    pub fn now(&self) -> i64 {
        self.virtual_now.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        })
    }
}

/// The replication buffer coordinator.
///
/// Owns the byte accumulator, the rotation ring, the position counters,
/// and the writer/reader roles; exposes the seek and replay entry points.
/// Single-threaded and cooperative: one `pump` call runs one cycle of
/// writer delivery, reader replay, checksum extension, and garbage
/// collection, and never blocks.
pub struct ReplicationBuffer {
    accumulator: ByteAccumulator,
    ring: RotationRing,
    state: BufferState,
    writer: Box<dyn WriterRole>,
    reader: Box<dyn ReaderRole>,
    replay: Box<ReplayFn>,
}

impl ReplicationBuffer {
    /// Wires a buffer from its roles and replay callback.
    #[must_use]
    pub fn new(
        config: BufferConfig,
        writer: Box<dyn WriterRole>,
        reader: Box<dyn ReaderRole>,
        replay: Box<ReplayFn>,
    ) -> Self {
        Self {
            accumulator: ByteAccumulator::new(),
            ring: RotationRing::new(),
            state: BufferState::new(config),
            writer,
            reader,
            replay,
        }
    }

    /// Wires a buffer over a replica provider with the local file roles.
    #[must_use]
    pub fn with_replica(
        config: BufferConfig,
        provider: Box<dyn ReplicaProvider>,
        replay: Box<ReplayFn>,
    ) -> Self {
        Self::new(
            config,
            Box::new(ReplicaStreamWriter::new(provider)),
            Box::new(ReplicaStreamReader::new()),
            replay,
        )
    }

    /// Positions the buffer at `position` with checkpointed seed state.
    ///
    /// Legal exactly once per buffer. `crc_seed` is the finalized CRC-32 of
    /// the stream up to `position`, as recorded by the external checkpoint;
    /// `timestamp` is the checkpointed replay timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer was already sought or the position
    /// cannot be opened.
    pub fn seek(&mut self, position: LogPosition, timestamp: i64, crc_seed: u32) -> CoreResult<()> {
        if self.state.sought {
            return Err(ReplicationError::invalid_operation("buffer already sought"));
        }

        self.state.log_pos = position;
        self.state.log_last_rpos = position;
        self.state.log_last_wpos = position;
        self.state.log_crc32_pos = position;
        self.state.log_readto_pos = position;
        self.state.crc32_complement = crc_seed;
        self.state.first_timestamp = timestamp;
        self.state.last_timestamp = timestamp;

        let point = self.ring.allocate(RotationKind::Seek, position);
        {
            let node = self.ring.get_mut(point);
            node.timestamp = timestamp;
            node.next_position = position;
        }

        if !self.state.config.binlog_disabled && !self.writer.is_sought() {
            let mut ctx = BufferCtx {
                accumulator: &mut self.accumulator,
                ring: &mut self.ring,
                state: &mut self.state,
            };
            self.writer.seek(&mut ctx, point)?;
        }
        {
            let mut ctx = BufferCtx {
                accumulator: &mut self.accumulator,
                ring: &mut self.ring,
                state: &mut self.state,
            };
            self.reader.seek(&mut ctx, point);
        }

        self.state.sought = true;
        info!(position = %position, timestamp, "buffer sought");
        Ok(())
    }

    /// Runs one pump cycle.
    ///
    /// Delivers writer bytes within the backpressure budget, drains the
    /// reader, extends the running checksum over newly retired bytes,
    /// trims the accumulator, and collects stale rotation points.
    ///
    /// # Errors
    ///
    /// Propagates fatal writer, rotation, and replay errors; transient
    /// stalls surface only as missing progress.
    pub fn pump(&mut self) -> CoreResult<PumpProgress> {
        if !self.state.sought {
            return Err(ReplicationError::invalid_operation("pump before seek"));
        }
        let mut progress = PumpProgress::default();

        if !self.state.config.binlog_disabled {
            let buffered = self.accumulator.total_bytes();
            let budget = self.state.config.max_write_threshold.saturating_sub(buffered);
            if budget > self.state.config.min_write_threshold {
                let mut ctx = BufferCtx {
                    accumulator: &mut self.accumulator,
                    ring: &mut self.ring,
                    state: &mut self.state,
                };
                let wrote = self.writer.try_read(&mut ctx, budget)?;
                progress.wrote = wrote > 0;
            }
        }

        {
            let target = self.state.log_last_wpos;
            let mut ctx = BufferCtx {
                accumulator: &mut self.accumulator,
                ring: &mut self.ring,
                state: &mut self.state,
            };
            let read = self
                .reader
                .work(&mut ctx, self.writer.as_mut(), self.replay.as_mut(), target)?;
            progress.read = read > 0;
        }

        let visible = self
            .reader
            .stored_position()
            .unwrap_or_else(|| self.reader.cursor());
        let watermark = visible.min(self.state.log_last_wpos);

        if watermark > self.state.log_last_rpos {
            let pending = watermark.distance_from(self.state.log_last_rpos);
            let flush_now = !self.state.config.flush_rarely
                || pending >= self.state.config.max_write_threshold / 4
                || !progress.any();
            if flush_now {
                self.retire_through(watermark);
                self.collect_rotation_points(watermark);
            }
        }

        Ok(progress)
    }

    /// Loops [`Self::pump`] until a cycle makes no progress.
    ///
    /// With `set_virtual_clock`, the buffer's notion of "now" is pinned to
    /// the newest replayed timestamp for the duration and restored
    /// afterwards, so retry timing runs in log time during catch-up.
    ///
    /// Returns the position replay reached.
    ///
    /// # Errors
    ///
    /// Propagates the first fatal error.
    pub fn replay_to_completion(&mut self, set_virtual_clock: bool) -> CoreResult<LogPosition> {
        let saved = self.state.virtual_now;
        if set_virtual_clock {
            self.state.virtual_now = Some(self.state.last_timestamp);
        }
        let outcome = loop {
            match self.pump() {
                Ok(progress) if progress.any() => {}
                Ok(_) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        if set_virtual_clock {
            self.state.virtual_now = saved;
        }
        outcome?;
        self.state.log_readto_pos = self.reader.cursor();
        Ok(self.state.log_readto_pos)
    }

    /// Extends the running checksum through `through` on demand.
    ///
    /// Covers bytes the writer has delivered but no pump cycle has retired
    /// yet. Returns the finalized checksum; a no-op when checksum
    /// evaluation is disabled or `through` is already covered.
    ///
    /// # Errors
    ///
    /// Returns an error if `through` is beyond the written frontier.
    pub fn relax_crc32(&mut self, through: LogPosition) -> CoreResult<u32> {
        if self.state.config.crc32_eval_disabled() {
            return Ok(self.state.crc32_complement);
        }
        if through > self.state.log_last_wpos {
            return Err(ReplicationError::invalid_operation(format!(
                "relax through {through} beyond written frontier {}",
                self.state.log_last_wpos
            )));
        }
        if through > self.state.log_crc32_pos {
            let offset = self.state.log_crc32_pos.distance_from(self.state.log_last_rpos);
            let len = through.distance_from(self.state.log_crc32_pos);
            let mut crc = self.state.crc32_complement;
            self.accumulator.process_range(offset, len, |window| {
                crc = crc32_partial(crc, window);
            });
            self.state.crc32_complement = crc;
            self.state.log_crc32_pos = through;
        }
        Ok(self.state.crc32_complement)
    }

    /// Records the newest replayed event timestamp.
    ///
    /// Fed by the event-interpretation layer above the replay callback.
    /// While the writer is parked on a pending slice end, the boundary's
    /// recorded timestamp follows along so rotation bookkeeping stays
    /// consistent. Ignored when timestamp recording is disabled.
    pub fn note_timestamp(&mut self, timestamp: i64) {
        if self.state.config.disable_timestamp_write {
            return;
        }
        self.state.last_timestamp = timestamp;
        if let Some(point) = self.writer.pending_rotation() {
            self.ring.get_mut(point).timestamp = timestamp;
        }
    }

    /// Sets or clears the externally acknowledged position.
    ///
    /// When set, retirement holds at the acknowledged position instead of
    /// the raw replay cursor, retaining history the consumer has seen but
    /// not yet persisted.
    pub fn set_stored_position(&mut self, position: Option<LogPosition>) {
        self.reader.set_stored_position(position);
    }

    /// Overrides the buffer's clock; `None` returns to the system clock.
    pub fn set_virtual_time(&mut self, now: Option<i64>) {
        self.state.virtual_now = now;
    }

    /// Returns the buffer's counters.
    #[must_use]
    pub fn state(&self) -> &BufferState {
        &self.state
    }

    /// Returns the finalized running checksum.
    #[must_use]
    pub fn crc32(&self) -> u32 {
        self.state.crc32_complement
    }

    /// Returns the replay cursor.
    #[must_use]
    pub fn cursor(&self) -> LogPosition {
        self.reader.cursor()
    }

    /// Returns the buffered, not-yet-retired byte count.
    #[must_use]
    pub fn buffered_bytes(&self) -> u64 {
        self.accumulator.total_bytes()
    }

    /// Returns the number of live rotation points, excluding the sentinel.
    #[must_use]
    pub fn rotation_points(&self) -> usize {
        self.ring.len()
    }

    /// Extends the checksum over newly retired bytes and trims them.
    fn retire_through(&mut self, watermark: LogPosition) {
        if !self.state.config.crc32_eval_disabled() && watermark > self.state.log_crc32_pos {
            let offset = self.state.log_crc32_pos.distance_from(self.state.log_last_rpos);
            let len = watermark.distance_from(self.state.log_crc32_pos);
            let mut crc = self.state.crc32_complement;
            self.accumulator.process_range(offset, len, |window| {
                crc = crc32_partial(crc, window);
            });
            self.state.crc32_complement = crc;
        }
        if watermark > self.state.log_crc32_pos {
            self.state.log_crc32_pos = watermark;
        }
        let discard = watermark.distance_from(self.state.log_last_rpos);
        self.accumulator.advance_and_discard(discard);
        self.state.log_last_rpos = watermark;
    }

    /// Frees rotation points the watermark has passed.
    fn collect_rotation_points(&mut self, watermark: LogPosition) {
        loop {
            let first = self.ring.first();
            if self.ring.is_sentinel(first) {
                break;
            }
            let node = self.ring.get(first);
            if node.position >= watermark || node.ref_count() > 0 {
                break;
            }
            trace!(position = %node.position, "freeing rotation point");
            self.ring.free(first, watermark);
        }
    }
}

impl std::fmt::Debug for ReplicationBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationBuffer")
            .field("state", &self.state)
            .field("buffered", &self.accumulator.total_bytes())
            .field("rotation_points", &self.ring.len())
            .finish_non_exhaustive()
    }
}
