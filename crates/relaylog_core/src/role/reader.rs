//! Local replica file reader role.

use crate::error::{CoreResult, ReplicationError};
use crate::ring::{RotationKind, RotationPointId};
use crate::role::{BufferCtx, ReaderRole, ReplayFn, ReplayStatus, RotateOutcome, WriterRole};
use crate::types::LogPosition;

/// Reader role draining buffered bytes through the replay callback.
///
/// The cursor advances strictly within the current slice; reaching a
/// slice-end boundary exactly triggers rotation through the writer and the
/// cursor's ring reference moves to the new slice. The cursor never passes
/// bytes the writer has not delivered.
pub struct ReplicaStreamReader {
    point: Option<RotationPointId>,
    cursor: LogPosition,
    stored: Option<LogPosition>,
    sought: bool,
}

impl ReplicaStreamReader {
    /// Creates an unsought reader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            point: None,
            cursor: LogPosition::new(0),
            stored: None,
            sought: false,
        }
    }
}

impl Default for ReplicaStreamReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderRole for ReplicaStreamReader {
    fn seek(&mut self, ctx: &mut BufferCtx<'_>, point: RotationPointId) {
        self.cursor = ctx.ring.get(point).position;
        ctx.ring.assign(&mut self.point, Some(point));
        self.sought = true;
    }

    fn work(
        &mut self,
        ctx: &mut BufferCtx<'_>,
        writer: &mut dyn WriterRole,
        replay: &mut ReplayFn,
        target: LogPosition,
    ) -> CoreResult<u64> {
        assert!(self.sought, "reader used before seek");
        let mut consumed = 0u64;

        loop {
            let point = self.point.expect("sought reader holds a rotation point");
            let boundary = ctx.ring.next_after(point);
            let boundary_pos = ctx.ring.get(boundary).position;
            let boundary_kind = ctx.ring.get(boundary).kind;

            if self.cursor == boundary_pos {
                match boundary_kind {
                    RotationKind::Seek => {
                        panic!("crossed a seek point mid-stream at {}", self.cursor)
                    }
                    RotationKind::Undefined => {
                        unreachable!("replay cursor reached the tail sentinel")
                    }
                    RotationKind::SliceEnd => match writer.rotate(ctx, boundary)? {
                        RotateOutcome::StopReading => break,
                        RotateOutcome::Rotated => {
                            ctx.ring.assign(&mut self.point, Some(boundary));
                            continue;
                        }
                    },
                }
            }

            if self.cursor >= target {
                break;
            }
            let limit = if boundary_pos < target { boundary_pos } else { target };
            let avail = limit.distance_from(self.cursor);
            if avail == 0 {
                break;
            }

            let offset = self.cursor.distance_from(ctx.state.log_last_rpos);
            let span = ctx.accumulator.span_at(offset);
            if span.is_empty() {
                break;
            }
            let take = (span.len() as u64).min(avail) as usize;

            match replay(&span[..take]) {
                ReplayStatus::Consumed(n) => {
                    assert!(
                        n <= take,
                        "replay callback consumed {n} of {take} offered bytes"
                    );
                    self.cursor = self.cursor.advance(n as u64);
                    consumed += n as u64;
                    if n < take {
                        break;
                    }
                }
                ReplayStatus::NotEnoughData => {
                    if (take as u64) < avail {
                        // The span was cut by a chunk boundary, not by
                        // availability; make the window contiguous and retry.
                        ctx.accumulator.coalesce_front(offset + avail);
                        continue;
                    }
                    break;
                }
                ReplayStatus::Error(message) => {
                    return Err(ReplicationError::Replay {
                        position: self.cursor,
                        message,
                    });
                }
            }
        }

        Ok(consumed)
    }

    fn cursor(&self) -> LogPosition {
        self.cursor
    }

    fn stored_position(&self) -> Option<LogPosition> {
        self.stored
    }

    fn set_stored_position(&mut self, position: Option<LogPosition>) {
        self.stored = position;
    }
}

impl std::fmt::Debug for ReplicaStreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaStreamReader")
            .field("cursor", &self.cursor)
            .field("sought", &self.sought)
            .finish_non_exhaustive()
    }
}
