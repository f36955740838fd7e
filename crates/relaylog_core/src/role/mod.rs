//! Writer and reader roles bridging the buffer to its collaborators.
//!
//! The roles are the polymorphic seams of the buffer: the writer pulls
//! bytes from the physical source into the accumulator, the reader drains
//! them through the replay callback and drives rotation. One concrete
//! implementation of each exists today - [`ReplicaStreamWriter`] and
//! [`ReplicaStreamReader`] over a local replica file - but the coordinator
//! only ever sees the traits.

mod reader;
mod writer;

pub use reader::ReplicaStreamReader;
pub use writer::{ReplicaStreamWriter, ROTATION_GRACE_SECS};

use crate::accumulator::ByteAccumulator;
use crate::buffer::BufferState;
use crate::error::CoreResult;
use crate::ring::{RotationPointId, RotationRing};
use crate::types::LogPosition;

/// Mutable view of the buffer internals shared with the roles.
///
/// The coordinator owns the accumulator, ring, and state; it lends them to
/// a role for the duration of one call.
pub struct BufferCtx<'a> {
    /// The buffered, not-yet-retired log bytes.
    pub accumulator: &'a mut ByteAccumulator,
    /// The rotation point ring.
    pub ring: &'a mut RotationRing,
    /// The coordinator's position and checksum counters.
    pub state: &'a mut BufferState,
}

/// Result of a rotation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// The successor file was opened; reading continues.
    Rotated,
    /// The successor file has not appeared yet; retry on a later pump.
    StopReading,
}

/// Verdict of the replay callback for one offered span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayStatus {
    /// The callback consumed this many bytes (at most the span length).
    Consumed(usize),
    /// The span does not hold a complete unit; offer more bytes later.
    NotEnoughData,
    /// Unrecoverable interpretation failure; replication must stop.
    Error(String),
}

/// The event-interpretation callback fed by the reader.
pub type ReplayFn = dyn FnMut(&[u8]) -> ReplayStatus + Send;

/// Pulls bytes from the physical source into the buffer.
pub trait WriterRole: Send {
    /// Opens the file containing the seek point and positions within it.
    ///
    /// # Errors
    ///
    /// Returns an error if no file covers the position or opening fails.
    fn seek(&mut self, ctx: &mut BufferCtx<'_>, point: RotationPointId) -> CoreResult<()>;

    /// Advances to the file following the one ending at `prev`.
    ///
    /// # Errors
    ///
    /// Returns an error once the rotation grace period is exhausted or the
    /// successor cannot be opened.
    fn rotate(&mut self, ctx: &mut BufferCtx<'_>, prev: RotationPointId) -> CoreResult<RotateOutcome>;

    /// Delivers up to `max_len` bytes into the accumulator.
    ///
    /// Returns the bytes delivered; 0 means no bytes are available right
    /// now (end of slice, or an empty budget). A compressed source decodes
    /// exactly one block regardless of `max_len`.
    ///
    /// # Errors
    ///
    /// Returns an error on an OS-level read failure.
    fn try_read(&mut self, ctx: &mut BufferCtx<'_>, max_len: u64) -> CoreResult<u64>;

    /// Returns `true` once the writer has been positioned by a seek.
    fn is_sought(&self) -> bool;

    /// Returns the slice-end point the writer is parked on, if it has
    /// exhausted its file and awaits rotation.
    fn pending_rotation(&self) -> Option<RotationPointId>;
}

/// Drains buffered bytes through the replay callback.
pub trait ReaderRole: Send {
    /// Positions the cursor at the seek point.
    fn seek(&mut self, ctx: &mut BufferCtx<'_>, point: RotationPointId);

    /// Advances the cursor toward `target`, replaying available spans and
    /// rotating at slice boundaries.
    ///
    /// Returns the bytes consumed during this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the replay callback fails or rotation turns
    /// fatal.
    fn work(
        &mut self,
        ctx: &mut BufferCtx<'_>,
        writer: &mut dyn WriterRole,
        replay: &mut ReplayFn,
        target: LogPosition,
    ) -> CoreResult<u64>;

    /// Returns the replay cursor.
    fn cursor(&self) -> LogPosition;

    /// Returns the externally acknowledged position, when history
    /// retention is in force.
    fn stored_position(&self) -> Option<LogPosition>;

    /// Sets or clears the externally acknowledged position.
    fn set_stored_position(&mut self, position: Option<LogPosition>);
}
