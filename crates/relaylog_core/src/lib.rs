//! # Relaylog Core
//!
//! Replication buffer engine for Relaylog.
//!
//! The buffer ingests an append-only binlog that spans multiple physical
//! files - possibly compressed or encrypted - and exposes it to a consumer
//! as one gapless logical byte stream, resumable from any prior position.
//!
//! This crate provides:
//! - The buffer coordinator running the seek → rotate → replay → collect
//!   pump cycle ([`ReplicationBuffer`])
//! - Reference-counted rotation point tracking ([`RotationRing`])
//! - The backpressure-bounded byte accumulator ([`ByteAccumulator`])
//! - Writer and reader roles bridging to the physical source and the
//!   replay callback ([`WriterRole`], [`ReaderRole`])
//! - The checksum engine: incremental CRC, CRC combine without rescanning,
//!   and single-bit corruption localization and repair ([`crc`])
//!
//! ## Driving the buffer
//!
//! ```rust
//! use relaylog_core::{BufferConfig, LogPosition, ReplayStatus, ReplicationBuffer};
//! use relaylog_source::MemoryReplica;
//!
//! let mut replica = MemoryReplica::new();
//! replica.add_slice("bin.000001", 0, b"log bytes".to_vec());
//!
//! let mut buffer = ReplicationBuffer::with_replica(
//!     BufferConfig::new().min_write_threshold(0),
//!     Box::new(replica),
//!     Box::new(|span: &[u8]| ReplayStatus::Consumed(span.len())),
//! );
//! buffer.seek(LogPosition::new(0), 0, 0).unwrap();
//! buffer.replay_to_completion(false).unwrap();
//! assert_eq!(buffer.cursor(), LogPosition::new(9));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod accumulator;
mod buffer;
mod config;
pub mod crc;
mod error;
mod ring;
mod role;
mod types;

pub use accumulator::ByteAccumulator;
pub use buffer::{BufferState, ReplicationBuffer};
pub use config::BufferConfig;
pub use error::{CoreResult, ReplicationError};
pub use ring::{RotationKind, RotationPoint, RotationPointId, RotationRing};
pub use role::{
    BufferCtx, ReaderRole, ReplayFn, ReplayStatus, ReplicaStreamReader, ReplicaStreamWriter,
    RotateOutcome, WriterRole, ROTATION_GRACE_SECS,
};
pub use types::{LogPosition, PumpProgress};
