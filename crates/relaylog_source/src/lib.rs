//! # Relaylog Source
//!
//! Replica file provider trait and implementations for Relaylog.
//!
//! This crate is the lowest layer of the replication pipeline: it locates
//! and opens the physical files that back the logical binlog stream. Files
//! are **opaque byte sources** here - the buffer engine in `relaylog_core`
//! owns all interpretation of positions, rotation, and integrity.
//!
//! ## Design Principles
//!
//! - Providers map logical positions to physical files and walk the file
//!   sequence; they never parse content
//! - Streams are plain byte cursors (`seek_to`, `read`, `read_vectored`)
//! - Compression framing and encryption keystreams are self-contained
//!   modules so the engine can apply them to buffered bytes in place
//!
//! ## Available Providers
//!
//! - [`LocalReplica`] - binlog files in a local directory
//! - [`MemoryReplica`] - in-memory slices for tests and ephemeral use
//!
//! ## Example
//!
//! ```rust
//! use relaylog_source::{MemoryReplica, ReplicaProvider};
//!
//! let mut replica = MemoryReplica::new();
//! replica.add_slice("bin.000001", 0, b"log bytes".to_vec());
//! let handle = replica.open(0).unwrap();
//! assert_eq!(handle.base_position(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod block;
mod cipher;
mod error;
mod local;
mod memory;
mod provider;
mod stream;

pub use cipher::{StreamCipher, KEY_SIZE, NONCE_SIZE};
pub use error::{SourceError, SourceResult};
pub use local::{LocalReplica, SliceSpec};
pub use memory::{MemoryReplica, ReplicaControl};
pub use provider::{ReplicaProvider, SliceHandle};
pub use stream::{read_full, FileStream, MemoryStream, SliceStream};
