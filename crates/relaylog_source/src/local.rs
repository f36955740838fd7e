//! Local-filesystem replica.

use crate::block;
use crate::cipher::StreamCipher;
use crate::error::{SourceError, SourceResult};
use crate::provider::{ReplicaProvider, SliceHandle};
use crate::stream::FileStream;
use std::path::{Path, PathBuf};

/// Index entry describing one binlog file of a local replica.
#[derive(Debug, Clone)]
pub struct SliceSpec {
    /// File name, used for rotation ordering and diagnostics.
    pub file_name: String,
    /// Path to the file.
    pub path: PathBuf,
    /// Logical position of the file's first content byte.
    pub base_position: i64,
    /// Physical bytes preceding the content (format header).
    pub content_offset: u64,
    /// Whether the content is block-compressed.
    pub compressed: bool,
    /// Stream cipher when the content is encrypted.
    pub cipher: Option<StreamCipher>,
}

struct IndexedSlice {
    spec: SliceSpec,
    logical_len: u64,
}

/// A replica whose binlog files live in a local directory.
///
/// The replica keeps an index of its files with their logical base
/// positions. Two construction modes exist: an explicit index supplied by
/// the caller (the checkpoint layer usually records one), or a directory
/// scan that orders files by name and assigns cumulative base positions.
/// `refresh_replica_metadata` re-scans the directory so files that appeared
/// after the initial scan become visible to rotation.
pub struct LocalReplica {
    dir: Option<PathBuf>,
    index: Vec<IndexedSlice>,
}

impl LocalReplica {
    /// Builds a replica from an explicit file index.
    ///
    /// The logical extent of each file is probed from the filesystem:
    /// file size minus `content_offset` for plain files, the sum of block
    /// headers for compressed ones.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be probed.
    pub fn with_index(specs: Vec<SliceSpec>) -> SourceResult<Self> {
        let mut index = Vec::with_capacity(specs.len());
        for spec in specs {
            let logical_len = probe_logical_len(&spec)?;
            index.push(IndexedSlice { spec, logical_len });
        }
        Ok(Self { dir: None, index })
    }

    /// Scans a directory and builds the index from it.
    ///
    /// Files are ordered by name and assigned cumulative base positions
    /// starting at 0. A `.lz4` extension marks a file as block-compressed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or a file probed.
    pub fn open_dir(dir: &Path) -> SourceResult<Self> {
        let mut replica = Self {
            dir: Some(dir.to_path_buf()),
            index: Vec::new(),
        };
        replica.rescan()?;
        Ok(replica)
    }

    /// Returns the file names currently in the index, in stream order.
    #[must_use]
    pub fn file_names(&self) -> Vec<String> {
        self.index.iter().map(|s| s.spec.file_name.clone()).collect()
    }

    fn rescan(&mut self) -> SourceResult<()> {
        let Some(dir) = self.dir.clone() else {
            return Ok(());
        };

        let mut names: Vec<String> = std::fs::read_dir(&dir)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                entry
                    .file_type()
                    .ok()?
                    .is_file()
                    .then(|| entry.file_name().to_string_lossy().into_owned())
            })
            .collect();
        names.sort_unstable();

        // Known files keep their base positions; new files continue from
        // the end of the stream.
        let mut next_base = self
            .index
            .last()
            .map(|s| s.spec.base_position + s.logical_len as i64)
            .unwrap_or(0);

        for name in names {
            if self.index.iter().any(|s| s.spec.file_name == name) {
                continue;
            }
            let spec = SliceSpec {
                file_name: name.clone(),
                path: dir.join(&name),
                base_position: next_base,
                content_offset: 0,
                compressed: name.ends_with(".lz4"),
                cipher: None,
            };
            let logical_len = probe_logical_len(&spec)?;
            next_base += logical_len as i64;
            self.index.push(IndexedSlice { spec, logical_len });
        }
        Ok(())
    }

    fn make_handle(&self, slice: &IndexedSlice) -> SourceResult<SliceHandle> {
        let stream = FileStream::open(&slice.spec.path)?;
        let mut handle = SliceHandle::new(
            slice.spec.file_name.clone(),
            slice.spec.base_position,
            Box::new(stream),
        )
        .with_content_offset(slice.spec.content_offset);
        if slice.spec.compressed {
            handle = handle.with_compression();
        }
        if let Some(cipher) = &slice.spec.cipher {
            handle = handle.with_cipher(cipher.clone());
        }
        Ok(handle)
    }
}

impl ReplicaProvider for LocalReplica {
    fn open(&mut self, position: i64) -> SourceResult<SliceHandle> {
        let slice = self
            .index
            .iter()
            .find(|s| {
                position >= s.spec.base_position
                    && (position as u64) < s.spec.base_position as u64 + s.logical_len
            })
            .ok_or(SourceError::NoSuchPosition { position })?;
        self.make_handle(slice)
    }

    fn next_file(&mut self, current: &SliceHandle) -> SourceResult<Option<SliceHandle>> {
        let index = self
            .index
            .iter()
            .position(|s| s.spec.file_name == current.file_name())
            .ok_or_else(|| {
                SourceError::corrupted(format!("unknown replica file {}", current.file_name()))
            })?;
        match self.index.get(index + 1) {
            Some(slice) => Ok(Some(self.make_handle(slice)?)),
            None => Ok(None),
        }
    }

    fn refresh_replica_metadata(&mut self) -> SourceResult<()> {
        self.rescan()
    }
}

fn probe_logical_len(spec: &SliceSpec) -> SourceResult<u64> {
    if spec.compressed {
        let mut stream = FileStream::open(&spec.path)?;
        block::decoded_len(&mut stream)
    } else {
        let physical = std::fs::metadata(&spec.path)?.len();
        if spec.content_offset > physical {
            return Err(SourceError::corrupted(format!(
                "{}: content offset {} beyond {physical}-byte file",
                spec.file_name, spec.content_offset
            )));
        }
        Ok(physical - spec.content_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, content: &[u8]) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(content).unwrap();
    }

    #[test]
    fn scan_assigns_cumulative_bases() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "bin.000001", b"0123456789");
        write_file(dir.path(), "bin.000002", b"abcdef");

        let mut replica = LocalReplica::open_dir(dir.path()).unwrap();
        assert_eq!(replica.file_names(), vec!["bin.000001", "bin.000002"]);

        let first = replica.open(0).unwrap();
        assert_eq!(first.base_position(), 0);
        let second = replica.open(12).unwrap();
        assert_eq!(second.base_position(), 10);
        assert_eq!(second.file_name(), "bin.000002");
    }

    #[test]
    fn next_file_follows_name_order() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "bin.000001", b"aaaa");
        write_file(dir.path(), "bin.000002", b"bbbb");

        let mut replica = LocalReplica::open_dir(dir.path()).unwrap();
        let first = replica.open(0).unwrap();
        let second = replica.next_file(&first).unwrap().unwrap();
        assert_eq!(second.file_name(), "bin.000002");
        assert!(replica.next_file(&second).unwrap().is_none());
    }

    #[test]
    fn refresh_picks_up_new_files() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "bin.000001", b"aaaa");

        let mut replica = LocalReplica::open_dir(dir.path()).unwrap();
        let first = replica.open(0).unwrap();
        assert!(replica.next_file(&first).unwrap().is_none());

        write_file(dir.path(), "bin.000002", b"bbbb");
        replica.refresh_replica_metadata().unwrap();

        let second = replica.next_file(&first).unwrap().unwrap();
        assert_eq!(second.file_name(), "bin.000002");
        assert_eq!(second.base_position(), 4);
    }

    #[test]
    fn explicit_index_respects_content_offset() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "bin.000001", b"MAGCpayload");

        let mut replica = LocalReplica::with_index(vec![SliceSpec {
            file_name: "bin.000001".into(),
            path: dir.path().join("bin.000001"),
            base_position: 100,
            content_offset: 4,
            compressed: false,
            cipher: None,
        }])
        .unwrap();

        // Logical extent excludes the header: positions [100, 107).
        assert!(replica.open(99).is_err());
        assert!(replica.open(106).is_ok());
        assert!(replica.open(107).is_err());
    }

    #[test]
    fn compressed_extent_uses_decoded_len() {
        let dir = tempdir().unwrap();
        let raw: Vec<u8> = (0..=255u8).cycle().take(1500).collect();
        write_file(dir.path(), "bin.000001.lz4", &block::encode_stream(&raw, 400));

        let mut replica = LocalReplica::open_dir(dir.path()).unwrap();
        let handle = replica.open(1499).unwrap();
        assert!(handle.is_compressed());
        assert!(replica.open(1500).is_err());
    }
}
