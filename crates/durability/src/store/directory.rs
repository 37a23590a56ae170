//! Log directory scanning.
//!
//! Files in the log directory:
//!
//! ```text
//! log-<ms>-<seq>.seg    segment (active or sealed)
//! log-<ms>-<seq>.meta   seal sidecar; its presence marks the segment closed
//! ```

use crate::error::StoreResult;
use crate::format::{LogFileId, SegmentMeta};
use std::path::{Path, PathBuf};

/// A sealed segment ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedLogFile {
    /// Segment identity
    pub id: LogFileId,
    /// Path of the `.seg` file
    pub path: PathBuf,
    /// Seal metadata
    pub meta: SegmentMeta,
}

/// Read-only view over a log directory.
pub struct LogDirectory;

impl LogDirectory {
    /// List sealed segments, oldest first.
    ///
    /// A sidecar that cannot be parsed, or whose segment is gone, is
    /// skipped with a warning.
    pub fn list_closed(dir: &Path) -> StoreResult<Vec<ClosedLogFile>> {
        let mut closed = Vec::new();

        for id in Self::scan(dir, "meta")? {
            let path = id.segment_path(dir);
            if !path.exists() {
                tracing::warn!(target: "logship::store", file = %id, "Sidecar without segment");
                continue;
            }
            match SegmentMeta::read_from_file(dir, id) {
                Ok(Some(meta)) => closed.push(ClosedLogFile { id, path, meta }),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        target: "logship::store",
                        file = %id,
                        error = %e,
                        "Skipping segment with unreadable sidecar"
                    );
                }
            }
        }

        closed.sort_by_key(|f| f.id);
        Ok(closed)
    }

    /// Segments that have no sidecar, oldest first.
    pub fn list_unsealed(dir: &Path) -> StoreResult<Vec<LogFileId>> {
        let mut unsealed: Vec<_> = Self::scan(dir, "seg")?
            .into_iter()
            .filter(|id| !SegmentMeta::meta_path(dir, *id).exists())
            .collect();
        unsealed.sort();
        Ok(unsealed)
    }

    /// Highest sequence number of any segment or sidecar in `dir`.
    pub fn max_sequence(dir: &Path) -> StoreResult<Option<u64>> {
        let segments = Self::scan(dir, "seg")?;
        let sidecars = Self::scan(dir, "meta")?;
        Ok(segments
            .iter()
            .chain(sidecars.iter())
            .map(|id| id.sequence)
            .max())
    }

    /// Delete a segment and its sidecar.
    ///
    /// The sidecar goes last so a crash in between leaves a sidecar without
    /// segment, which listing skips.
    pub fn remove(dir: &Path, id: LogFileId) -> StoreResult<()> {
        remove_if_exists(&id.segment_path(dir))?;
        remove_if_exists(&SegmentMeta::meta_path(dir, id))?;
        Ok(())
    }

    fn scan(dir: &Path, extension: &str) -> StoreResult<Vec<LogFileId>> {
        let mut ids = Vec::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = LogFileId::parse_file_name(&name, extension) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::LogSegment;
    use tempfile::tempdir;

    fn seal(dir: &Path, id: LogFileId) {
        let mut segment = LogSegment::create(dir, id).unwrap();
        segment.sync().unwrap();
        let mut meta = SegmentMeta::new_empty(id);
        meta.byte_len = segment.size();
        meta.write_to_file(dir).unwrap();
    }

    #[test]
    fn test_list_closed_oldest_first() {
        let dir = tempdir().unwrap();
        seal(dir.path(), LogFileId::new(3_000, 3));
        seal(dir.path(), LogFileId::new(1_000, 1));
        seal(dir.path(), LogFileId::new(2_000, 2));
        // Active, not sealed
        LogSegment::create(dir.path(), LogFileId::new(4_000, 4)).unwrap();

        let closed = LogDirectory::list_closed(dir.path()).unwrap();
        let seqs: Vec<_> = closed.iter().map(|f| f.id.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);

        let unsealed = LogDirectory::list_unsealed(dir.path()).unwrap();
        assert_eq!(unsealed, vec![LogFileId::new(4_000, 4)]);
        assert_eq!(LogDirectory::max_sequence(dir.path()).unwrap(), Some(4));
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(LogDirectory::list_closed(&missing).unwrap().is_empty());
        assert_eq!(LogDirectory::max_sequence(&missing).unwrap(), None);
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let id = LogFileId::new(1_000, 1);
        seal(dir.path(), id);
        LogDirectory::remove(dir.path(), id).unwrap();
        assert!(LogDirectory::list_closed(dir.path()).unwrap().is_empty());
        assert!(!SegmentMeta::meta_path(dir.path(), id).exists());
        // Removing twice is fine
        LogDirectory::remove(dir.path(), id).unwrap();
    }

    #[test]
    fn test_corrupt_sidecar_skipped() {
        let dir = tempdir().unwrap();
        let id = LogFileId::new(1_000, 1);
        seal(dir.path(), id);
        std::fs::write(SegmentMeta::meta_path(dir.path(), id), b"garbage").unwrap();
        assert!(LogDirectory::list_closed(dir.path()).unwrap().is_empty());
    }
}
