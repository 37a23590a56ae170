//! Per-segment metadata sidecar files.
//!
//! Sealing a log segment `log-<ms>-<seq>.seg` writes a companion
//! `log-<ms>-<seq>.meta` file. The sidecar is the seal: a segment with a
//! `.meta` is closed and immutable, a segment without one is still being
//! written (or was interrupted and is sealed again on the next open).
//!
//! # Binary Format (68 bytes)
//!
//! ```text
//! magic("LSMT", 4) + version(4) + sequence(8) + created_ms(8) + closed_ms(8)
//! + min_event_ms(8) + max_event_ms(8) + record_count(8) + byte_len(8)
//! + crc32(4) = 68 bytes
//! ```

use super::log_record::LogFileId;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sidecar magic.
pub const SEGMENT_META_MAGIC: &[u8; 4] = b"LSMT";

/// Sidecar format version.
pub const SEGMENT_META_VERSION: u32 = 1;

/// Encoded sidecar length.
pub const SEGMENT_META_SIZE: usize = 68;

const CRC_OFFSET: usize = SEGMENT_META_SIZE - 4;

/// Summary of a sealed segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMeta {
    /// Segment this metadata belongs to.
    pub id: LogFileId,
    /// Seal time (milliseconds since epoch).
    pub closed_ms: u64,
    /// Earliest event timestamp (ms). `u64::MAX` when empty.
    pub min_event_ms: u64,
    /// Latest event timestamp (ms). `0` when empty.
    pub max_event_ms: u64,
    /// Number of records in the segment.
    pub record_count: u64,
    /// Segment file length in bytes, header included.
    pub byte_len: u64,
}

impl SegmentMeta {
    /// Metadata for a segment with no records yet.
    pub fn new_empty(id: LogFileId) -> Self {
        SegmentMeta {
            id,
            closed_ms: 0,
            min_event_ms: u64::MAX,
            max_event_ms: 0,
            record_count: 0,
            byte_len: 0,
        }
    }

    /// Account for one appended record.
    pub fn track_record(&mut self, event_ms: u64) {
        self.record_count += 1;
        if event_ms < self.min_event_ms {
            self.min_event_ms = event_ms;
        }
        if event_ms > self.max_event_ms {
            self.max_event_ms = event_ms;
        }
    }

    /// No records tracked.
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Path of the sidecar for `id` in `dir`.
    pub fn meta_path(dir: &Path, id: LogFileId) -> PathBuf {
        dir.join(format!("{}.meta", id.stem()))
    }

    /// Persist the sidecar, sealing the segment.
    ///
    /// The bytes go to a temporary file that is synced and renamed into
    /// place, so a reader sees either no sidecar or a complete one.
    pub fn write_to_file(&self, dir: &Path) -> Result<(), SegmentMetaError> {
        let path = Self::meta_path(dir, self.id);
        write_atomic(&path, &self.encode())?;
        Ok(())
    }

    /// Load the sidecar for `id`, or `None` if the segment is not sealed.
    pub fn read_from_file(dir: &Path, id: LogFileId) -> Result<Option<Self>, SegmentMetaError> {
        match fs::read(Self::meta_path(dir, id)) {
            Ok(data) => Self::from_bytes(&data).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let fields = [
            self.id.sequence,
            self.id.created_ms,
            self.closed_ms,
            self.min_event_ms,
            self.max_event_ms,
            self.record_count,
            self.byte_len,
        ];
        let mut out = Vec::with_capacity(SEGMENT_META_SIZE);
        out.extend_from_slice(SEGMENT_META_MAGIC);
        out.extend_from_slice(&SEGMENT_META_VERSION.to_le_bytes());
        for field in fields {
            out.extend_from_slice(&field.to_le_bytes());
        }
        let crc = crc32fast::hash(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decode a sidecar, checking length, magic, version and checksum.
    pub fn from_bytes(data: &[u8]) -> Result<Self, SegmentMetaError> {
        if data.len() < SEGMENT_META_SIZE {
            return Err(SegmentMetaError::TooShort {
                expected: SEGMENT_META_SIZE,
                actual: data.len(),
            });
        }
        if data[..4] != SEGMENT_META_MAGIC[..] {
            return Err(SegmentMetaError::InvalidMagic);
        }

        let mut words = data[4..CRC_OFFSET].chunks_exact(4);
        let mut next_u32 = || {
            words
                .next()
                .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
                .unwrap_or_default()
        };
        let version = next_u32();
        if version != SEGMENT_META_VERSION {
            return Err(SegmentMetaError::UnsupportedVersion(version));
        }
        let mut next_u64 = || u64::from(next_u32()) | (u64::from(next_u32()) << 32);
        let sequence = next_u64();
        let created_ms = next_u64();
        let closed_ms = next_u64();
        let min_event_ms = next_u64();
        let max_event_ms = next_u64();
        let record_count = next_u64();
        let byte_len = next_u64();

        let crc = &data[CRC_OFFSET..SEGMENT_META_SIZE];
        let stored = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
        let computed = crc32fast::hash(&data[..CRC_OFFSET]);
        if stored != computed {
            return Err(SegmentMetaError::ChecksumMismatch { stored, computed });
        }

        Ok(SegmentMeta {
            id: LogFileId::new(created_ms, sequence),
            closed_ms,
            min_event_ms,
            max_event_ms,
            record_count,
            byte_len,
        })
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("meta.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent().filter(|p| p.exists()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

/// Sidecar decode and IO errors.
#[derive(Debug, thiserror::Error)]
pub enum SegmentMetaError {
    /// Fewer bytes than a sidecar holds.
    #[error("sidecar truncated: {actual} of {expected} bytes")]
    TooShort {
        /// Encoded size
        expected: usize,
        /// Bytes present
        actual: usize,
    },

    /// Not a sidecar.
    #[error("sidecar magic mismatch")]
    InvalidMagic,

    /// Written by a newer format.
    #[error("sidecar version {0} not supported")]
    UnsupportedVersion(u32),

    /// Checksum does not cover the content.
    #[error("sidecar crc mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// From the file
        stored: u32,
        /// Over the content
        computed: u32,
    },

    /// Filesystem failure.
    #[error("sidecar io: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> SegmentMeta {
        let mut meta = SegmentMeta::new_empty(LogFileId::new(1_700_000_000_000, 3));
        meta.track_record(1_700_000_000_500);
        meta.track_record(1_700_000_000_100);
        meta.closed_ms = 1_700_000_001_000;
        meta.byte_len = 4096;
        meta
    }

    #[test]
    fn test_tracks_event_range() {
        let meta = sample();
        assert_eq!(meta.min_event_ms, 1_700_000_000_100);
        assert_eq!(meta.max_event_ms, 1_700_000_000_500);
        assert_eq!(meta.record_count, 2);
        assert!(!meta.is_empty());
    }

    #[test]
    fn test_encoded_length_and_decode() {
        let meta = sample();
        let bytes = meta.encode();
        assert_eq!(bytes.len(), SEGMENT_META_SIZE);
        assert_eq!(SegmentMeta::from_bytes(&bytes).unwrap(), meta);
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let meta = sample();
        meta.write_to_file(dir.path()).unwrap();

        let loaded = SegmentMeta::read_from_file(dir.path(), meta.id).unwrap();
        assert_eq!(loaded, Some(meta));
        assert!(!dir.path().join("log-1700000000000-000003.meta.tmp").exists());
    }

    #[test]
    fn test_unsealed_segment_has_no_sidecar() {
        let dir = tempdir().unwrap();
        let loaded = SegmentMeta::read_from_file(dir.path(), LogFileId::new(1, 1)).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_damaged_sidecar_rejected() {
        let mut bytes = sample().encode();
        bytes[20] ^= 0xFF;
        assert!(matches!(
            SegmentMeta::from_bytes(&bytes),
            Err(SegmentMetaError::ChecksumMismatch { .. })
        ));

        let mut bytes = sample().encode();
        bytes[0] = b'X';
        assert!(matches!(
            SegmentMeta::from_bytes(&bytes),
            Err(SegmentMetaError::InvalidMagic)
        ));

        assert!(matches!(
            SegmentMeta::from_bytes(&[0u8; 10]),
            Err(SegmentMetaError::TooShort { .. })
        ));
    }
}
