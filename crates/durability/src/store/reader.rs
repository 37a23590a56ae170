//! Segment reader.
//!
//! Decodes the records of one segment file. Reading stops at the first
//! frame that is incomplete or fails its checksum; everything before it is
//! returned along with the offset where valid data ends.

use crate::error::{StoreError, StoreResult};
use crate::format::{
    LogFileId, LogRecord, LogRecordError, SegmentHeader, SEGMENT_HEADER_SIZE,
};
use logship_core::LogEvent;
use std::path::Path;

/// Decoded contents of a segment.
#[derive(Debug)]
pub struct SegmentContents {
    /// Identity from the segment header
    pub id: LogFileId,
    /// Events in write order
    pub events: Vec<LogEvent>,
    /// Byte offset just past the last valid record
    pub valid_len: u64,
    /// Why reading stopped before end of file, if it did
    pub stop_reason: Option<LogRecordError>,
}

impl SegmentContents {
    /// Whether bytes after the last valid record were ignored.
    pub fn has_torn_tail(&self) -> bool {
        self.stop_reason.is_some()
    }
}

/// Read and decode a whole segment file.
pub fn read_segment(path: &Path) -> StoreResult<SegmentContents> {
    let bytes = std::fs::read(path)?;
    decode_segment(path, &bytes)
}

/// Read the events of a segment file, ignoring any torn tail.
pub fn read_events(path: &Path) -> StoreResult<Vec<LogEvent>> {
    Ok(read_segment(path)?.events)
}

fn decode_segment(path: &Path, bytes: &[u8]) -> StoreResult<SegmentContents> {
    if bytes.len() < SEGMENT_HEADER_SIZE {
        return Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("file is {} bytes, shorter than header", bytes.len()),
        });
    }

    let mut header_bytes = [0u8; SEGMENT_HEADER_SIZE];
    header_bytes.copy_from_slice(&bytes[..SEGMENT_HEADER_SIZE]);
    let header = SegmentHeader::from_bytes(&header_bytes)
        .filter(SegmentHeader::is_valid)
        .ok_or_else(|| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: "invalid segment header".to_string(),
        })?;

    let mut events = Vec::new();
    let mut offset = SEGMENT_HEADER_SIZE;
    let mut stop_reason = None;

    while offset < bytes.len() {
        match LogRecord::decode(&bytes[offset..]) {
            Ok((event, consumed)) => {
                events.push(event);
                offset += consumed;
            }
            Err(e) => {
                tracing::warn!(
                    target: "logship::store",
                    path = %path.display(),
                    offset,
                    error = %e,
                    "Stopped reading segment at invalid record"
                );
                stop_reason = Some(e);
                break;
            }
        }
    }

    Ok(SegmentContents {
        id: header.id(),
        events,
        valid_len: offset as u64,
        stop_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::LogSegment;
    use logship_core::EventSource;
    use std::io::Write;
    use tempfile::tempdir;

    fn event(i: usize) -> LogEvent {
        LogEvent::builder(EventSource::RequestTrace, "REQUEST_LOG")
            .field("i", i)
            .build()
            .unwrap()
    }

    fn write_segment(dir: &Path, events: &[LogEvent]) -> std::path::PathBuf {
        let mut segment = LogSegment::create(dir, LogFileId::new(1_000, 1)).unwrap();
        for e in events {
            segment.write(&LogRecord::encode(e).unwrap()).unwrap();
        }
        segment.sync().unwrap();
        segment.path().to_path_buf()
    }

    #[test]
    fn test_read_all_events() {
        let dir = tempdir().unwrap();
        let events: Vec<_> = (0..10).map(event).collect();
        let path = write_segment(dir.path(), &events);

        let contents = read_segment(&path).unwrap();
        assert_eq!(contents.id, LogFileId::new(1_000, 1));
        assert_eq!(contents.events, events);
        assert!(!contents.has_torn_tail());
        assert_eq!(contents.valid_len, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_torn_tail_is_ignored() {
        let dir = tempdir().unwrap();
        let events: Vec<_> = (0..3).map(event).collect();
        let path = write_segment(dir.path(), &events);
        let valid = std::fs::metadata(&path).unwrap().len();

        // Half of a fourth record
        let partial = LogRecord::encode(&event(3)).unwrap();
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&partial[..partial.len() / 2]).unwrap();
        drop(file);

        let contents = read_segment(&path).unwrap();
        assert_eq!(contents.events, events);
        assert_eq!(contents.valid_len, valid);
        assert_eq!(contents.stop_reason, Some(LogRecordError::InsufficientData));
    }

    #[test]
    fn test_short_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log-0000000001000-000001.seg");
        std::fs::write(&path, b"LSEG").unwrap();
        assert!(matches!(read_segment(&path), Err(StoreError::Corrupt { .. })));
    }
}
