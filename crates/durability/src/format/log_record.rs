//! Log segment file and record format.
//!
//! Segments are named `log-<created_ms>-<sequence>.seg` with a zero-padded
//! 13-digit creation time (ms since epoch) and 6-digit sequence number.
//!
//! # Segment Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Segment Header (24 bytes)          │
//! ├────────────────────────────────────┤
//! │ Record 1                           │
//! ├────────────────────────────────────┤
//! │ Record 2                           │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1)   │ Event JSON (variable)   │ CRC32 (4)│
//! └─────────────────┴──────────────────┴─────────────────────────┴──────────┘
//! ```
//!
//! A torn write leaves a frame whose length or CRC does not check out, so
//! readers stop at the last complete record.

use logship_core::LogEvent;
use std::cmp::Ordering;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes identifying a log segment file: "LSEG"
pub const SEGMENT_MAGIC: [u8; 4] = *b"LSEG";

/// Current segment format version
pub const SEGMENT_FORMAT_VERSION: u32 = 1;

/// Size of segment header in bytes
pub const SEGMENT_HEADER_SIZE: usize = 24;

/// Current record format version
pub const LOG_RECORD_FORMAT_VERSION: u8 = 1;

/// Identity of a log file: creation time plus store-wide sequence number.
///
/// Ordering follows the sequence number, which is monotonic within a store
/// even if the wall clock steps backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct LogFileId {
    /// Creation time, milliseconds since epoch
    pub created_ms: u64,
    /// Sequence number (monotonically increasing)
    pub sequence: u64,
}

impl LogFileId {
    /// Create an id.
    pub fn new(created_ms: u64, sequence: u64) -> Self {
        LogFileId {
            created_ms,
            sequence,
        }
    }

    /// File stem shared by the segment and its sidecars.
    pub fn stem(&self) -> String {
        format!("log-{:013}-{:06}", self.created_ms, self.sequence)
    }

    /// Name of the segment file.
    pub fn segment_file_name(&self) -> String {
        format!("{}.seg", self.stem())
    }

    /// Path of the segment file in `dir`.
    pub fn segment_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.segment_file_name())
    }

    /// Parse a segment or sidecar file name (`log-<ms>-<seq>.<ext>`).
    pub fn parse_file_name(name: &str, extension: &str) -> Option<Self> {
        Self::parse_stem(name.strip_suffix(extension)?.strip_suffix('.')?)
    }

    /// Parse a bare stem (`log-<ms>-<seq>`).
    pub fn parse_stem(stem: &str) -> Option<Self> {
        let (created, sequence) = stem.strip_prefix("log-")?.split_once('-')?;
        Some(LogFileId {
            created_ms: created.parse().ok()?,
            sequence: sequence.parse().ok()?,
        })
    }
}

impl Ord for LogFileId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence
            .cmp(&other.sequence)
            .then(self.created_ms.cmp(&other.created_ms))
    }
}

impl PartialOrd for LogFileId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LogFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

/// Log segment header (24 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Magic bytes: "LSEG"
    pub magic: [u8; 4],

    /// Format version for forward compatibility
    pub format_version: u32,

    /// Sequence number of this segment
    pub sequence: u64,

    /// Creation time in milliseconds since epoch
    pub created_ms: u64,
}

impl SegmentHeader {
    /// Create a new segment header.
    pub fn new(id: LogFileId) -> Self {
        SegmentHeader {
            magic: SEGMENT_MAGIC,
            format_version: SEGMENT_FORMAT_VERSION,
            sequence: id.sequence,
            created_ms: id.created_ms,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut bytes = [0u8; SEGMENT_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.sequence.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.created_ms.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes.
    pub fn from_bytes(bytes: &[u8; SEGMENT_HEADER_SIZE]) -> Option<Self> {
        Some(SegmentHeader {
            magic: bytes[0..4].try_into().ok()?,
            format_version: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            sequence: u64::from_le_bytes(bytes[8..16].try_into().ok()?),
            created_ms: u64::from_le_bytes(bytes[16..24].try_into().ok()?),
        })
    }

    /// Validate magic bytes and version.
    pub fn is_valid(&self) -> bool {
        self.magic == SEGMENT_MAGIC && self.format_version == SEGMENT_FORMAT_VERSION
    }

    /// Identity encoded in the header.
    pub fn id(&self) -> LogFileId {
        LogFileId::new(self.created_ms, self.sequence)
    }
}

/// Writable handle to the active segment.
///
/// Only the active segment is writable; sealed segments are read-only and
/// belong to the shipper.
pub struct LogSegment {
    /// Buffered file handle
    file: BufWriter<File>,

    /// Segment identity
    id: LogFileId,

    /// Current write position (bytes from start, header included)
    write_position: u64,

    /// Path to segment file
    path: PathBuf,

    /// Bytes the next write gets through before failing
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl LogSegment {
    /// Create a new segment and write its header.
    pub fn create(dir: &Path, id: LogFileId) -> std::io::Result<Self> {
        let path = id.segment_path(dir);

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .read(true)
            .open(&path)?;

        file.write_all(&SegmentHeader::new(id).to_bytes())?;

        Ok(LogSegment {
            file: BufWriter::new(file),
            id,
            write_position: SEGMENT_HEADER_SIZE as u64,
            path,
            #[cfg(test)]
            fail_after: None,
        })
    }

    /// Segment identity.
    pub fn id(&self) -> LogFileId {
        self.id
    }

    /// Current size in bytes, header included.
    pub fn size(&self) -> u64 {
        self.write_position
    }

    /// Path of the segment file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append already-framed bytes.
    ///
    /// On error part of `data` may be buffered or on disk; the caller cuts
    /// it off with [`truncate`](Self::truncate) before writing again.
    pub fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        if let Some(limit) = self.fail_after.take() {
            self.file.write_all(&data[..limit.min(data.len())])?;
            self.file.flush()?;
            return Err(std::io::Error::other("injected write failure"));
        }
        self.file.write_all(data)?;
        self.write_position += data.len() as u64;
        Ok(())
    }

    /// Cut the segment back to `len` bytes.
    ///
    /// Buffered bytes are discarded unwritten and the file is truncated
    /// through a fresh handle, so the next write lands at `len`.
    pub fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.set_len(len)?;
        file.sync_all()?;
        file.seek(SeekFrom::Start(len))?;
        let stale = std::mem::replace(&mut self.file, BufWriter::new(file));
        let (_file, _discarded) = stale.into_parts();
        self.write_position = len;
        Ok(())
    }

    /// Make the next write fail after `bytes` bytes reach the file.
    #[cfg(test)]
    pub(crate) fn fail_next_write_after(&mut self, bytes: usize) {
        self.fail_after = Some(bytes);
    }

    /// Push buffered bytes to the OS.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }

    /// Flush and fsync.
    pub fn sync(&mut self) -> std::io::Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()
    }
}

/// Framing for one event.
pub struct LogRecord;

/// Length prefix size.
const LEN_BYTES: usize = 4;
/// Trailing CRC size.
const CRC_BYTES: usize = 4;

impl LogRecord {
    /// Frame an event as `len | version | json | crc32`.
    ///
    /// `len` counts everything after itself; the CRC covers version and
    /// JSON.
    pub fn encode(event: &LogEvent) -> logship_core::Result<Vec<u8>> {
        let json = event.to_json_bytes()?;
        let body_len = 1 + json.len() + CRC_BYTES;

        let mut frame = Vec::with_capacity(LEN_BYTES + body_len);
        frame.extend_from_slice(&(body_len as u32).to_le_bytes());
        frame.push(LOG_RECORD_FORMAT_VERSION);
        frame.extend_from_slice(&json);
        let crc = crc32fast::hash(&frame[LEN_BYTES..]);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    /// Decode the frame at the front of `bytes`; returns the event and the
    /// frame length.
    pub fn decode(bytes: &[u8]) -> Result<(LogEvent, usize), LogRecordError> {
        let len_field = bytes
            .get(..LEN_BYTES)
            .ok_or(LogRecordError::InsufficientData)?;
        let body_len =
            u32::from_le_bytes([len_field[0], len_field[1], len_field[2], len_field[3]]) as usize;
        if body_len < 1 + CRC_BYTES {
            return Err(LogRecordError::InvalidFormat);
        }
        let frame_len = LEN_BYTES + body_len;
        let body = bytes
            .get(LEN_BYTES..frame_len)
            .ok_or(LogRecordError::InsufficientData)?;

        let (content, crc) = body.split_at(body_len - CRC_BYTES);
        let stored = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
        let computed = crc32fast::hash(content);
        if stored != computed {
            return Err(LogRecordError::ChecksumMismatch {
                expected: stored,
                computed,
            });
        }

        match content.split_first() {
            Some((&LOG_RECORD_FORMAT_VERSION, json)) => LogEvent::from_json_bytes(json)
                .map(|event| (event, frame_len))
                .map_err(|e| LogRecordError::InvalidEvent(e.to_string())),
            Some((&version, _)) => Err(LogRecordError::UnsupportedVersion(version)),
            None => Err(LogRecordError::InvalidFormat),
        }
    }
}

/// Why a frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogRecordError {
    /// Frame runs past the end of the data (torn write or end of file)
    #[error("frame truncated")]
    InsufficientData,

    /// Length field too small to hold a frame
    #[error("frame length field is invalid")]
    InvalidFormat,

    /// Content does not match its CRC
    #[error("frame crc mismatch: stored {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// CRC stored in the frame
        expected: u32,
        /// CRC over the content
        computed: u32,
    },

    /// Record format this build cannot read
    #[error("record version {0} not supported")]
    UnsupportedVersion(u8),

    /// Frame is intact but the JSON is not an event
    #[error("record is not an event: {0}")]
    InvalidEvent(String),
}
