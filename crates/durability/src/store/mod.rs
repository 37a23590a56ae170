//! Log Store: append-only, rotated segment files.
//!
//! All producers in the process share one [`LogStore`]. Appends are
//! serialized by a single writer lock, so each event lands as one whole
//! framed record and a batch is never interleaved with another writer.
//!
//! ```text
//! producers ──append──► LogStore ──► log-...-000007.seg (active)
//!                                    log-...-000006.seg + .meta (closed)
//!                                    log-...-000005.seg + .meta (closed)
//! ```
//!
//! Closed segments are read-only and are listed for the shipper by
//! [`LogDirectory::list_closed`].

pub mod config;
pub mod directory;
pub mod reader;
pub mod writer;

pub use config::{StoreConfig, StoreConfigError};
pub use directory::{ClosedLogFile, LogDirectory};
pub use reader::{read_events, read_segment, SegmentContents};
pub use writer::{LogWriter, StoreCounters};

use crate::error::StoreResult;
use crate::format::LogFileId;
use logship_core::{LogEvent, SharedClock, SystemClock};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Destination for telemetry events.
///
/// Implemented by [`LogStore`]; producers hold an `Arc<dyn EventSink>`.
pub trait EventSink: Send + Sync {
    /// Persist one event.
    fn append(&self, event: &LogEvent) -> StoreResult<()>;

    /// Persist events contiguously, in order.
    fn append_batch(&self, events: &[LogEvent]) -> StoreResult<()>;
}

/// Point-in-time store statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    /// Sequence number of the active segment
    pub active_sequence: u64,
    /// Size of the active segment in bytes
    pub active_bytes: u64,
    /// Records appended since open
    pub appends: u64,
    /// Segments sealed since open
    pub rotations: u64,
}

/// The local log store.
pub struct LogStore {
    dir: PathBuf,
    writer: Mutex<LogWriter>,
}

impl LogStore {
    /// Open a store on `dir` using the system clock.
    pub fn open(dir: impl Into<PathBuf>, config: StoreConfig) -> StoreResult<Self> {
        Self::open_with_clock(dir, config, SystemClock::shared())
    }

    /// Open a store with an injected clock.
    pub fn open_with_clock(
        dir: impl Into<PathBuf>,
        config: StoreConfig,
        clock: SharedClock,
    ) -> StoreResult<Self> {
        let dir = dir.into();
        let writer = LogWriter::open(dir.clone(), config, clock)?;
        Ok(LogStore {
            dir,
            writer: Mutex::new(writer),
        })
    }

    /// Seal the active segment and open the next.
    ///
    /// Returns `None` when the active segment is empty.
    pub fn rotate(&self) -> StoreResult<Option<LogFileId>> {
        self.writer.lock().rotate()
    }

    /// Seal the active segment if it is older than `max_file_age`.
    pub fn rotate_if_due(&self) -> StoreResult<Option<LogFileId>> {
        self.writer.lock().rotate_if_due()
    }

    /// fsync if the sync interval has elapsed with unsynced data.
    pub fn sync_if_overdue(&self) -> StoreResult<bool> {
        self.writer.lock().sync_if_overdue()
    }

    /// fsync the active segment now.
    pub fn flush(&self) -> StoreResult<()> {
        self.writer.lock().sync()
    }

    /// Closed segments available for upload, oldest first.
    pub fn list_closed_files(&self) -> StoreResult<Vec<ClosedLogFile>> {
        LogDirectory::list_closed(&self.dir)
    }

    /// Current statistics.
    pub fn stats(&self) -> StoreStats {
        let writer = self.writer.lock();
        let counters = writer.counters();
        StoreStats {
            active_sequence: writer.active_id().sequence,
            active_bytes: writer.active_bytes(),
            appends: counters.appends,
            rotations: counters.rotations,
        }
    }

    /// Log directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl EventSink for LogStore {
    fn append(&self, event: &LogEvent) -> StoreResult<()> {
        self.writer.lock().append(std::slice::from_ref(event))
    }

    fn append_batch(&self, events: &[LogEvent]) -> StoreResult<()> {
        self.writer.lock().append(events)
    }
}

/// In-memory sink that records appended events.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything appended so far.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for MemorySink {
    fn append(&self, event: &LogEvent) -> StoreResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn append_batch(&self, events: &[LogEvent]) -> StoreResult<()> {
        self.events.lock().extend_from_slice(events);
        Ok(())
    }
}
