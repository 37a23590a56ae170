//! Segment writer with size/age rotation.
//!
//! The writer owns the single active segment. Every append is framed and
//! written whole; rotation happens between records, never inside one.

use crate::error::{StoreError, StoreResult};
use crate::format::{LogFileId, LogRecord, LogSegment, SegmentMeta};
use crate::store::config::StoreConfig;
use crate::store::directory::LogDirectory;
use crate::store::reader::read_segment;
use chrono::{DateTime, Utc};
use logship_core::{LogEvent, SharedClock};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Cumulative writer counters.
#[derive(Debug, Clone, Default)]
pub struct StoreCounters {
    /// Records appended
    pub appends: u64,
    /// Segments sealed
    pub rotations: u64,
    /// Record bytes written
    pub bytes_written: u64,
    /// fsync calls
    pub sync_calls: u64,
}

/// Where the active segment stood before an append started.
struct Mark {
    size: u64,
    meta: SegmentMeta,
    counters: StoreCounters,
}

/// Writer for the active log segment.
pub struct LogWriter {
    segment: LogSegment,

    /// Running summary of the active segment, written as its sidecar on seal
    meta: SegmentMeta,

    dir: PathBuf,
    config: StoreConfig,
    clock: SharedClock,

    last_sync_time: Instant,
    has_unsynced_data: bool,
    counters: StoreCounters,

    /// Length to cut the active segment back to before the next write, set
    /// when a failed append could not remove its partial bytes
    pending_truncate: Option<u64>,
}

impl LogWriter {
    /// Open the writer on `dir`.
    ///
    /// Segments left unsealed by a previous process are sealed first (their
    /// torn tail truncated, empty ones deleted), then a fresh segment is
    /// created with the next sequence number.
    pub fn open(dir: PathBuf, config: StoreConfig, clock: SharedClock) -> StoreResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&dir)?;

        // Taken before sealing, which may delete empty leftovers
        let sequence = LogDirectory::max_sequence(&dir)?.map_or(1, |s| s + 1);
        for id in LogDirectory::list_unsealed(&dir)? {
            seal_leftover(&dir, id, clock.now())?;
        }

        let id = LogFileId::new(epoch_ms(clock.now()), sequence);
        let segment = LogSegment::create(&dir, id)?;

        tracing::info!(target: "logship::store", file = %id, dir = %dir.display(), "Opened log store");

        Ok(LogWriter {
            segment,
            meta: SegmentMeta::new_empty(id),
            dir,
            config,
            clock,
            last_sync_time: Instant::now(),
            has_unsynced_data: false,
            counters: StoreCounters::default(),
            pending_truncate: None,
        })
    }

    /// Append events as contiguous records.
    ///
    /// Rotation is checked before each record, so a long batch may continue
    /// in the next segment but no record is ever split. If a write fails,
    /// the records this call put in the active segment are cut off again
    /// so later appends never follow a torn frame.
    pub fn append(&mut self, events: &[LogEvent]) -> StoreResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.finish_truncate()?;

        let mut frames = Vec::with_capacity(events.len());
        for event in events {
            frames.push((LogRecord::encode(event)?, epoch_ms(event.timestamp())));
        }

        let mut mark = self.mark();
        for (frame, event_ms) in frames {
            if self.needs_rotation(frame.len() as u64) {
                if let Err(e) = self.rotate() {
                    return Err(self.rewind(mark, e));
                }
                mark = self.mark();
            }
            if let Err(e) = self.segment.write(&frame) {
                return Err(self.rewind(mark, e.into()));
            }
            self.meta.track_record(event_ms);
            self.counters.appends += 1;
            self.counters.bytes_written += frame.len() as u64;
            self.has_unsynced_data = true;
        }

        // Records reach the OS at the end of every append call
        if let Err(e) = self.segment.flush() {
            return Err(self.rewind(mark, e.into()));
        }

        if self.config.fsync_every_append {
            self.sync()?;
        }
        Ok(())
    }

    fn mark(&self) -> Mark {
        Mark {
            size: self.segment.size(),
            meta: self.meta.clone(),
            counters: self.counters.clone(),
        }
    }

    /// Undo a failed append back to `mark` and hand back its error.
    fn rewind(&mut self, mark: Mark, cause: StoreError) -> StoreError {
        let file = self.segment.id();
        match self.segment.truncate(mark.size) {
            Ok(()) => {
                tracing::warn!(
                    target: "logship::store",
                    file = %file,
                    valid_len = mark.size,
                    error = %cause,
                    "Append failed; partial records discarded"
                );
            }
            Err(e) => {
                self.pending_truncate = Some(mark.size);
                tracing::error!(
                    target: "logship::store",
                    file = %file,
                    valid_len = mark.size,
                    error = %cause,
                    truncate_error = %e,
                    "Append failed and partial records could not be discarded yet"
                );
            }
        }
        self.meta = mark.meta;
        self.counters = mark.counters;
        cause
    }

    fn finish_truncate(&mut self) -> StoreResult<()> {
        if let Some(len) = self.pending_truncate {
            self.segment.truncate(len)?;
            self.pending_truncate = None;
        }
        Ok(())
    }

    fn needs_rotation(&self, incoming: u64) -> bool {
        if self.meta.is_empty() {
            return false;
        }
        self.segment.size() + incoming > self.config.max_file_bytes || self.is_expired()
    }

    fn is_expired(&self) -> bool {
        let now_ms = epoch_ms(self.clock.now());
        let age_ms = now_ms.saturating_sub(self.segment.id().created_ms);
        age_ms >= self.config.max_file_age.as_millis() as u64
    }

    /// Seal the active segment and start the next one.
    ///
    /// The next segment is created before the sidecar is written, so a
    /// failure leaves the active segment open and unsealed.
    ///
    /// Returns the sealed segment's id, or `None` when the active segment
    /// is empty (nothing to seal).
    pub fn rotate(&mut self) -> StoreResult<Option<LogFileId>> {
        if self.meta.is_empty() {
            return Ok(None);
        }
        self.finish_truncate()?;
        self.sync()?;

        let now = self.clock.now();
        let sealed = self.segment.id();
        let mut meta = self.meta.clone();
        meta.closed_ms = epoch_ms(now);
        meta.byte_len = self.segment.size();

        let next_id = LogFileId::new(epoch_ms(now), sealed.sequence + 1);
        let next = LogSegment::create(&self.dir, next_id)?;
        if let Err(e) = meta.write_to_file(&self.dir) {
            drop(next);
            remove_if_present(&next_id.segment_path(&self.dir));
            remove_if_present(&SegmentMeta::meta_path(&self.dir, sealed));
            return Err(e.into());
        }

        self.segment = next;
        self.meta = SegmentMeta::new_empty(next_id);
        self.counters.rotations += 1;

        tracing::info!(
            target: "logship::store",
            file = %sealed,
            records = meta.record_count,
            bytes = meta.byte_len,
            "Sealed log file"
        );
        Ok(Some(sealed))
    }

    /// Rotate if the active segment has outlived `max_file_age`.
    pub fn rotate_if_due(&mut self) -> StoreResult<Option<LogFileId>> {
        if !self.meta.is_empty() && self.is_expired() {
            return self.rotate();
        }
        Ok(None)
    }

    /// fsync the active segment.
    pub fn sync(&mut self) -> StoreResult<()> {
        self.segment.sync()?;
        self.counters.sync_calls += 1;
        self.last_sync_time = Instant::now();
        self.has_unsynced_data = false;
        Ok(())
    }

    /// Sync if `sync_interval` has elapsed and there is unsynced data.
    ///
    /// Returns `true` if a sync was performed.
    pub fn sync_if_overdue(&mut self) -> StoreResult<bool> {
        if !self.has_unsynced_data || self.last_sync_time.elapsed() < self.config.sync_interval {
            return Ok(false);
        }
        self.sync()?;
        Ok(true)
    }

    /// Id of the active segment.
    pub fn active_id(&self) -> LogFileId {
        self.segment.id()
    }

    /// Size of the active segment in bytes.
    pub fn active_bytes(&self) -> u64 {
        self.segment.size()
    }

    /// Snapshot of the cumulative counters.
    pub fn counters(&self) -> StoreCounters {
        self.counters.clone()
    }

    /// Log directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if self.has_unsynced_data {
            let _ = self.segment.sync();
        }
    }
}

/// Seal a segment left behind by a previous process.
fn seal_leftover(dir: &Path, id: LogFileId, now: DateTime<Utc>) -> StoreResult<()> {
    let path = id.segment_path(dir);
    let contents = match read_segment(&path) {
        Ok(contents) => contents,
        Err(e) => {
            // Header never made it to disk; nothing recoverable
            tracing::warn!(target: "logship::store", file = %id, error = %e, "Discarding unreadable segment");
            std::fs::remove_file(&path)?;
            return Ok(());
        }
    };

    if contents.events.is_empty() {
        std::fs::remove_file(&path)?;
        return Ok(());
    }

    if contents.has_torn_tail() {
        let file = OpenOptions::new().write(true).open(&path)?;
        file.set_len(contents.valid_len)?;
        file.sync_all()?;
        tracing::warn!(
            target: "logship::store",
            file = %id,
            valid_len = contents.valid_len,
            "Truncated torn record at end of segment"
        );
    }

    let mut meta = SegmentMeta::new_empty(id);
    for event in &contents.events {
        meta.track_record(epoch_ms(event.timestamp()));
    }
    meta.closed_ms = epoch_ms(now);
    meta.byte_len = contents.valid_len;
    meta.write_to_file(dir)?;

    tracing::info!(target: "logship::store", file = %id, records = meta.record_count, "Sealed leftover log file");
    Ok(())
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::error!(target: "logship::store", path = %path.display(), error = %e, "Failed to remove file after aborted rotation");
        }
    }
}

pub(crate) fn epoch_ms(ts: DateTime<Utc>) -> u64 {
    ts.timestamp_millis().max(0) as u64
}
