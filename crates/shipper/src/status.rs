//! Cycle reports and daemon status.

use chrono::{DateTime, Utc};
use logship_durability::LogFileId;
use serde::Serialize;
use std::time::Duration;

/// One file's failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    /// The file
    pub file: LogFileId,
    /// Attempts so far, including this one
    pub attempt: u32,
    /// What went wrong
    pub error: String,
}

/// Result of one upload cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// When the cycle began
    pub started_at: Option<DateTime<Utc>>,
    /// When it ended
    pub finished_at: Option<DateTime<Utc>>,
    /// Closed files seen on disk
    pub scanned: usize,
    /// Files due and attempted
    pub attempted: usize,
    /// Files confirmed uploaded (including already-present objects)
    pub uploaded: Vec<LogFileId>,
    /// Files found already stored remotely, confirmed without a put
    pub already_present: usize,
    /// Files whose attempt failed
    pub failed: Vec<FileFailure>,
    /// Files skipped because another task held them
    pub skipped_busy: usize,
    /// Local files deleted by retention
    pub reclaimed: Vec<LogFileId>,
    /// Concurrency used for this cycle
    pub concurrency: usize,
}

impl CycleReport {
    /// Whether every attempted file made it.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Snapshot of the shipper for status endpoints.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShipperStatus {
    /// Daemon loop is running
    pub running: bool,
    /// Cycles completed since start
    pub cycles: u64,
    /// End of the last cycle
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// Last cycle's report
    pub last_cycle: Option<CycleReport>,
    /// Files waiting for a first attempt
    pub pending: usize,
    /// Files waiting for a retry
    pub failed: usize,
    /// Files in flight
    pub uploading: usize,
    /// Files confirmed uploaded and still on disk
    pub uploaded: usize,
    /// Files at or past the alert threshold
    pub stuck_files: Vec<LogFileId>,
    /// Current upload concurrency
    pub current_concurrency: usize,
    /// Destination
    pub location: String,
    /// Time between cycles
    #[serde(with = "duration_secs")]
    pub scan_interval: Duration,
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}
