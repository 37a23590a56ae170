//! Local retention of uploaded log files
//!
//! A closed log file is only ever deleted after its upload state reached
//! `uploaded` and the grace window since the confirmed upload has passed.
//! The grace window leaves recent files on disk for local debugging.

use crate::error::StateResult;
use crate::format::LogFileId;
use crate::state::{StateStore, UploadState, UploadStatus};
use crate::store::LogDirectory;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;

/// Post-upload grace window before local deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// How long an uploaded file is kept locally
    pub grace: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy {
            grace: Duration::from_secs(24 * 3600),
        }
    }
}

impl RetentionPolicy {
    /// Policy with the given grace window.
    pub fn new(grace: Duration) -> Self {
        RetentionPolicy { grace }
    }

    /// Whether the file behind `state` may be deleted at `now`.
    pub fn is_reclaimable(&self, state: &UploadState, now: DateTime<Utc>) -> bool {
        if state.status() != UploadStatus::Uploaded {
            return false;
        }
        let Some(uploaded_at) = state.uploaded_at() else {
            return false;
        };
        chrono::Duration::from_std(self.grace)
            .ok()
            .and_then(|grace| uploaded_at.checked_add_signed(grace))
            .is_some_and(|deadline| deadline <= now)
    }

    /// Delete every reclaimable file with its sidecar and state record.
    ///
    /// Files being processed by another task are skipped. Returns the ids
    /// that were removed.
    pub fn reclaim(
        &self,
        log_dir: &Path,
        states: &StateStore,
        now: DateTime<Utc>,
    ) -> StateResult<Vec<LogFileId>> {
        let mut removed = Vec::new();
        for state in states.list()? {
            if !self.is_reclaimable(&state, now) {
                continue;
            }
            let id = state.file();
            let Some(_lease) = states.try_lease(id) else {
                continue;
            };
            if let Err(e) = LogDirectory::remove(log_dir, id) {
                tracing::warn!(target: "logship::state", file = %id, error = %e, "Failed to delete uploaded log file");
                continue;
            }
            // State goes last so a crash in between is retried next pass
            states.remove(id)?;
            tracing::info!(target: "logship::state", file = %id, "Deleted uploaded log file after grace period");
            removed.push(id);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{LogSegment, SegmentMeta};
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn uploaded(id: LogFileId, at: DateTime<Utc>) -> UploadState {
        let mut s = UploadState::pending(id, at);
        s.begin_upload().unwrap();
        s.complete(at, "k", "d").unwrap();
        s
    }

    #[test]
    fn test_only_uploaded_past_grace_is_reclaimable() {
        let policy = RetentionPolicy::new(Duration::from_secs(3600));
        let id = LogFileId::new(1_000, 1);

        let pending = UploadState::pending(id, now());
        assert!(!policy.is_reclaimable(&pending, now() + chrono::Duration::days(30)));

        let mut failed = UploadState::pending(id, now());
        failed.begin_upload().unwrap();
        failed.fail(now(), "x", |_| chrono::Duration::zero()).unwrap();
        assert!(!policy.is_reclaimable(&failed, now() + chrono::Duration::days(30)));

        let done = uploaded(id, now());
        assert!(!policy.is_reclaimable(&done, now() + chrono::Duration::minutes(59)));
        assert!(policy.is_reclaimable(&done, now() + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_reclaim_deletes_file_meta_and_state() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        std::fs::create_dir_all(&log_dir).unwrap();
        let states = StateStore::open(dir.path().join("state")).unwrap();

        let done = LogFileId::new(1_000, 1);
        let waiting = LogFileId::new(2_000, 2);
        for id in [done, waiting] {
            let mut seg = LogSegment::create(&log_dir, id).unwrap();
            seg.sync().unwrap();
            SegmentMeta::new_empty(id).write_to_file(&log_dir).unwrap();
        }
        states.save(&uploaded(done, now())).unwrap();
        states.save(&UploadState::pending(waiting, now())).unwrap();

        let policy = RetentionPolicy::new(Duration::from_secs(60));
        let removed = policy
            .reclaim(&log_dir, &states, now() + chrono::Duration::minutes(2))
            .unwrap();

        assert_eq!(removed, vec![done]);
        assert!(!done.segment_path(&log_dir).exists());
        assert!(states.load(done).unwrap().is_none());
        assert!(waiting.segment_path(&log_dir).exists());
        assert_eq!(LogDirectory::list_closed(&log_dir).unwrap().len(), 1);
    }
}
