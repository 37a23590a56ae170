//! Durable upload-state storage.
//!
//! One JSON file per log file at `<dir>/<file-id>.state.json`, replaced
//! atomically (write temp, fsync, rename, fsync directory). Records are
//! independent: concurrent uploads of different files never contend.

use super::{UploadState, UploadStatus};
use crate::error::{StateError, StateResult};
use crate::format::LogFileId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const STATE_SUFFIX: &str = ".state.json";

/// Directory of upload-state records.
#[derive(Clone)]
pub struct StateStore {
    dir: PathBuf,
    leases: Arc<DashMap<LogFileId, ()>>,
}

/// Exclusive claim on one file's record, released on drop.
pub struct FileLease {
    id: LogFileId,
    leases: Arc<DashMap<LogFileId, ()>>,
}

impl FileLease {
    /// File this lease covers.
    pub fn file(&self) -> LogFileId {
        self.id
    }
}

impl Drop for FileLease {
    fn drop(&mut self) {
        self.leases.remove(&self.id);
    }
}

impl StateStore {
    /// Open (creating if needed) the state directory.
    pub fn open(dir: impl Into<PathBuf>) -> StateResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(StateStore {
            dir,
            leases: Arc::new(DashMap::new()),
        })
    }

    /// State directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Claim a file for exclusive processing.
    ///
    /// Returns `None` if another task holds it.
    pub fn try_lease(&self, id: LogFileId) -> Option<FileLease> {
        match self.leases.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Some(FileLease {
                    id,
                    leases: Arc::clone(&self.leases),
                })
            }
        }
    }

    fn path_for(&self, id: LogFileId) -> PathBuf {
        self.dir.join(format!("{}{}", id.stem(), STATE_SUFFIX))
    }

    /// Load one record.
    pub fn load(&self, id: LogFileId) -> StateResult<Option<UploadState>> {
        match std::fs::read(self.path_for(id)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load a record, creating a `pending` one if missing.
    ///
    /// A record that no longer parses is replaced by a fresh `pending` one;
    /// uploads are idempotent so re-attempting is safe.
    pub fn load_or_create(&self, id: LogFileId, now: DateTime<Utc>) -> StateResult<UploadState> {
        match self.load(id) {
            Ok(Some(state)) => Ok(state),
            Ok(None) => {
                let state = UploadState::pending(id, now);
                self.save(&state)?;
                tracing::debug!(target: "logship::state", file = %id, "Created pending upload state");
                Ok(state)
            }
            Err(StateError::Serialization(e)) => {
                tracing::warn!(target: "logship::state", file = %id, error = %e, "Replacing unreadable upload state");
                let state = UploadState::pending(id, now);
                self.save(&state)?;
                Ok(state)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist a record with write-fsync-rename.
    pub fn save(&self, state: &UploadState) -> StateResult<()> {
        let final_path = self.path_for(state.file());
        let temp_path = final_path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(state)?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &final_path)?;
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    /// Delete a record.
    pub fn remove(&self, id: LogFileId) -> StateResult<()> {
        match std::fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All readable records, oldest file first.
    pub fn list(&self) -> StateResult<Vec<UploadState>> {
        let mut states = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(stem) = name.strip_suffix(STATE_SUFFIX) else {
                continue;
            };
            let Some(id) = LogFileId::parse_stem(stem) else {
                continue;
            };
            match self.load(id) {
                Ok(Some(state)) => states.push(state),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(target: "logship::state", file = %id, error = %e, "Skipping unreadable upload state");
                }
            }
        }
        states.sort_by_key(|s| s.file());
        Ok(states)
    }

    /// Resolve records left `uploading` by a previous process.
    ///
    /// Each becomes `failed` and immediately due. Returns how many were
    /// recovered.
    pub fn recover(&self, now: DateTime<Utc>) -> StateResult<usize> {
        let mut recovered = 0;
        for mut state in self.list()? {
            if state.status() != UploadStatus::Uploading {
                continue;
            }
            let Some(_lease) = self.try_lease(state.file()) else {
                continue;
            };
            if state.recover_interrupted(now) {
                self.save(&state)?;
                recovered += 1;
                tracing::warn!(
                    target: "logship::state",
                    file = %state.file(),
                    attempts = state.attempt_count(),
                    "Recovered interrupted upload"
                );
            }
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let id = LogFileId::new(1_000, 1);

        assert!(store.load(id).unwrap().is_none());
        let mut state = store.load_or_create(id, now()).unwrap();
        assert_eq!(state.status(), UploadStatus::Pending);

        state.begin_upload().unwrap();
        store.save(&state).unwrap();
        assert_eq!(store.load(id).unwrap(), Some(state));
        assert!(dir.path().join("log-0000000001000-000001.state.json").exists());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let id = LogFileId::new(1_000, 1);
        {
            let store = StateStore::open(dir.path()).unwrap();
            store.load_or_create(id, now()).unwrap();
        }
        let store = StateStore::open(dir.path()).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_recover_uploading() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();

        let stuck = LogFileId::new(1_000, 1);
        let mut state = store.load_or_create(stuck, now()).unwrap();
        state.begin_upload().unwrap();
        store.save(&state).unwrap();

        let fine = LogFileId::new(2_000, 2);
        store.load_or_create(fine, now()).unwrap();

        let later = now() + chrono::Duration::minutes(5);
        assert_eq!(store.recover(later).unwrap(), 1);

        let recovered = store.load(stuck).unwrap().unwrap();
        assert_eq!(recovered.status(), UploadStatus::Failed);
        assert_eq!(recovered.attempt_count(), 0);
        assert!(recovered.is_due(later));
        assert_eq!(store.load(fine).unwrap().unwrap().status(), UploadStatus::Pending);
    }

    #[test]
    fn test_corrupt_record_replaced() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let id = LogFileId::new(1_000, 1);
        std::fs::write(store.path_for(id), b"{not json").unwrap();

        assert!(store.list().unwrap().is_empty());
        let state = store.load_or_create(id, now()).unwrap();
        assert_eq!(state.status(), UploadStatus::Pending);
    }

    #[test]
    fn test_lease_is_exclusive() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let id = LogFileId::new(1_000, 1);

        let lease = store.try_lease(id).unwrap();
        assert!(store.try_lease(id).is_none());
        assert!(store.try_lease(LogFileId::new(2_000, 2)).is_some());
        drop(lease);
        assert!(store.try_lease(id).is_some());
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let id = LogFileId::new(1_000, 1);
        store.load_or_create(id, now()).unwrap();
        store.remove(id).unwrap();
        store.remove(id).unwrap();
        assert!(store.load(id).unwrap().is_none());
    }
}
