//! Upload cycles and the shipper daemon.
//!
//! # Cycle
//!
//! ```text
//! list closed files ──► ensure state ──► select due (oldest first)
//!        │
//!        ▼
//! ┌──────────── up to `concurrency` tasks ────────────┐
//! │ begin_upload (persisted)                          │
//! │ read ─► xxh3 ─► zstd ─► head ─► put ─► head check │
//! │ complete / fail+backoff (persisted)               │
//! └───────────────────────────────────────────────────┘
//!        │
//!        ▼
//! ramp concurrency ──► stuck-file alerts ──► retention
//! ```
//!
//! Every per-file error is recorded in that file's state and the cycle
//! carries on.

use crate::config::{ShipperConfig, ShipperConfigError};
use crate::error::{ShipError, ShipResult};
use crate::key::{content_digest, object_metadata, remote_key, ObjectMetadataKey};
use crate::object_store::ObjectStore;
use crate::ramp::RampController;
use crate::status::{CycleReport, FileFailure, ShipperStatus};
use bytes::Bytes;
use logship_core::SharedClock;
use logship_durability::{
    ClosedLogFile, FileLease, LogDirectory, LogFileId, RetentionPolicy, StateStore, UploadState,
    UploadStatus,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Ships closed log files to an [`ObjectStore`].
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Shipper {
    inner: Arc<Inner>,
}

struct Inner {
    log_dir: PathBuf,
    states: StateStore,
    store: Arc<dyn ObjectStore>,
    config: ShipperConfig,
    clock: SharedClock,
    retention: RetentionPolicy,
    ramp: Mutex<RampController>,
    progress: Mutex<Progress>,
    cycle_lock: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct Progress {
    running: bool,
    cycles: u64,
    last_cycle: Option<CycleReport>,
}

enum Attempt {
    Uploaded { already_present: bool },
    Failed(FileFailure),
}

impl Shipper {
    /// Create a shipper for the closed files in `log_dir`.
    pub fn new(
        log_dir: impl Into<PathBuf>,
        states: StateStore,
        store: Arc<dyn ObjectStore>,
        clock: SharedClock,
        config: ShipperConfig,
    ) -> Result<Self, ShipperConfigError> {
        config.validate()?;
        Ok(Shipper {
            inner: Arc::new(Inner {
                log_dir: log_dir.into(),
                states,
                store,
                retention: RetentionPolicy::new(config.retention_grace),
                ramp: Mutex::new(RampController::new(config.max_concurrency)),
                progress: Mutex::new(Progress::default()),
                cycle_lock: tokio::sync::Mutex::new(()),
                config,
                clock,
            }),
        })
    }

    /// Log directory being shipped.
    pub fn log_dir(&self) -> &Path {
        &self.inner.log_dir
    }

    /// Upload-state store.
    pub fn states(&self) -> &StateStore {
        &self.inner.states
    }

    /// Resolve attempts interrupted by a previous process.
    ///
    /// Returns how many records were moved from `uploading` to `failed`.
    pub fn recover(&self) -> ShipResult<usize> {
        let recovered = self.inner.states.recover(self.inner.clock.now())?;
        if recovered > 0 {
            tracing::info!(target: "logship::shipper", recovered, "Recovered interrupted uploads");
        }
        Ok(recovered)
    }

    /// Run one upload cycle.
    ///
    /// Only one cycle runs at a time; a second caller waits. All uploads
    /// started by the cycle are joined before it returns.
    ///
    /// A record still `uploading` with no live lease at the start of a
    /// cycle belongs to an attempt that never recorded its outcome (a failed
    /// state write, an abandoned cycle) and is made retryable first.
    pub async fn run_cycle(&self) -> CycleReport {
        let inner = &self.inner;
        let _cycle = inner.cycle_lock.lock().await;
        let now = inner.clock.now();
        match inner.states.recover(now) {
            Ok(0) => {}
            Ok(recovered) => {
                tracing::warn!(target: "logship::shipper", recovered, "Recovered orphaned upload records");
            }
            Err(e) => {
                tracing::error!(target: "logship::shipper", error = %e, "Failed to recover orphaned upload records");
            }
        }
        let concurrency = inner.ramp.lock().current();
        let mut report = CycleReport {
            started_at: Some(now),
            concurrency,
            ..CycleReport::default()
        };

        let closed = match LogDirectory::list_closed(&inner.log_dir) {
            Ok(closed) => closed,
            Err(e) => {
                tracing::error!(target: "logship::shipper", dir = %inner.log_dir.display(), error = %e, "Failed to list log files");
                return self.finish_cycle(report);
            }
        };
        report.scanned = closed.len();

        let mut due: Vec<(ClosedLogFile, UploadState)> = Vec::new();
        for file in closed {
            match inner.states.load_or_create(file.id, now) {
                Ok(state) if state.is_due(now) => due.push((file, state)),
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(target: "logship::shipper", file = %file.id, error = %e, "Failed to load upload state");
                }
            }
        }

        if !due.is_empty() {
            tracing::info!(
                target: "logship::shipper",
                due = due.len(),
                scanned = report.scanned,
                concurrency,
                "Starting upload cycle"
            );
        }

        let permits = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();
        for (file, state) in due {
            let Some(lease) = inner.states.try_lease(file.id) else {
                report.skipped_busy += 1;
                continue;
            };
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            report.attempted += 1;
            let inner = Arc::clone(inner);
            tasks.spawn(async move {
                let id = file.id;
                (id, inner.attempt(file, state, lease, permit).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Attempt::Uploaded { already_present })) => {
                    report.uploaded.push(id);
                    if already_present {
                        report.already_present += 1;
                    }
                }
                Ok((_, Attempt::Failed(failure))) => report.failed.push(failure),
                Err(e) => {
                    tracing::error!(target: "logship::shipper", error = %e, "Upload task panicked");
                }
            }
        }
        report.uploaded.sort();
        report.failed.sort_by_key(|f| f.file);

        let next = inner
            .ramp
            .lock()
            .record(report.uploaded.len(), report.failed.len());
        if next != concurrency {
            tracing::info!(target: "logship::shipper", from = concurrency, to = next, "Adjusted upload concurrency");
        }

        self.alert_stuck_files();

        match inner
            .retention
            .reclaim(&inner.log_dir, &inner.states, inner.clock.now())
        {
            Ok(reclaimed) => report.reclaimed = reclaimed,
            Err(e) => {
                tracing::warn!(target: "logship::shipper", error = %e, "Retention pass failed");
            }
        }

        self.finish_cycle(report)
    }

    fn finish_cycle(&self, mut report: CycleReport) -> CycleReport {
        report.finished_at = Some(self.inner.clock.now());
        if report.attempted > 0 || !report.reclaimed.is_empty() {
            tracing::info!(
                target: "logship::shipper",
                attempted = report.attempted,
                uploaded = report.uploaded.len(),
                already_present = report.already_present,
                failed = report.failed.len(),
                reclaimed = report.reclaimed.len(),
                "Upload cycle completed"
            );
        } else {
            tracing::debug!(target: "logship::shipper", scanned = report.scanned, "Nothing to upload");
        }

        let mut progress = self.inner.progress.lock();
        progress.cycles += 1;
        progress.last_cycle = Some(report.clone());
        report
    }

    fn alert_stuck_files(&self) {
        let threshold = self.inner.config.alert_after_attempts;
        for state in self.stuck_states() {
            tracing::error!(
                target: "logship::shipper",
                alert = true,
                file = %state.file(),
                attempts = state.attempt_count(),
                threshold,
                last_error = state.last_error().unwrap_or(""),
                "Log file repeatedly failed to upload"
            );
        }
    }

    fn stuck_states(&self) -> Vec<UploadState> {
        let threshold = self.inner.config.alert_after_attempts;
        match self.inner.states.list() {
            Ok(states) => states
                .into_iter()
                .filter(|s| s.status() != UploadStatus::Uploaded && s.attempt_count() >= threshold)
                .collect(),
            Err(e) => {
                tracing::warn!(target: "logship::shipper", error = %e, "Failed to list upload states");
                Vec::new()
            }
        }
    }

    /// Daemon loop: recover, then one cycle every `scan_interval` until
    /// cancelled.
    ///
    /// Cancellation abandons an in-flight cycle; its records stay
    /// `uploading` until the next cycle recovers them. When
    /// `final_cycle_on_shutdown` is set one more cycle runs before returning.
    /// Cycle errors are logged, never returned.
    pub async fn run(&self, cancel: CancellationToken) {
        if let Err(e) = self.recover() {
            tracing::error!(target: "logship::shipper", error = %e, "Failed to recover upload states");
        }
        self.inner.progress.lock().running = true;
        tracing::info!(
            target: "logship::shipper",
            interval = ?self.inner.config.scan_interval,
            location = %self.inner.store.location(),
            "Shipper started"
        );

        let mut ticker = tokio::time::interval(self.inner.config.scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::warn!(target: "logship::shipper", "Shutdown during upload cycle; in-flight uploads abandoned");
                            break;
                        }
                        _ = self.run_cycle() => {}
                    }
                }
            }
        }

        if self.inner.config.final_cycle_on_shutdown {
            let report = self.run_cycle().await;
            tracing::info!(
                target: "logship::shipper",
                uploaded = report.uploaded.len(),
                failed = report.failed.len(),
                "Final upload cycle completed"
            );
        }
        self.inner.progress.lock().running = false;
        tracing::info!(target: "logship::shipper", "Shipper stopped");
    }

    /// Current status.
    pub fn status(&self) -> ShipperStatus {
        let inner = &self.inner;
        let mut status = {
            let progress = inner.progress.lock();
            ShipperStatus {
                running: progress.running,
                cycles: progress.cycles,
                last_cycle_at: progress.last_cycle.as_ref().and_then(|r| r.finished_at),
                last_cycle: progress.last_cycle.clone(),
                current_concurrency: inner.ramp.lock().current(),
                location: inner.store.location(),
                scan_interval: inner.config.scan_interval,
                ..ShipperStatus::default()
            }
        };

        match inner.states.list() {
            Ok(states) => {
                for state in &states {
                    match state.status() {
                        UploadStatus::Pending => status.pending += 1,
                        UploadStatus::Uploading => status.uploading += 1,
                        UploadStatus::Uploaded => status.uploaded += 1,
                        UploadStatus::Failed => status.failed += 1,
                    }
                    if state.status() != UploadStatus::Uploaded
                        && state.attempt_count() >= inner.config.alert_after_attempts
                    {
                        status.stuck_files.push(state.file());
                    }
                }
            }
            Err(e) => {
                tracing::warn!(target: "logship::shipper", error = %e, "Failed to list upload states");
            }
        }
        status
    }
}

impl Inner {
    /// One attempt for one file. The lease and permit are held until the
    /// outcome is persisted.
    async fn attempt(
        &self,
        file: ClosedLogFile,
        mut state: UploadState,
        _lease: FileLease,
        _permit: OwnedSemaphorePermit,
    ) -> Attempt {
        let id = file.id;
        if let Err(e) = state
            .begin_upload()
            .and_then(|()| self.states.save(&state))
        {
            tracing::error!(target: "logship::shipper", file = %id, error = %e, "Failed to start upload");
            return Attempt::Failed(FileFailure {
                file: id,
                attempt: state.attempt_count(),
                error: e.to_string(),
            });
        }

        match self.ship(&file).await {
            Ok((key, digest, already_present)) => {
                let now = self.clock.now();
                let saved = state
                    .complete(now, key.as_str(), digest)
                    .and_then(|()| self.states.save(&state));
                if let Err(e) = saved {
                    // The object is stored; the next attempt finds it and
                    // completes without a second put.
                    tracing::error!(target: "logship::shipper", file = %id, key = %key, error = %e, "Uploaded but failed to record state");
                    return Attempt::Failed(FileFailure {
                        file: id,
                        attempt: state.attempt_count(),
                        error: e.to_string(),
                    });
                }
                tracing::info!(target: "logship::shipper", file = %id, key = %key, already_present, "Log file uploaded");
                Attempt::Uploaded { already_present }
            }
            Err(e) => {
                let now = self.clock.now();
                let backoff = self.config.backoff;
                let error = e.to_string();
                let recorded = state
                    .fail(now, error.as_str(), |attempt| backoff.chrono_delay(attempt))
                    .and_then(|()| self.states.save(&state));
                if let Err(save_err) = recorded {
                    tracing::error!(target: "logship::shipper", file = %id, error = %save_err, "Failed to record upload failure");
                }
                tracing::warn!(
                    target: "logship::shipper",
                    file = %id,
                    attempt = state.attempt_count(),
                    next_retry_at = %state.next_retry_at(),
                    error = %error,
                    "Upload failed"
                );
                Attempt::Failed(FileFailure {
                    file: id,
                    attempt: state.attempt_count(),
                    error,
                })
            }
        }
    }

    /// Compress, upload and verify one file.
    ///
    /// Returns the key, the uncompressed digest and whether an identical
    /// object was already present.
    async fn ship(&self, file: &ClosedLogFile) -> ShipResult<(String, String, bool)> {
        let raw = tokio::fs::read(&file.path).await?;
        let original_size = raw.len() as u64;
        let digest = content_digest(&raw);
        let level = self.config.compression_level;
        let compressed = tokio::task::spawn_blocking(move || zstd::bulk::compress(&raw, level))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))??;
        let compressed_digest = content_digest(&compressed);
        let key = remote_key(&self.config.key_prefix, &self.config.hostname, file.id, &digest);

        if let Some(existing) = self.store.head(&key).await? {
            if matches_upload(&existing, compressed.len() as u64, &compressed_digest) {
                tracing::debug!(target: "logship::shipper", file = %file.id, key = %key, "Object already present");
                return Ok((key, digest, true));
            }
        }

        let size = compressed.len() as u64;
        let metadata = object_metadata(
            file.id,
            &self.config.hostname,
            original_size,
            &compressed_digest,
            self.clock.now(),
        );
        self.store.put(&key, Bytes::from(compressed), metadata).await?;

        match self.store.head(&key).await? {
            Some(info) if matches_upload(&info, size, &compressed_digest) => Ok((key, digest, false)),
            Some(info) => Err(ShipError::Integrity {
                reason: format!(
                    "stored size {} digest {:?}, expected size {} digest {}",
                    info.size,
                    info.metadata.get(ObjectMetadataKey::CONTENT_XXH3),
                    size,
                    compressed_digest
                ),
                key,
            }),
            None => Err(ShipError::Integrity {
                key,
                reason: "object missing after put".to_string(),
            }),
        }
    }
}

fn matches_upload(info: &crate::object_store::ObjectInfo, size: u64, digest: &str) -> bool {
    info.size == size
        && info
            .metadata
            .get(ObjectMetadataKey::CONTENT_XXH3)
            .is_some_and(|d| d == digest)
}

/// Closed files not yet confirmed uploaded, oldest first. Used by dry runs
/// and the status command.
pub fn unshipped_files(
    log_dir: &Path,
    states: &StateStore,
) -> ShipResult<Vec<(LogFileId, Option<UploadState>)>> {
    let mut out = Vec::new();
    for file in LogDirectory::list_closed(log_dir)? {
        let state = states.load(file.id)?;
        if state.as_ref().map(|s| s.status()) != Some(UploadStatus::Uploaded) {
            out.push((file.id, state));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryObjectStore;
    use chrono::{TimeZone, Utc};
    use logship_core::{Clock, EventSource, LogEvent, ManualClock};
    use logship_durability::{EventSink, LogStore, StoreConfig};
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        log_dir: PathBuf,
        store: LogStore,
        remote: Arc<MemoryObjectStore>,
        clock: Arc<ManualClock>,
        shipper: Shipper,
    }

    fn fixture(config: ShipperConfig) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let log_dir = tmp.path().join("logs");
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap());
        let store =
            LogStore::open_with_clock(&log_dir, StoreConfig::default(), clock.clone()).unwrap();
        let states = StateStore::open(tmp.path().join("state")).unwrap();
        let remote = Arc::new(MemoryObjectStore::new());
        let shipper = Shipper::new(
            &log_dir,
            states,
            remote.clone(),
            clock.clone(),
            config,
        )
        .unwrap();
        Fixture {
            _tmp: tmp,
            log_dir,
            store,
            remote,
            clock,
            shipper,
        }
    }

    impl Fixture {
        fn seal_file(&self, events: usize) -> LogFileId {
            for i in 0..events {
                let event = LogEvent::builder(EventSource::ClientEvent, format!("event {}", i))
                    .timestamp(self.clock.now())
                    .build()
                    .unwrap();
                self.store.append(&event).unwrap();
            }
            self.store.rotate().unwrap().unwrap()
        }

        fn state(&self, id: LogFileId) -> UploadState {
            self.shipper.states().load(id).unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn test_cycle_uploads_compressed_file() {
        let fx = fixture(ShipperConfig::for_testing());
        let id = fx.seal_file(5);
        let original = std::fs::read(id.segment_path(&fx.log_dir)).unwrap();

        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.scanned, 1);
        assert_eq!(report.uploaded, vec![id]);
        assert!(report.is_clean());

        let state = fx.state(id);
        assert_eq!(state.status(), UploadStatus::Uploaded);
        let key = state.remote_key().unwrap().to_string();
        assert!(key.starts_with("logs/2024/03/05/test-host/"));
        assert!(key.ends_with(&format!("-{}.log.zst", content_digest(&original))));
        assert_eq!(state.content_digest(), Some(content_digest(&original).as_str()));

        let body = fx.remote.get(&key).await.unwrap();
        assert_eq!(zstd::decode_all(&body[..]).unwrap(), original);

        let meta = fx.remote.metadata(&key).unwrap();
        assert_eq!(meta[ObjectMetadataKey::ORIGINAL_SIZE], original.len().to_string());
        assert_eq!(meta[ObjectMetadataKey::CONTENT_XXH3], content_digest(&body));
        assert_eq!(meta[ObjectMetadataKey::HOSTNAME], "test-host");
    }

    #[tokio::test]
    async fn test_uploaded_file_is_not_put_again() {
        let fx = fixture(ShipperConfig::for_testing());
        fx.seal_file(3);
        fx.shipper.run_cycle().await;
        assert_eq!(fx.remote.put_count(), 1);

        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.attempted, 0);
        assert_eq!(fx.remote.put_count(), 1);
    }

    #[tokio::test]
    async fn test_lost_state_finds_existing_object() {
        let fx = fixture(ShipperConfig::for_testing());
        let id = fx.seal_file(3);
        fx.shipper.run_cycle().await;
        fx.shipper.states().remove(id).unwrap();

        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.uploaded, vec![id]);
        assert_eq!(report.already_present, 1);
        assert_eq!(fx.remote.put_count(), 1);
        assert_eq!(fx.state(id).status(), UploadStatus::Uploaded);
    }

    #[tokio::test]
    async fn test_different_object_at_key_is_replaced() {
        let fx = fixture(ShipperConfig::for_testing());
        let id = fx.seal_file(2);
        let original = std::fs::read(id.segment_path(&fx.log_dir)).unwrap();
        let key = remote_key("logs", "test-host", id, &content_digest(&original));
        fx.remote.insert(
            key.as_str(),
            Bytes::from_static(b"partial"),
            HashMap::from([(ObjectMetadataKey::CONTENT_XXH3.to_string(), "0".to_string())]),
        );

        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.already_present, 0);
        assert_eq!(fx.remote.put_count(), 1);
        let body = fx.remote.get(&key).await.unwrap();
        assert_eq!(zstd::decode_all(&body[..]).unwrap(), original);
    }

    #[tokio::test]
    async fn test_failure_backs_off_then_succeeds() {
        let fx = fixture(ShipperConfig::for_testing());
        let id = fx.seal_file(1);
        fx.remote.set_offline(true);

        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].attempt, 1);
        let state = fx.state(id);
        assert_eq!(state.status(), UploadStatus::Failed);
        assert_eq!(
            state.next_retry_at(),
            fx.clock.now() + chrono::Duration::seconds(30)
        );
        assert!(state.last_error().unwrap().contains("offline"));

        fx.remote.set_offline(false);
        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.attempted, 0, "retry is not due yet");

        fx.clock.advance(Duration::from_secs(30));
        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.uploaded, vec![id]);
        assert_eq!(fx.state(id).status(), UploadStatus::Uploaded);
    }

    #[tokio::test]
    async fn test_retry_delay_doubles() {
        let fx = fixture(ShipperConfig::for_testing());
        let id = fx.seal_file(1);
        fx.remote.set_offline(true);

        fx.shipper.run_cycle().await;
        fx.clock.advance(Duration::from_secs(30));
        fx.shipper.run_cycle().await;

        let state = fx.state(id);
        assert_eq!(state.attempt_count(), 2);
        assert_eq!(
            state.next_retry_at(),
            fx.clock.now() + chrono::Duration::seconds(60)
        );
    }

    #[tokio::test]
    async fn test_interrupted_upload_is_recovered() {
        let fx = fixture(ShipperConfig::for_testing());
        let id = fx.seal_file(1);
        let mut state = UploadState::pending(id, fx.clock.now());
        state.begin_upload().unwrap();
        fx.shipper.states().save(&state).unwrap();

        assert_eq!(fx.shipper.recover().unwrap(), 1);
        assert_eq!(fx.state(id).status(), UploadStatus::Failed);
        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.uploaded, vec![id]);
    }

    #[tokio::test]
    async fn test_cycle_recovers_unleased_uploading_record() {
        let fx = fixture(ShipperConfig::for_testing());
        let id = fx.seal_file(1);
        let mut state = UploadState::pending(id, fx.clock.now());
        state.begin_upload().unwrap();
        fx.shipper.states().save(&state).unwrap();

        // Held by a live attempt: left alone
        let lease = fx.shipper.states().try_lease(id).unwrap();
        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.attempted, 0);
        assert_eq!(fx.state(id).status(), UploadStatus::Uploading);

        drop(lease);
        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.uploaded, vec![id]);
    }

    /// Replaces the state directory with a plain file during the next put,
    /// so recording the outcome fails.
    struct StateBreakingStore {
        inner: MemoryObjectStore,
        state_dir: PathBuf,
        parked: PathBuf,
        armed: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl ObjectStore for StateBreakingStore {
        async fn put(
            &self,
            key: &str,
            body: Bytes,
            metadata: HashMap<String, String>,
        ) -> Result<crate::object_store::PutReceipt, crate::error::ObjectStoreError> {
            if self.armed.swap(false, std::sync::atomic::Ordering::SeqCst) {
                std::fs::rename(&self.state_dir, &self.parked).unwrap();
                std::fs::write(&self.state_dir, b"").unwrap();
            }
            self.inner.put(key, body, metadata).await
        }

        async fn head(
            &self,
            key: &str,
        ) -> Result<Option<crate::object_store::ObjectInfo>, crate::error::ObjectStoreError> {
            self.inner.head(key).await
        }

        async fn get(&self, key: &str) -> Result<Bytes, crate::error::ObjectStoreError> {
            self.inner.get(key).await
        }

        fn location(&self) -> String {
            self.inner.location()
        }
    }

    #[tokio::test]
    async fn test_unrecorded_upload_is_retried_next_cycle() {
        let tmp = tempfile::tempdir().unwrap();
        let log_dir = tmp.path().join("logs");
        let state_dir = tmp.path().join("state");
        let parked = tmp.path().join("state-parked");
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap());
        let store =
            LogStore::open_with_clock(&log_dir, StoreConfig::default(), clock.clone()).unwrap();
        let remote = Arc::new(StateBreakingStore {
            inner: MemoryObjectStore::new(),
            state_dir: state_dir.clone(),
            parked: parked.clone(),
            armed: std::sync::atomic::AtomicBool::new(true),
        });
        let shipper = Shipper::new(
            &log_dir,
            StateStore::open(&state_dir).unwrap(),
            remote.clone(),
            clock.clone(),
            ShipperConfig::for_testing(),
        )
        .unwrap();

        let event = LogEvent::builder(EventSource::ClientEvent, "event")
            .timestamp(clock.now())
            .build()
            .unwrap();
        store.append(&event).unwrap();
        let id = store.rotate().unwrap().unwrap();

        let report = shipper.run_cycle().await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(remote.inner.put_count(), 1);

        std::fs::remove_file(&state_dir).unwrap();
        std::fs::rename(&parked, &state_dir).unwrap();
        assert_eq!(
            shipper.states().load(id).unwrap().unwrap().status(),
            UploadStatus::Uploading
        );

        clock.advance(Duration::from_secs(3 * 3600));
        let report = shipper.run_cycle().await;
        assert_eq!(report.uploaded, vec![id]);
        assert_eq!(report.already_present, 1);
        assert_eq!(remote.inner.put_count(), 1);
        assert_eq!(
            shipper.states().load(id).unwrap().unwrap().status(),
            UploadStatus::Uploaded
        );
    }

    #[tokio::test]
    async fn test_busy_file_is_skipped() {
        let fx = fixture(ShipperConfig::for_testing());
        let id = fx.seal_file(1);
        let lease = fx.shipper.states().try_lease(id).unwrap();

        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.skipped_busy, 1);
        assert_eq!(fx.remote.put_count(), 0);

        drop(lease);
        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.uploaded, vec![id]);
    }

    #[tokio::test]
    async fn test_concurrency_ramps_down_and_up() {
        let fx = fixture(ShipperConfig::for_testing().with_max_concurrency(4));
        fx.seal_file(1);
        fx.seal_file(1);
        fx.remote.set_offline(true);

        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.concurrency, 4);
        assert_eq!(fx.shipper.status().current_concurrency, 2);

        fx.remote.set_offline(false);
        fx.clock.advance(Duration::from_secs(30));
        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.concurrency, 2);
        assert_eq!(report.uploaded.len(), 2);
        assert_eq!(fx.shipper.status().current_concurrency, 3);
    }

    #[tokio::test]
    async fn test_files_upload_oldest_first_within_bound() {
        let fx = fixture(ShipperConfig::for_testing().with_max_concurrency(1));
        let ids: Vec<_> = (0..3).map(|_| fx.seal_file(1)).collect();

        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.uploaded, ids);
        let keys = fx.remote.keys();
        assert_eq!(keys.len(), 3);
    }

    #[tokio::test]
    async fn test_stuck_file_is_reported() {
        let fx = fixture(ShipperConfig::for_testing());
        let id = fx.seal_file(1);
        fx.remote.set_offline(true);

        for _ in 0..3 {
            fx.shipper.run_cycle().await;
            fx.clock.advance(Duration::from_secs(600));
        }

        let status = fx.shipper.status();
        assert_eq!(status.stuck_files, vec![id]);
        assert_eq!(status.failed, 1);
        assert_eq!(status.cycles, 3);
    }

    #[tokio::test]
    async fn test_uploaded_file_reclaimed_after_grace() {
        let fx = fixture(ShipperConfig::for_testing());
        let id = fx.seal_file(1);

        let report = fx.shipper.run_cycle().await;
        assert!(report.reclaimed.is_empty());
        assert!(id.segment_path(&fx.log_dir).exists());

        fx.clock.advance(Duration::from_secs(3600));
        let report = fx.shipper.run_cycle().await;
        assert_eq!(report.reclaimed, vec![id]);
        assert!(!id.segment_path(&fx.log_dir).exists());
        assert!(fx.shipper.states().load(id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unshipped_files_lists_pending_and_failed() {
        let fx = fixture(ShipperConfig::for_testing());
        let first = fx.seal_file(1);
        fx.shipper.run_cycle().await;
        let second = fx.seal_file(1);

        let unshipped = unshipped_files(&fx.log_dir, fx.shipper.states()).unwrap();
        assert_eq!(unshipped.len(), 1);
        assert_eq!(unshipped[0].0, second);
        assert!(unshipped[0].1.is_none());
        assert_ne!(unshipped[0].0, first);
    }

    #[tokio::test]
    async fn test_run_ships_until_cancelled() {
        let fx = fixture(
            ShipperConfig::for_testing()
                .with_scan_interval(Duration::from_secs(3600))
                .with_final_cycle_on_shutdown(true),
        );
        fx.seal_file(2);

        let cancel = CancellationToken::new();
        let shipper = fx.shipper.clone();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { shipper.run(cancel).await }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while fx.shipper.status().cycles == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(fx.shipper.status().running);
        assert_eq!(fx.remote.keys().len(), 1);

        let late = fx.seal_file(1);
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(fx.state(late).status(), UploadStatus::Uploaded);
        assert!(!fx.shipper.status().running);
    }
}
