//! Upload-state records.
//!
//! Every closed log file has one [`UploadState`] tracking its delivery to
//! remote storage. The status machine:
//!
//! ```text
//! pending ──► uploading ──► uploaded (terminal)
//!                 │  ▲
//!                 ▼  │ (after backoff)
//!               failed
//! ```
//!
//! No transition skips `uploading`, and `uploaded` never reverts.

pub mod store;

pub use store::{FileLease, StateStore};

use crate::error::{StateError, StateResult};
use crate::format::LogFileId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery status of a log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Discovered, never attempted
    Pending,
    /// Attempt in progress
    Uploading,
    /// Remote store confirmed the object
    Uploaded,
    /// Last attempt failed; retried after `next_retry_at`
    Failed,
}

impl UploadStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted delivery progress of one log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadState {
    file: LogFileId,
    status: UploadStatus,
    attempt_count: u32,
    next_retry_at: DateTime<Utc>,
    #[serde(default)]
    remote_key: Option<String>,
    #[serde(default)]
    content_digest: Option<String>,
    #[serde(default)]
    last_error: Option<String>,
    #[serde(default)]
    uploaded_at: Option<DateTime<Utc>>,
    first_seen_at: DateTime<Utc>,
}

impl UploadState {
    /// New `pending` record for a file discovered at `now`.
    pub fn pending(file: LogFileId, now: DateTime<Utc>) -> Self {
        UploadState {
            file,
            status: UploadStatus::Pending,
            attempt_count: 0,
            next_retry_at: now,
            remote_key: None,
            content_digest: None,
            last_error: None,
            uploaded_at: None,
            first_seen_at: now,
        }
    }

    /// Start an attempt: `pending | failed → uploading`.
    pub fn begin_upload(&mut self) -> StateResult<()> {
        match self.status {
            UploadStatus::Pending | UploadStatus::Failed => {
                self.status = UploadStatus::Uploading;
                Ok(())
            }
            _ => Err(self.illegal(UploadStatus::Uploading)),
        }
    }

    /// Record a confirmed upload: `uploading → uploaded`.
    pub fn complete(
        &mut self,
        now: DateTime<Utc>,
        remote_key: impl Into<String>,
        content_digest: impl Into<String>,
    ) -> StateResult<()> {
        if self.status != UploadStatus::Uploading {
            return Err(self.illegal(UploadStatus::Uploaded));
        }
        self.status = UploadStatus::Uploaded;
        self.remote_key = Some(remote_key.into());
        self.content_digest = Some(content_digest.into());
        self.uploaded_at = Some(now);
        self.last_error = None;
        Ok(())
    }

    /// Record a failed attempt: `uploading → failed`.
    ///
    /// `delay_for_attempt` receives the incremented attempt count and returns
    /// how long to wait before the next attempt.
    pub fn fail<F>(
        &mut self,
        now: DateTime<Utc>,
        error: impl Into<String>,
        delay_for_attempt: F,
    ) -> StateResult<()>
    where
        F: FnOnce(u32) -> Duration,
    {
        if self.status != UploadStatus::Uploading {
            return Err(self.illegal(UploadStatus::Failed));
        }
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.status = UploadStatus::Failed;
        self.next_retry_at = now + delay_for_attempt(self.attempt_count);
        self.last_error = Some(error.into());
        Ok(())
    }

    /// Resolve an attempt interrupted by a crash: `uploading → failed`,
    /// retryable immediately. The attempt count is left as it was since the
    /// outcome is unknown.
    ///
    /// Returns `false` if the record was not `uploading`.
    pub fn recover_interrupted(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != UploadStatus::Uploading {
            return false;
        }
        self.status = UploadStatus::Failed;
        self.next_retry_at = now;
        self.last_error = Some("interrupted: attempt outcome unknown".to_string());
        true
    }

    /// Whether the file is eligible for an attempt at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, UploadStatus::Pending | UploadStatus::Failed)
            && self.next_retry_at <= now
    }

    fn illegal(&self, to: UploadStatus) -> StateError {
        StateError::IllegalTransition {
            file: self.file,
            from: self.status,
            to,
        }
    }

    /// File this record tracks.
    pub fn file(&self) -> LogFileId {
        self.file
    }

    /// Current status.
    pub fn status(&self) -> UploadStatus {
        self.status
    }

    /// Failed attempts so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Earliest time of the next attempt.
    pub fn next_retry_at(&self) -> DateTime<Utc> {
        self.next_retry_at
    }

    /// Remote object key, once uploaded.
    pub fn remote_key(&self) -> Option<&str> {
        self.remote_key.as_deref()
    }

    /// Digest of the uploaded content.
    pub fn content_digest(&self) -> Option<&str> {
        self.content_digest.as_deref()
    }

    /// Error from the last failed attempt.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// When the upload was confirmed.
    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        self.uploaded_at
    }

    /// When the file was first discovered.
    pub fn first_seen_at(&self) -> DateTime<Utc> {
        self.first_seen_at
    }
}
