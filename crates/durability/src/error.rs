//! Error types for the log store and upload-state records

use crate::format::{LogFileId, SegmentMetaError};
use crate::state::UploadStatus;
use crate::store::StoreConfigError;
use std::path::PathBuf;

/// Errors from the log store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Event could not be serialized
    #[error("encode error: {0}")]
    Encode(#[from] logship_core::Error),

    /// Segment file is unreadable
    #[error("corrupt segment {path}: {reason}")]
    Corrupt {
        /// Segment path
        path: PathBuf,
        /// What was wrong
        reason: String,
    },

    /// Sidecar metadata failure
    #[error("segment meta error: {0}")]
    Meta(#[from] SegmentMetaError),

    /// Invalid store configuration
    #[error("invalid store config: {0}")]
    Config(#[from] StoreConfigError),
}

/// Errors from upload-state records.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested status change is not allowed by the state machine
    #[error("illegal transition for {file}: {from} -> {to}")]
    IllegalTransition {
        /// File whose record was being changed
        file: LogFileId,
        /// Current status
        from: UploadStatus,
        /// Requested status
        to: UploadStatus,
    },
}

/// Result alias for log store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result alias for upload-state operations.
pub type StateResult<T> = std::result::Result<T, StateError>;
