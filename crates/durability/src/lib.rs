//! Durability layer for logship
//!
//! This crate handles everything that touches local disk:
//!
//! - Log Store: append-only segment files, rotated by size and age
//! - Segment format: framed, checksummed event records and `.meta` seal sidecars
//! - Upload state: one durable record per closed segment, crash-recoverable
//! - Retention: deletion of uploaded segments after a grace window

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod format;
pub mod retention;
pub mod state;
pub mod store;

pub use error::{StateError, StateResult, StoreError, StoreResult};
pub use format::{LogFileId, LogRecord, LogRecordError, SegmentMeta, SegmentMetaError};
pub use retention::RetentionPolicy;
pub use state::{FileLease, StateStore, UploadState, UploadStatus};
pub use store::{
    read_events, read_segment, ClosedLogFile, EventSink, LogDirectory, LogStore, MemorySink,
    SegmentContents, StoreConfig, StoreConfigError, StoreStats,
};
