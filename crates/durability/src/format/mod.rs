//! On-disk byte formats for log segments and their sidecars.
//!
//! # Module Structure
//!
//! - `log_record`: segment naming, segment header and record framing
//! - `segment_meta`: `.meta` seal sidecar

pub mod log_record;
pub mod segment_meta;

pub use log_record::{
    LogFileId, LogRecord, LogRecordError, LogSegment, SegmentHeader,
    LOG_RECORD_FORMAT_VERSION, SEGMENT_FORMAT_VERSION, SEGMENT_HEADER_SIZE, SEGMENT_MAGIC,
};
pub use segment_meta::{
    SegmentMeta, SegmentMetaError, SEGMENT_META_MAGIC, SEGMENT_META_SIZE, SEGMENT_META_VERSION,
};
