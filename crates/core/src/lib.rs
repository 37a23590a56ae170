//! Core types for logship
//!
//! This crate defines the foundational types shared by every component of
//! the telemetry pipeline:
//! - LogEvent: one immutable, structured telemetry record
//! - EventSource / Level: producer category and severity
//! - Payload: size-bounded key/value mapping with an explicit truncation marker
//! - Limits: payload and message size limits
//! - Clock: injectable wall clock (SystemClock, ManualClock)
//! - Error: error type hierarchy
//! - LogshipConfig: environment-style configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod limits;
pub mod payload;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConfigError, LogshipConfig, RemoteConfig};
pub use error::{Error, Result};
pub use event::{EventSource, Level, LogEvent, LogEventBuilder, ParseEnumError};
pub use limits::Limits;
pub use payload::{Payload, ORIGINAL_BYTES_MARKER, TRUNCATED_MARKER};
